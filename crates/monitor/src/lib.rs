// crates/monitor/src/lib.rs
pub mod config;
pub mod error;
pub mod live;

pub use config::*;
pub use error::*;
pub use live::*;
