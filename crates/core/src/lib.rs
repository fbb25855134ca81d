// crates/core/src/lib.rs
pub mod discovery;
pub mod error;
pub mod parser;
pub mod paths;
pub mod reconcile;
pub mod resume;
pub mod time;
pub mod tools;
pub mod types;

pub use discovery::*;
pub use error::*;
pub use parser::*;
pub use paths::*;
pub use reconcile::*;
pub use resume::*;
pub use time::*;
pub use types::*;
