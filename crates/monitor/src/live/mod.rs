pub mod manager;
pub mod process;
pub mod watcher;

pub use manager::{load_once, Monitor, MonitorEvent, MonitorHandle};
pub use process::{
    locate_processes, matches_command_line, ProcessSource, ShellProcessSource, SysinfoProcessSource,
};
pub use watcher::ChangeFeed;
