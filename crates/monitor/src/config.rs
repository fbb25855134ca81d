// crates/monitor/src/config.rs
//! Monitor settings. Every field has a default; the CLI overrides them from
//! flags or `CLAUDE_WATCH_*` environment variables.

use crate::live::process::{ProcessSource, ShellProcessSource, SysinfoProcessSource};
use claude_watch_core::{claude_projects_dir, DiscoveryError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PROCESS_NAME: &str = "claude";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_LOCATE_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// Which OS capability backs the process locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProcessSourceKind {
    /// `pgrep`, `ps` and `/proc` or `lsof`
    #[default]
    Shell,
    /// In-process process table via sysinfo
    Sysinfo,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Transcript root, normally `~/.claude/projects`.
    pub root: PathBuf,
    pub process_name: String,
    pub poll_interval: Duration,
    /// Bound on each external utility call.
    pub command_timeout: Duration,
    /// Bound on one whole locator pass.
    pub locate_deadline: Duration,
    pub queue_capacity: usize,
    pub process_source: ProcessSourceKind,
}

impl MonitorConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            locate_deadline: DEFAULT_LOCATE_DEADLINE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            process_source: ProcessSourceKind::default(),
        }
    }

    /// Defaults rooted at `~/.claude/projects`.
    pub fn from_home() -> Result<Self, DiscoveryError> {
        Ok(Self::new(claude_projects_dir()?))
    }

    pub fn build_source(&self) -> Arc<dyn ProcessSource> {
        match self.process_source {
            ProcessSourceKind::Shell => Arc::new(ShellProcessSource::new(self.command_timeout)),
            ProcessSourceKind::Sysinfo => Arc::new(SysinfoProcessSource::new()),
        }
    }
}
