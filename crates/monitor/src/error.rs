// crates/monitor/src/error.rs
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of one process-introspection call.
///
/// The locator never propagates these past a single PID; they decide whether
/// that PID is dropped or the whole scan degrades to empty.
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Process utility not available: {program}")]
    Unavailable { program: String },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Process {pid} not found")]
    ProcessGone { pid: u32 },

    #[error("Permission denied inspecting process {pid}")]
    PermissionDenied { pid: u32 },

    #[error("IO error running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl LocatorError {
    /// Classify a spawn/IO failure of `program`.
    pub fn io(program: impl Into<String>, source: std::io::Error) -> Self {
        let program = program.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::Unavailable { program },
            _ => Self::Io { program, source },
        }
    }

    /// Classify a failure to introspect one process.
    pub fn for_pid(pid: u32, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::ProcessGone { pid },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { pid },
            _ => Self::Io {
                program: format!("introspect {pid}"),
                source,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Cannot watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error(transparent)]
    Discovery(#[from] claude_watch_core::DiscoveryError),
}
