//! File system watcher for transcript files.
//!
//! Watches the transcript root recursively and reports created or modified
//! top-level transcripts through a callback. Sub-agent transcripts under
//! `{session}/subagents/` are filtered out with the same rule the scanner uses.
//!
//! The callback runs on notify's thread. It must only hand the path off
//! (the monitor enqueues it); it never touches session state.

use crate::error::MonitorError;
use claude_watch_core::is_transcript_path;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// A running watch on a transcript root. Dropping it also releases the OS
/// watch handle.
pub struct ChangeFeed {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl ChangeFeed {
    /// Start watching `root`.
    ///
    /// # Errors
    /// `MonitorError::Watch` when `root` does not exist or the OS refuses the
    /// watch.
    pub fn start<F>(root: &Path, on_change: F) -> Result<Self, MonitorError>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let watch_error = |source: notify::Error| MonitorError::Watch {
            path: root.to_path_buf(),
            source,
        };

        if !root.is_dir() {
            return Err(watch_error(
                notify::Error::path_not_found().add_path(root.to_path_buf()),
            ));
        }

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in transcript_changes(event) {
                    on_change(path);
                }
            }
            Err(e) => error!("File watcher error: {}", e),
        })
        .map_err(watch_error)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(watch_error)?;
        info!("Watching {} for transcript changes", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            watcher: Some(watcher),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Unwatch and release the OS handle. Later calls do nothing.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.root) {
                // The root may already be gone; the handle is released either way.
                tracing::debug!("Unwatch {} failed: {}", self.root.display(), e);
            }
            info!("Stopped watching {}", self.root.display());
        }
    }
}

/// Transcript paths touched by a create or modify event.
pub fn transcript_changes(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .into_iter()
            .filter(|p| is_transcript_path(p))
            .collect(),
        _ => Vec::new(),
    }
}
