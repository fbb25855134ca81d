// crates/core/src/reconcile.rs
//! Active-session reconciliation.
//!
//! Liveness is inferred, not observed: a directory with N running agent
//! processes marks its N most recently modified transcripts live. Which PID
//! lands on which session within one directory is positional only.

use crate::discovery::sort_by_start_time;
use crate::paths::resolve_path;
use crate::types::{Session, ToolInvocation};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Working directory → live PIDs of the monitored CLI, in discovery order.
pub type ProcessMap = BTreeMap<PathBuf, Vec<u32>>;

/// Recompute `is_live`/`pid` for every session, reading modification times
/// from the filesystem. Returns the number of live sessions.
pub fn reconcile(sessions: &mut [Session], processes: &ProcessMap) -> usize {
    reconcile_with(sessions, processes, file_mtime)
}

/// Same as [`reconcile`] with the modification-time lookup supplied by the
/// caller. Sessions whose mtime is unknown rank after every known one.
pub fn reconcile_with<F>(sessions: &mut [Session], processes: &ProcessMap, mut mtime_of: F) -> usize
where
    F: FnMut(&Path) -> Option<SystemTime>,
{
    for session in sessions.iter_mut() {
        session.set_liveness(None);
    }

    let mut live_dirs: BTreeMap<PathBuf, Vec<u32>> = BTreeMap::new();
    for (dir, pids) in processes {
        if let Some(resolved) = resolve_path(dir) {
            live_dirs.entry(resolved).or_default().extend(pids.iter().copied());
        }
    }
    if live_dirs.is_empty() {
        return 0;
    }

    let project_dirs: Vec<Option<PathBuf>> = sessions
        .iter()
        .map(|s| s.project_path.as_deref().map(Path::new).and_then(resolve_path))
        .collect();

    let mut live = 0;
    for (dir, pids) in &live_dirs {
        let mut candidates: Vec<usize> = project_dirs
            .iter()
            .enumerate()
            .filter(|(_, p)| matches!(p, Some(p) if p == dir))
            .map(|(idx, _)| idx)
            .collect();
        candidates.sort_by_cached_key(|&idx| Reverse(mtime_of(&sessions[idx].path)));

        for (&idx, &pid) in candidates.iter().zip(pids) {
            sessions[idx].set_liveness(Some(pid));
            live += 1;
        }
    }
    live
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether [`SessionSet::upsert`] replaced an existing session or added one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// The owned collection of known sessions. Identity is the session ID, so a
/// re-parsed transcript replaces its earlier version instead of duplicating it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct SessionSet {
    sessions: Vec<Session>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions;
    }

    /// Replace the session with the same ID in place, or insert it and
    /// restore newest-start-first order. Ties keep the newest insert first.
    pub fn upsert(&mut self, session: Session) -> Upsert {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => {
                *existing = session;
                Upsert::Replaced
            }
            None => {
                self.sessions.insert(0, session);
                sort_by_start_time(&mut self.sessions);
                Upsert::Inserted
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn live(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter().filter(|s| s.is_live)
    }

    pub fn invocation(&self, session_id: &str, tool_id: &str) -> Option<&ToolInvocation> {
        self.get(session_id)?.invocation(tool_id)
    }

    pub fn reconcile(&mut self, processes: &ProcessMap) -> usize {
        reconcile(&mut self.sessions, processes)
    }

    pub fn reconcile_with<F>(&mut self, processes: &ProcessMap, mtime_of: F) -> usize
    where
        F: FnMut(&Path) -> Option<SystemTime>,
    {
        reconcile_with(&mut self.sessions, processes, mtime_of)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Session> {
        self.sessions.iter()
    }

    pub fn as_slice(&self) -> &[Session] {
        &self.sessions
    }
}

impl<'a> IntoIterator for &'a SessionSet {
    type Item = &'a Session;
    type IntoIter = std::slice::Iter<'a, Session>;

    fn into_iter(self) -> Self::IntoIter {
        self.sessions.iter()
    }
}
