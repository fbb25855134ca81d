// crates/core/src/discovery.rs
//! Transcript discovery under `~/.claude/projects/`.
//!
//! Claude Code writes one JSONL transcript per session, grouped into one
//! directory per project. Sub-agent transcripts live under a nested
//! `subagents/` directory and are not sessions of their own.

use crate::error::DiscoveryError;
use crate::parser::parse_session;
use crate::types::Session;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Directory segment that marks nested sub-agent transcripts.
pub const SUBAGENT_DIR: &str = "subagents";

/// Returns the path to the Claude projects directory (~/.claude/projects).
///
/// # Errors
/// Returns `DiscoveryError::HomeDirNotFound` if the home directory cannot be determined.
pub fn claude_projects_dir() -> Result<PathBuf, DiscoveryError> {
    let home = dirs::home_dir().ok_or(DiscoveryError::HomeDirNotFound)?;
    Ok(home.join(".claude").join("projects"))
}

/// Decode a project directory name back into the path it was made from.
///
/// Claude encodes `/Users/foo/app` as `-Users-foo-app`. The decode is lossy:
/// a hyphen that was part of a real directory name comes back as `/`. Names
/// without the leading hyphen are not encoded paths and yield `None`.
pub fn decode_project_dir(encoded_name: &str) -> Option<String> {
    if encoded_name.starts_with('-') {
        Some(encoded_name.replace('-', "/"))
    } else {
        None
    }
}

/// Whether `path` names a top-level session transcript.
pub fn is_transcript_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
        && !path
            .components()
            .any(|c| matches!(c, Component::Normal(name) if name == SUBAGENT_DIR))
}

/// Recursively list transcript files under `root`, in file-name order.
/// Entries that cannot be read are skipped.
pub fn transcript_paths(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry under {:?}: {}", root, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_transcript_path(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Parse every transcript under `root`.
///
/// Sessions are ordered by start time, newest first; sessions without a
/// start time sort last.
///
/// # Errors
/// Returns an error only when the root itself cannot be read. A missing root
/// yields an empty list, and a transcript that fails to parse is skipped.
pub async fn scan_sessions(root: &Path) -> Result<Vec<Session>, DiscoveryError> {
    match tokio::fs::read_dir(root).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Transcript root does not exist: {:?}", root);
            return Ok(vec![]);
        }
        Err(e) => return Err(DiscoveryError::io(root, e)),
    }

    let walk_root = root.to_path_buf();
    let paths = tokio::task::spawn_blocking(move || transcript_paths(&walk_root))
        .await
        .map_err(|e| DiscoveryError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::other(e),
        })?;

    let mut sessions = Vec::with_capacity(paths.len());
    for path in &paths {
        match parse_session(path).await {
            Ok(session) => sessions.push(session),
            Err(e) => warn!("Skipping transcript {:?}: {}", path, e),
        }
    }

    sort_by_start_time(&mut sessions);
    info!("Scanned {} transcripts under {:?}", sessions.len(), root);
    Ok(sessions)
}

pub fn sort_by_start_time(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| {
        let a_start = a.start_time.as_deref().unwrap_or("");
        let b_start = b.start_time.as_deref().unwrap_or("");
        b_start.cmp(a_start)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        path
    }

    fn user_line(ts: &str, text: &str) -> String {
        format!(
            r#"{{"type":"user","timestamp":"{}","message":{{"content":"{}"}}}}"#,
            ts, text
        )
    }

    #[test]
    fn test_claude_projects_dir() {
        let path = claude_projects_dir().unwrap();
        assert!(path.to_string_lossy().contains(".claude"));
        assert!(path.ends_with("projects"));
    }

    #[test]
    fn test_decode_project_dir() {
        assert_eq!(decode_project_dir("-Users-foo-app").as_deref(), Some("/Users/foo/app"));
        // Lossy on real hyphens
        assert_eq!(decode_project_dir("-Users-foo-my-app").as_deref(), Some("/Users/foo/my/app"));
        assert_eq!(decode_project_dir("plain"), None);
    }

    #[test]
    fn test_is_transcript_path() {
        assert!(is_transcript_path(Path::new("/r/-p/abc.jsonl")));
        assert!(!is_transcript_path(Path::new("/r/-p/abc.json")));
        assert!(!is_transcript_path(Path::new("/r/-p/abc/subagents/agent-1.jsonl")));
        assert!(is_transcript_path(Path::new("/r/-p/subagents-notes.jsonl")));
    }

    #[test]
    fn test_transcript_paths_excludes_subagents() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "-a/one.jsonl", "");
        write(tmp.path(), "-a/one/subagents/agent.jsonl", "");
        write(tmp.path(), "-b/two.jsonl", "");
        write(tmp.path(), "-b/notes.txt", "");

        let names: Vec<String> = transcript_paths(tmp.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["one.jsonl", "two.jsonl"]);
    }

    #[tokio::test]
    async fn test_scan_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let sessions = scan_sessions(&tmp.path().join("nope")).await.unwrap();
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_scan_orders_by_start_time_desc() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "-p/old.jsonl", &user_line("2026-01-01T00:00:00Z", "older prompt"));
        write(tmp.path(), "-p/new.jsonl", &user_line("2026-03-01T00:00:00Z", "newer prompt"));
        write(tmp.path(), "-p/none.jsonl", "not json at all\n");

        let sessions = scan_sessions(tmp.path()).await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "none"]);
        assert_eq!(sessions[0].project_path.as_deref(), Some("/p"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_scan_skips_unreadable_file() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "-p/ok.jsonl", &user_line("2026-01-01T00:00:00Z", "fine prompt"));
        let locked = write(tmp.path(), "-p/locked.jsonl", "");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let sessions = scan_sessions(tmp.path()).await.unwrap();
        // Root can still open everything; only assert the readable one is present.
        assert!(sessions.iter().any(|s| s.id == "ok"));
    }
}
