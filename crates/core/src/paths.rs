//! Path resolution shared by the reconciler and the process locator.
//!
//! Working directories reported by the OS and project paths recorded in
//! transcripts only compare equal after both go through [`resolve_path`].

use std::path::{Component, Path, PathBuf};

/// Resolve `path` to an absolute, symlink-free form.
///
/// Existing paths are canonicalised. Paths that no longer exist (a deleted
/// project, a decoded directory slug) are made absolute against the current
/// directory and normalised lexically. Returns `None` only when no absolute
/// form can be produced.
pub fn resolve_path(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Some(canonical);
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    Some(normalize_lexically(&absolute))
}

/// Drop `.` components and fold `..` into its parent without touching the
/// filesystem. `..` at the root stays at the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
