//! Path confinement for sandbox construction.
//!
//! Every destination the engine writes to must stay inside the app's sandbox root.
//! Destinations are computed before the root exists, so confinement is checked
//! lexically: `.` and `..` are folded and the result must still start with the
//! root. Paths handed in from outside the engine (bundle paths, roots passed to
//! cleanup) go through real-path resolution instead, so symlinks cannot be used to
//! point them elsewhere.

use crate::error::SandboxError;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Join `inner` beneath `root`, treating an absolute `inner` as root-relative.
///
/// Fails with [`SandboxError::PathEscapesRoot`] when `..` segments would leave
/// the root.
pub fn confine(root: &Path, inner: &str) -> Result<PathBuf, SandboxError> {
    let root = normalize_path(root);
    let relative = inner.trim_start_matches('/');
    let joined = normalize_path(&root.join(relative));

    if joined.starts_with(&root) {
        Ok(joined)
    } else {
        Err(SandboxError::PathEscapesRoot {
            path: PathBuf::from(inner),
            root,
        })
    }
}

/// Canonicalize a caller-supplied path, resolving every symlink.
pub fn resolve_real_path(path: &Path) -> io::Result<PathBuf> {
    fs::canonicalize(path)
}

/// Validate that an existing `path` lies within `root` after resolving symlinks.
pub fn validate_path(path: &Path, root: &Path) -> Result<PathBuf, SandboxError> {
    let outside = |reason: String| SandboxError::Cleanup {
        path: path.to_path_buf(),
        reason,
    };

    let root_canonical = resolve_real_path(root)
        .map_err(|e| outside(format!("cannot resolve root '{}': {}", root.display(), e)))?;
    let resolved = resolve_real_path(path)
        .map_err(|e| outside(format!("cannot resolve path: {}", e)))?;

    if resolved != root_canonical && resolved.starts_with(&root_canonical) {
        Ok(resolved)
    } else {
        Err(outside(format!(
            "resolves to '{}', which is not inside '{}'",
            resolved.display(),
            root_canonical.display()
        )))
    }
}

/// Lexically normalize a path: drop `.`, fold `..` (never above `/`).
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut stack = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(stack.last(), Some(Component::Normal(_))) {
                    stack.pop();
                } else if !matches!(stack.last(), Some(Component::RootDir)) {
                    stack.push(component);
                }
            }
            c => stack.push(c),
        }
    }

    stack.iter().collect()
}
