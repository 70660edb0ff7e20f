//! Removal of sandbox roots left behind by aborted or finished launches.

use crate::error::SandboxError;
use crate::mounter::MountSyscalls;
use crate::path_security;
use std::fs;
use std::path::Path;

/// Recursively delete `root`, which must be a directory inside `install_root`.
///
/// The path is resolved with the real-path utility first, so a symlink cannot
/// redirect the delete. A root with anything still mounted below it is refused:
/// deleting through a live bind mount would delete host files.
pub fn discard<S: MountSyscalls + ?Sized>(
    root: &Path,
    install_root: &Path,
    syscalls: &S,
) -> Result<(), SandboxError> {
    let resolved = path_security::validate_path(root, install_root)?;

    let remaining = syscalls
        .mount_points_under(&resolved)
        .map_err(|e| SandboxError::Cleanup {
            path: resolved.clone(),
            reason: format!("cannot read mount table: {e}"),
        })?;
    if let Some(first) = remaining.first() {
        return Err(SandboxError::Cleanup {
            path: resolved.clone(),
            reason: format!(
                "{} mount point(s) still present, first '{}'",
                remaining.len(),
                first.display()
            ),
        });
    }

    fs::remove_dir_all(&resolved).map_err(|e| SandboxError::Cleanup {
        path: resolved.clone(),
        reason: e.to_string(),
    })?;
    tracing::info!("Discarded sandbox root {}", resolved.display());
    Ok(())
}
