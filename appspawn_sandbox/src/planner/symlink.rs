//! Symlink and install-link planning.

use super::{PlanContext, ResolvedOperation, Scope, SymlinkOperation};
use crate::error::SandboxError;
use crate::path_security::normalize_path;
use crate::policy::{InstallPoint, SymlinkPoint};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Resolve plain `symlinks` entries.
///
/// An empty target places the link at the source's own path inside the root,
/// so its file name is the source's basename.
pub fn plan(
    ctx: &PlanContext<'_>,
    scope: Scope,
    entries: &[SymlinkPoint],
) -> Result<Vec<ResolvedOperation>, SandboxError> {
    entries
        .iter()
        .map(|entry| {
            let source = ctx.source_path(&entry.source)?;
            let link = if entry.target.is_empty() {
                let parent = source.parent().unwrap_or(Path::new("/"));
                let name = file_name(&source, &source)?;
                ctx.destination_path(&parent.join(name).to_string_lossy())?
            } else {
                ctx.destination_path(&entry.target)?
            };
            Ok(symlink(scope, source, link))
        })
        .collect()
}

/// Resolve `install` entries into one link per binary.
pub fn plan_installs(
    ctx: &PlanContext<'_>,
    scope: Scope,
    entries: &[InstallPoint],
) -> Result<Vec<ResolvedOperation>, SandboxError> {
    let mut ops = Vec::new();
    for entry in entries {
        let install_dir = ctx.source_path(&entry.source)?;
        let dest_dir = ctx.destination_path(&entry.target)?;

        match &entry.links {
            Some(links) => {
                for link in links {
                    let resolved = PathBuf::from(ctx.resolver.resolve(&link.source)?);
                    let source = normalize_path(&install_dir.join(resolved));
                    let name_from = if link.target.is_empty() {
                        source.clone()
                    } else {
                        PathBuf::from(ctx.resolver.resolve(&link.target)?)
                    };
                    let name = file_name(&name_from, &source)?;
                    ops.push(symlink(scope, source, dest_dir.join(name)));
                }
            }
            None => {
                let bin_dir = install_dir.join("bin");
                for name in regular_files(&bin_dir, &dest_dir)? {
                    ops.push(symlink(scope, bin_dir.join(&name), dest_dir.join(&name)));
                }
            }
        }
    }
    Ok(ops)
}

fn symlink(scope: Scope, source: PathBuf, link: PathBuf) -> ResolvedOperation {
    ResolvedOperation::Symlink(SymlinkOperation {
        scope,
        source,
        link,
    })
}

/// Last component of `path`. A path without one (`/`, `..`) cannot name a link.
fn file_name(path: &Path, source: &Path) -> Result<PathBuf, SandboxError> {
    path.file_name()
        .map(PathBuf::from)
        .ok_or_else(|| SandboxError::InvalidTemplate {
            template: path.display().to_string(),
            reason: format!("cannot derive a link name for '{}'", source.display()),
        })
}

/// Names of regular files directly in `dir`, sorted. A missing `dir` is empty.
fn regular_files(dir: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, SandboxError> {
    let scan_error = |e: io::Error| SandboxError::Symlink {
        source_path: dir.to_path_buf(),
        link: dest_dir.to_path_buf(),
        reason: format!("cannot list binaries: {e}"),
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("No bin directory at {}, nothing to link", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(scan_error(e)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(scan_error)?;
        if entry.file_type().map_err(scan_error)?.is_file() {
            names.push(PathBuf::from(entry.file_name()));
        } else {
            tracing::debug!("Skipping non-regular entry {}", entry.path().display());
        }
    }
    names.sort();
    Ok(names)
}
