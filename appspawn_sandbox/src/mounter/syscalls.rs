//! The privileged syscall seam.

use super::mountinfo;
use nix::mount::MsFlags;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// Kernel mount primitives used by [`super::Mounter`].
///
/// Production code uses [`LinuxMountSyscalls`]; tests substitute a recorder so the
/// whole engine runs without privileges.
pub trait MountSyscalls: Send + Sync {
    /// `mount(2)` with no filesystem type and no data.
    fn mount(&self, source: Option<&Path>, target: &Path, flags: MsFlags) -> nix::Result<()>;

    /// Every current mount point of the calling process's namespace.
    fn mount_points(&self) -> io::Result<Vec<PathBuf>>;

    fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        Ok(self.mount_points()?.iter().any(|p| p == path))
    }

    /// Mount points at or below `path`.
    fn mount_points_under(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .mount_points()?
            .into_iter()
            .filter(|p| p.starts_with(path))
            .collect())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxMountSyscalls;

impl MountSyscalls for LinuxMountSyscalls {
    fn mount(&self, source: Option<&Path>, target: &Path, flags: MsFlags) -> nix::Result<()> {
        nix::mount::mount(source, target, None::<&str>, flags, None::<&str>)
    }

    fn mount_points(&self) -> io::Result<Vec<PathBuf>> {
        let content = fs::read_to_string(MOUNTINFO_PATH)?;
        Ok(mountinfo::parse_mount_points(&content))
    }

    /// Compares against the canonical form of `path` so symlinked install roots
    /// still match the kernel's view.
    fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        Ok(self.mount_points()?.iter().any(|p| *p == canonical))
    }
}
