//! # Mounter
//!
//! Executes resolved operations. This is the only module that issues mount or
//! symlink syscalls; everything privileged goes through [`MountSyscalls`].
//!
//! A bind mount with extra flags is more than one kernel call: the initial bind
//! ignores `MS_RDONLY` and friends, and propagation changes are their own call.
//! [`mount_calls`] computes that sequence without touching anything.
//!
//! A target that is already a mount point still gets its remount and
//! propagation calls: a launch that stopped between the bind and the remount
//! leaves a writable mount behind, and a retry must not accept it as is.

pub mod mountinfo;
pub mod syscalls;

pub use syscalls::{LinuxMountSyscalls, MountSyscalls};

use crate::error::SandboxError;
use crate::planner::flags::{PROPAGATION_FLAGS, REMOUNT_FLAGS};
use crate::planner::{MountOperation, ResolvedOperation, SymlinkOperation};
use crate::root::create_dir_tree;
use nix::mount::MsFlags;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Never granted by `dest-mode`.
const WORLD_WRITE: u32 = 0o002;

/// One `mount(2)` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountCall {
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub flags: MsFlags,
}

/// Result of applying one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyOutcome {
    Applied,
    /// Mount already in place, or link already pointing at the same source.
    AlreadyPresent,
}

/// Kernel calls needed to realise `op`.
pub fn mount_calls(op: &MountOperation) -> Vec<MountCall> {
    let recursive = op.flags & MsFlags::MS_REC;
    let mut calls = vec![MountCall {
        source: Some(op.source.clone()),
        target: op.target.clone(),
        flags: MsFlags::MS_BIND | recursive,
    }];

    let remount = op.flags & REMOUNT_FLAGS;
    if !remount.is_empty() {
        calls.push(MountCall {
            source: None,
            target: op.target.clone(),
            flags: MsFlags::MS_BIND | MsFlags::MS_REMOUNT | remount,
        });
    }

    let propagation = op.flags & PROPAGATION_FLAGS;
    if !propagation.is_empty() {
        calls.push(MountCall {
            source: None,
            target: op.target.clone(),
            flags: propagation | recursive,
        });
    }
    calls
}

/// Calls that bring an existing mount at `op.target` in line with `op.flags`.
pub fn reapply_calls(op: &MountOperation) -> Vec<MountCall> {
    mount_calls(op).into_iter().skip(1).collect()
}

/// Applies operations for one construction.
///
/// Targets mounted by this instance are remembered, so a later entry for the
/// same target stacks on top instead of being mistaken for a previous run's mount.
pub struct Mounter<'a, S: MountSyscalls + ?Sized> {
    syscalls: &'a S,
    dir_mode: u32,
    mounted: HashSet<PathBuf>,
}

impl<'a, S: MountSyscalls + ?Sized> Mounter<'a, S> {
    pub fn new(syscalls: &'a S, dir_mode: u32) -> Self {
        Self {
            syscalls,
            dir_mode,
            mounted: HashSet::new(),
        }
    }

    pub fn apply(&mut self, op: &ResolvedOperation) -> Result<ApplyOutcome, SandboxError> {
        match op {
            ResolvedOperation::Mount(mount) => self.apply_mount(mount),
            ResolvedOperation::Symlink(link) => self.apply_symlink(link),
        }
    }

    fn apply_mount(&mut self, op: &MountOperation) -> Result<ApplyOutcome, SandboxError> {
        let error = |reason: String| SandboxError::Mount {
            source_path: op.source.clone(),
            target: op.target.clone(),
            flags: op.flags.bits() as u64,
            reason,
        };

        let already_mounted = !self.mounted.contains(&op.target)
            && self
                .syscalls
                .is_mount_point(&op.target)
                .map_err(|e| error(format!("cannot read mount table: {e}")))?;

        if already_mounted {
            self.run_calls(reapply_calls(op), &error)?;
            self.apply_mode(op).map_err(|e| error(e.to_string()))?;
            tracing::debug!("{} already mounted, flags reapplied", op.target.display());
            return Ok(ApplyOutcome::AlreadyPresent);
        }

        self.prepare_target(op).map_err(|e| error(e.to_string()))?;
        self.run_calls(mount_calls(op), &error)?;
        self.mounted.insert(op.target.clone());
        self.apply_mode(op).map_err(|e| error(e.to_string()))?;
        tracing::debug!(
            "Mounted {} on {}",
            op.source.display(),
            op.target.display()
        );
        Ok(ApplyOutcome::Applied)
    }

    fn run_calls(
        &self,
        calls: Vec<MountCall>,
        error: &impl Fn(String) -> SandboxError,
    ) -> Result<(), SandboxError> {
        for call in calls {
            self.syscalls
                .mount(call.source.as_deref(), &call.target, call.flags)
                .map_err(|errno| {
                    error(format!("{} (call flags {:#x})", errno, call.flags.bits()))
                })?;
        }
        Ok(())
    }

    /// Set the configured `dest-mode` on a mounted target, minus world-write.
    fn apply_mode(&self, op: &MountOperation) -> io::Result<()> {
        let Some(mode) = op.mode else {
            return Ok(());
        };
        fs::set_permissions(&op.target, fs::Permissions::from_mode(mode & !WORLD_WRITE))
            .map_err(|e| io::Error::new(e.kind(), format!("cannot set mode {mode:04o}: {e}")))
    }

    /// Directory source gets a directory target, file source an empty file.
    fn prepare_target(&self, op: &MountOperation) -> io::Result<()> {
        let metadata = fs::metadata(&op.source).map_err(|e| {
            io::Error::new(e.kind(), format!("source unavailable: {e}"))
        })?;

        if metadata.is_dir() {
            return create_dir_tree(&op.target, self.dir_mode);
        }

        if let Some(parent) = op.target.parent() {
            create_dir_tree(parent, self.dir_mode)?;
        }
        if !op.target.exists() {
            fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&op.target)?;
        }
        Ok(())
    }

    fn apply_symlink(&self, op: &SymlinkOperation) -> Result<ApplyOutcome, SandboxError> {
        let error = |reason: String| SandboxError::Symlink {
            source_path: op.source.clone(),
            link: op.link.clone(),
            reason,
        };

        if let Some(parent) = op.link.parent() {
            create_dir_tree(parent, self.dir_mode).map_err(|e| error(e.to_string()))?;
        }

        match std::os::unix::fs::symlink(&op.source, &op.link) {
            Ok(()) => {
                tracing::debug!("Linked {} -> {}", op.link.display(), op.source.display());
                Ok(ApplyOutcome::Applied)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                match existing_link(&op.link) {
                    Some(existing) if existing == op.source => Ok(ApplyOutcome::AlreadyPresent),
                    Some(existing) => Err(error(format!(
                        "already exists and points to '{}'",
                        existing.display()
                    ))),
                    None => Err(error("already exists and is not a symlink".to_string())),
                }
            }
            Err(e) => Err(error(e.to_string())),
        }
    }
}

fn existing_link(path: &Path) -> Option<PathBuf> {
    fs::read_link(path).ok()
}
