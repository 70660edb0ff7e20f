//! Test helpers for appspawn_sandbox.
//!
//! [`RecordingMountSyscalls`] stands in for the kernel so the full engine runs
//! unprivileged; [`SandboxFixture`] lays out a throwaway device tree (install
//! root, package data, system root) inside a temporary directory.

use crate::config::EngineConfig;
use crate::mounter::{MountCall, MountSyscalls};
use crate::orchestrator::SandboxEngine;
use crate::policy::PolicyStore;
use crate::utils::logging::{LogTarget, init_logging};
use nix::errno::Errno;
use nix::mount::MsFlags;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;

/// Trace-level logging to stderr for tests.
pub fn init_test_logging() {
    let _ = init_logging("trace", LogTarget::Stderr);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Recording syscalls
// =============================================================================

/// In-memory mount table that records every `mount(2)` request.
///
/// A call with `MS_BIND` and without `MS_REMOUNT` creates a mount point at its
/// target; remounts and propagation changes only get recorded.
#[derive(Debug, Default)]
pub struct RecordingMountSyscalls {
    calls: Mutex<Vec<MountCall>>,
    mounted: Mutex<Vec<PathBuf>>,
    fail_target: Mutex<Option<(PathBuf, Errno)>>,
    fail_once: Mutex<Option<(PathBuf, MsFlags, Errno)>>,
}

impl RecordingMountSyscalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every mount on `target` fail with `errno`.
    pub fn fail_on(&self, target: impl Into<PathBuf>, errno: Errno) {
        *lock(&self.fail_target) = Some((target.into(), errno));
    }

    /// Fail only the next call on `target` whose flags contain `flags`.
    pub fn fail_once_on(&self, target: impl Into<PathBuf>, flags: MsFlags, errno: Errno) {
        *lock(&self.fail_once) = Some((target.into(), flags, errno));
    }

    pub fn calls(&self) -> Vec<MountCall> {
        lock(&self.calls).clone()
    }

    /// Targets of the initial bind calls, in order.
    pub fn bind_targets(&self) -> Vec<PathBuf> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.source.is_some())
            .map(|c| c.target.clone())
            .collect()
    }

    pub fn mounted(&self) -> Vec<PathBuf> {
        lock(&self.mounted).clone()
    }

    /// Drop every mount at or below `path`, as `umount -R` would.
    pub fn unmount_under(&self, path: &Path) {
        lock(&self.mounted).retain(|p| !p.starts_with(path));
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }
}

impl MountSyscalls for RecordingMountSyscalls {
    fn mount(&self, source: Option<&Path>, target: &Path, flags: MsFlags) -> nix::Result<()> {
        if let Some((failing, errno)) = lock(&self.fail_target).as_ref()
            && failing == target
        {
            return Err(*errno);
        }
        {
            let mut once = lock(&self.fail_once);
            if let Some((failing, wanted, errno)) = once.as_ref()
                && failing == target
                && flags.contains(*wanted)
            {
                let errno = *errno;
                *once = None;
                return Err(errno);
            }
        }

        lock(&self.calls).push(MountCall {
            source: source.map(Path::to_path_buf),
            target: target.to_path_buf(),
            flags,
        });
        if flags.contains(MsFlags::MS_BIND) && !flags.contains(MsFlags::MS_REMOUNT) {
            lock(&self.mounted).push(target.to_path_buf());
        }
        Ok(())
    }

    fn mount_points(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self.mounted())
    }
}

// =============================================================================
// Device tree fixture
// =============================================================================

/// A temporary device layout with an engine wired to recording syscalls.
pub struct SandboxFixture {
    pub temp: TempDir,
    /// Canonical form of the temporary directory; every fixture path is below it.
    pub base: PathBuf,
    pub config: EngineConfig,
    pub store: Arc<PolicyStore>,
}

impl SandboxFixture {
    pub fn new() -> io::Result<Self> {
        let temp = TempDir::new()?;
        let base = fs::canonicalize(temp.path())?;
        let config = EngineConfig::rooted_at(&base);
        fs::create_dir_all(&config.system_root)?;
        Ok(Self {
            temp,
            base,
            config,
            store: Arc::new(PolicyStore::new()),
        })
    }

    /// Fixture with `policy_json` already stored.
    pub fn with_policy(policy_json: &str) -> anyhow::Result<Self> {
        let fixture = Self::new()?;
        fixture.store.store_json(policy_json)?;
        Ok(fixture)
    }

    pub fn engine(&self) -> SandboxEngine<RecordingMountSyscalls> {
        SandboxEngine::with_syscalls(
            self.store.clone(),
            self.config.clone(),
            RecordingMountSyscalls::new(),
        )
    }

    /// Create a directory under the package data root of `uid`/`package`.
    pub fn package_dir(&self, uid: u32, package: &str, relative: &str) -> io::Result<PathBuf> {
        let dir = self.config.package_data_root(uid, package).join(relative);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Create a directory anywhere in the fixture.
    pub fn host_dir(&self, relative: &str) -> io::Result<PathBuf> {
        let dir = self.base.join(relative);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Create a file anywhere in the fixture, with parents.
    pub fn host_file(&self, relative: &str) -> io::Result<PathBuf> {
        let file = self.base.join(relative);
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file, b"")?;
        Ok(file)
    }

    /// Absolute path string for use inside policy templates.
    pub fn host_path(&self, relative: &str) -> String {
        self.base.join(relative).to_string_lossy().into_owned()
    }

    /// Write a policy document to disk and return its path.
    pub fn write_policy_file(&self, json: &str) -> io::Result<PathBuf> {
        let path = self.base.join("appdata-sandbox.json");
        fs::write(&path, json)?;
        Ok(path)
    }
}
