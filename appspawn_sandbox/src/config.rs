//! # Engine Configuration
//!
//! Filesystem locations and permissions the engine works with. These are not part
//! of the policy document: they describe the device layout, not what an app may see.
//!
//! Resolution order for each setting (highest wins):
//! 1. CLI flags of the `appspawn_sandbox` binary
//! 2. `APPSPAWN_INSTALL_ROOT`, `APPSPAWN_DATA_ROOT`, `APPSPAWN_SYSTEM_ROOT`
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

pub const DEFAULT_INSTALL_ROOT: &str = "/mnt/sandbox";
pub const DEFAULT_DATA_ROOT: &str = "/data/app/el2";
pub const DEFAULT_SYSTEM_ROOT: &str = "/";
pub const DEFAULT_POLICY_PATH: &str = "/system/etc/sandbox/appdata-sandbox.json";

/// Owner rwx, group and other may only traverse.
pub const DEFAULT_DIR_MODE: u32 = 0o711;

/// Bits that are never granted on directories the engine creates.
const FORBIDDEN_MODE_BITS: u32 = 0o7002;

/// Bits that are always granted: the owner must be able to enter what it built.
const OWNER_MODE_BITS: u32 = 0o700;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Parent of every per-uid sandbox tree.
    pub install_root: PathBuf,
    /// Parent of per-uid package data directories.
    pub data_root: PathBuf,
    /// Root returned when sandboxing is switched off.
    pub system_root: PathBuf,
    /// Mode for directories the engine creates.
    pub dir_mode: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            install_root: PathBuf::from(DEFAULT_INSTALL_ROOT),
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            system_root: PathBuf::from(DEFAULT_SYSTEM_ROOT),
            dir_mode: DEFAULT_DIR_MODE,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `APPSPAWN_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = env_path("APPSPAWN_INSTALL_ROOT") {
            config.install_root = path;
        }
        if let Some(path) = env_path("APPSPAWN_DATA_ROOT") {
            config.data_root = path;
        }
        if let Some(path) = env_path("APPSPAWN_SYSTEM_ROOT") {
            config.system_root = path;
        }
        config
    }

    /// Configuration rooted entirely under `base`, used for tests and dry runs.
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            install_root: base.join("mnt/sandbox"),
            data_root: base.join("data/app/el2"),
            system_root: base.join("system_root"),
            dir_mode: DEFAULT_DIR_MODE,
        }
    }

    /// `dir_mode` with owner rwx forced on and setuid/setgid/sticky and
    /// world-write removed. Only the group and other bits are configurable.
    pub fn effective_dir_mode(&self) -> u32 {
        (self.dir_mode & 0o777 & !FORBIDDEN_MODE_BITS) | OWNER_MODE_BITS
    }

    /// `<data_root>/<uid>/base/<package>`
    pub fn package_data_root(&self, uid: u32, package_name: &str) -> PathBuf {
        self.data_root
            .join(uid.to_string())
            .join("base")
            .join(package_name)
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
