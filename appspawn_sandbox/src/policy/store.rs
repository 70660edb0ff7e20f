//! Process-wide cache of the loaded sandbox policy.
//!
//! Readers take a snapshot (`Arc<SandboxPolicy>`) without locking; `store`
//! swaps in a complete new policy atomically. A document that fails to parse
//! never replaces the cached one.

use super::model::SandboxPolicy;
use crate::error::SandboxError;
use arc_swap::ArcSwapOption;
use std::path::Path;
use std::sync::{Arc, OnceLock};

static GLOBAL_STORE: OnceLock<Arc<PolicyStore>> = OnceLock::new();

#[derive(Debug, Default)]
pub struct PolicyStore {
    current: ArcSwapOption<SandboxPolicy>,
}

impl PolicyStore {
    /// An empty store. `get` fails with `NotLoaded` until something is stored.
    pub fn new() -> Self {
        Self::default()
    }

    /// The store shared by every launch in this process.
    pub fn global() -> Arc<PolicyStore> {
        GLOBAL_STORE
            .get_or_init(|| Arc::new(PolicyStore::new()))
            .clone()
    }

    /// Replace the cached policy.
    pub fn store(&self, policy: SandboxPolicy) {
        self.current.store(Some(Arc::new(policy)));
    }

    /// Parse `json` and, only if it is valid, replace the cached policy.
    pub fn store_json(&self, json: &str) -> Result<(), SandboxError> {
        let policy = SandboxPolicy::from_json(json)?;
        tracing::info!(
            "Sandbox policy stored (sandbox-switch={}, {} common mounts, {} private mounts, {} individual packages)",
            policy.sandbox_switch,
            policy.common.mount_paths.len(),
            policy.private.mount_paths.len(),
            policy.individual.len()
        );
        self.store(policy);
        Ok(())
    }

    /// Read a policy file and store it.
    pub fn load_file(&self, path: &Path) -> Result<(), SandboxError> {
        let json = std::fs::read_to_string(path).map_err(|source| SandboxError::PolicyRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.store_json(&json).inspect_err(|e| {
            tracing::error!("Rejected sandbox policy {}: {}", path.display(), e);
        })
    }

    /// Snapshot of the current policy.
    pub fn get(&self) -> Result<Arc<SandboxPolicy>, SandboxError> {
        self.current.load_full().ok_or(SandboxError::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }
}
