//! # Sandbox Orchestrator
//!
//! Sequences one app launch through the construction state machine:
//!
//! ```text
//! Idle ──plan──> RootReady ──common──> CommonApplied ──private──> PrivateApplied ──> Done
//!   └──────────────(sandbox off)──────────────────────────────────────────────────────┘
//! any non-terminal state ──failure──> Aborted
//! ```
//!
//! Every scope is planned while still `Idle`, so structural problems in the policy
//! (bad flags, malformed templates, escaping paths) are reported before anything
//! is created. Once application starts it runs to `Done` or stops at the first
//! failure with [`SandboxError::Aborted`]. Nothing is rolled back; the caller
//! discards the root.

use crate::app::AppProperty;
use crate::cleanup;
use crate::config::EngineConfig;
use crate::error::SandboxError;
use crate::mounter::{ApplyOutcome, LinuxMountSyscalls, MountSyscalls, Mounter};
use crate::planner::{Planner, ResolvedOperation, Scope};
use crate::policy::PolicyStore;
use crate::root::{RootBuilder, SandboxRootPath};
use crate::switch::{self, SandboxMode};
use crate::variables::VariableResolver;
use appspawn_common::{ConstructionState, ConstructionTracker};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, info_span};

/// Everything a launch would do, computed without side effects.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchPlan {
    pub package: String,
    pub uid: u32,
    pub mode: SandboxMode,
    pub root: SandboxRootPath,
    pub common: Vec<ResolvedOperation>,
    pub private: Vec<ResolvedOperation>,
}

impl LaunchPlan {
    pub fn operation_count(&self) -> usize {
        self.common.len() + self.private.len()
    }
}

/// An operation together with what applying it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedOperation {
    pub operation: ResolvedOperation,
    pub outcome: ApplyOutcome,
}

/// Record of a finished construction.
#[derive(Debug, Clone)]
pub struct Construction {
    pub root: SandboxRootPath,
    pub mode: SandboxMode,
    pub applied: Vec<AppliedOperation>,
    pub history: Vec<ConstructionState>,
}

impl Construction {
    pub fn newly_applied(&self) -> usize {
        self.applied
            .iter()
            .filter(|a| a.outcome == ApplyOutcome::Applied)
            .count()
    }
}

/// Builds sandboxes from the policy held in a [`PolicyStore`].
///
/// Cheap to share across threads; launches for different apps do not contend.
pub struct SandboxEngine<S: MountSyscalls = LinuxMountSyscalls> {
    store: Arc<PolicyStore>,
    config: EngineConfig,
    syscalls: S,
}

impl SandboxEngine<LinuxMountSyscalls> {
    pub fn new(store: Arc<PolicyStore>, config: EngineConfig) -> Self {
        Self::with_syscalls(store, config, LinuxMountSyscalls)
    }
}

impl<S: MountSyscalls> SandboxEngine<S> {
    pub fn with_syscalls(store: Arc<PolicyStore>, config: EngineConfig, syscalls: S) -> Self {
        Self {
            store,
            config,
            syscalls,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn syscalls(&self) -> &S {
        &self.syscalls
    }

    /// Resolve the full launch without touching the filesystem.
    pub fn plan(&self, app: &AppProperty) -> Result<LaunchPlan, SandboxError> {
        let policy = self.store.get()?;
        let mode = switch::evaluate(&policy, app);

        if !mode.is_sandboxed() {
            return Ok(LaunchPlan {
                package: app.package_name.clone(),
                uid: app.uid,
                mode,
                root: SandboxRootPath::new(&self.config.system_root),
                common: Vec::new(),
                private: Vec::new(),
            });
        }

        let resolver = VariableResolver::new(app, &self.config)?;
        let root = RootBuilder::new(&self.config).root_for(app, &policy, &resolver)?;
        let planner = Planner::new(&policy, &resolver, root.as_path());

        let common = planner.plan(Scope::Common)?;
        let private = match mode {
            SandboxMode::Private => planner.plan(Scope::Private)?,
            _ => Vec::new(),
        };

        Ok(LaunchPlan {
            package: app.package_name.clone(),
            uid: app.uid,
            mode,
            root,
            common,
            private,
        })
    }

    /// Build the sandbox for `app` and return its root.
    pub fn construct(&self, app: &AppProperty) -> Result<SandboxRootPath, SandboxError> {
        self.construct_detailed(app).map(|c| c.root)
    }

    /// Build the sandbox for `app`, reporting every applied operation.
    pub fn construct_detailed(&self, app: &AppProperty) -> Result<Construction, SandboxError> {
        let span = info_span!("construct_sandbox", package = %app.package_name, uid = app.uid);
        let _guard = span.enter();

        let mut tracker = ConstructionTracker::new();
        let plan = self.plan(app)?;

        if !plan.mode.is_sandboxed() {
            tracker.advance(ConstructionState::Done)?;
            info!("Sandbox switched off, using system root {}", plan.root);
            return Ok(Construction {
                root: plan.root,
                mode: plan.mode,
                applied: Vec::new(),
                history: tracker.history().to_vec(),
            });
        }

        let root = plan.root.clone();
        if let Err(cause) = RootBuilder::new(&self.config).create(&root) {
            let state = tracker.abort();
            error!("Sandbox root creation failed: {}", cause);
            return Err(SandboxError::Aborted {
                package: app.package_name.clone(),
                root: root.as_path().to_path_buf(),
                state,
                applied: 0,
                cause: Box::new(cause),
            });
        }
        tracker.advance(ConstructionState::RootReady)?;

        let mut mounter = Mounter::new(&self.syscalls, self.config.effective_dir_mode());
        let mut applied = Vec::with_capacity(plan.operation_count());

        let mut stages = vec![(&plan.common, ConstructionState::CommonApplied)];
        if plan.mode == SandboxMode::Private {
            stages.push((&plan.private, ConstructionState::PrivateApplied));
        }

        for (operations, reached) in stages {
            for operation in operations {
                match mounter.apply(operation) {
                    Ok(outcome) => applied.push(AppliedOperation {
                        operation: operation.clone(),
                        outcome,
                    }),
                    Err(cause) => {
                        let state = tracker.abort();
                        error!("Sandbox construction aborted at {}: {}", operation, cause);
                        return Err(SandboxError::Aborted {
                            package: app.package_name.clone(),
                            root: root.as_path().to_path_buf(),
                            state,
                            applied: applied.len(),
                            cause: Box::new(cause),
                        });
                    }
                }
            }
            tracker.advance(reached)?;
        }
        tracker.advance(ConstructionState::Done)?;

        let construction = Construction {
            root,
            mode: plan.mode,
            applied,
            history: tracker.history().to_vec(),
        };
        info!(
            "Sandbox ready at {} ({} mode, {} applied, {} already present)",
            construction.root,
            construction.mode,
            construction.newly_applied(),
            construction.applied.len() - construction.newly_applied()
        );
        Ok(construction)
    }

    /// Delete a sandbox root under this engine's install root.
    pub fn discard(&self, root: &Path) -> Result<(), SandboxError> {
        cleanup::discard(root, &self.config.install_root, &self.syscalls)
    }
}

/// Build the sandbox for `app` with the process-wide policy and environment config.
///
/// This is the entry point for the spawning subsystem. The policy must already be
/// stored in [`PolicyStore::global`].
pub fn construct_sandbox(app: &AppProperty) -> Result<SandboxRootPath, SandboxError> {
    SandboxEngine::new(PolicyStore::global(), EngineConfig::from_env()).construct(app)
}
