//! # AppSpawn Sandbox
//!
//! The filesystem sandbox construction engine used when spawning application
//! processes. Before application code runs, each app gets a private root directory
//! assembled from bind mounts and symlinks, driven by a declarative JSON policy.
//! This isolation step is the boundary between the shared system image and each
//! running app.
//!
//! ## Entry Point
//!
//! ```rust,no_run
//! use appspawn_sandbox::{AppProperty, PolicyStore, construct_sandbox};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), appspawn_sandbox::SandboxError> {
//! PolicyStore::global().load_file(Path::new("/system/etc/sandbox/appdata-sandbox.json"))?;
//!
//! let app = AppProperty::new("com.example.demo", 100, "arm64-v8a");
//! let root = construct_sandbox(&app)?;
//! println!("switch the process root to {root}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Construction Pipeline
//!
//! 1. **Switch** ([`switch`]): the global `sandbox-switch` beats everything; with it
//!    on, an app runs in `common` or `private` mode.
//! 2. **Plan** ([`planner`]): policy entries are resolved against the app's
//!    variables ([`variables`]) into concrete, confined operations. No side effects.
//! 3. **Root** ([`root`]): `<install_root>/<uid>/sandbox/<package>` is created.
//! 4. **Apply** ([`mounter`]): operations run in order, common before private,
//!    document order within each. The first failure aborts the launch.
//!
//! Aborted constructions are not rolled back. The error carries the partial root,
//! which must be discarded ([`cleanup`]) rather than used.
//!
//! ## Modules
//!
//! - **`policy`**: typed policy document and the lock-free [`PolicyStore`].
//! - **`variables`**: the closed placeholder set and its resolver.
//! - **`planner`**: mount flag table, mount and symlink planning.
//! - **`mounter`**: the only module issuing mount and symlink syscalls.
//! - **`orchestrator`**: [`SandboxEngine`] and the state machine driver.
//! - **`shell`**: the `appspawn_sandbox` operator CLI.

pub mod app;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod mounter;
pub mod orchestrator;
pub mod path_security;
pub mod planner;
pub mod policy;
pub mod root;
pub mod shell;
pub mod switch;
pub mod utils;
pub mod variables;

// Test utilities
pub mod test_utils;

pub use app::{AppFlags, AppProperty};
pub use config::EngineConfig;
pub use error::SandboxError;
pub use orchestrator::{Construction, LaunchPlan, SandboxEngine, construct_sandbox};
pub use policy::{PolicyStore, SandboxPolicy};
pub use root::SandboxRootPath;
pub use switch::SandboxMode;
