//! Per-launch app identity supplied by the spawning subsystem.

use crate::error::SandboxError;
use std::path::PathBuf;

/// ABIs whose native libraries live under `lib64`.
const LP64_ABIS: &[&str] = &["arm64-v8a", "x86_64", "riscv64"];

/// Flags the spawner attaches to a launch request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppFlags {
    /// The app asks for its private entries even when its package switch is off.
    pub private_sandbox: bool,
}

/// Identity of the app being launched.
///
/// Owned by the caller; the engine only reads it for the duration of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppProperty {
    pub package_name: String,
    pub uid: u32,
    pub abi: String,
    pub bundle_path: Option<PathBuf>,
    pub flags: AppFlags,
}

impl AppProperty {
    /// Build a launch description with no bundle path and default flags.
    pub fn new(package_name: impl Into<String>, uid: u32, abi: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            uid,
            abi: abi.into(),
            bundle_path: None,
            flags: AppFlags::default(),
        }
    }

    pub fn with_bundle_path(mut self, bundle_path: impl Into<PathBuf>) -> Self {
        self.bundle_path = Some(bundle_path.into());
        self
    }

    pub fn with_private_sandbox(mut self, private_sandbox: bool) -> Self {
        self.flags.private_sandbox = private_sandbox;
        self
    }

    /// Reject identities that could steer a substituted path outside its parent.
    ///
    /// Package name and ABI are spliced into paths, so each must be exactly one
    /// ordinary path component.
    pub fn validate(&self) -> Result<(), SandboxError> {
        check_component("package_name", &self.package_name)?;
        check_component("abi", &self.abi)?;
        if let Some(bundle) = &self.bundle_path
            && !bundle.is_absolute()
        {
            return Err(SandboxError::InvalidAppProperty {
                field: "bundle_path",
                reason: format!("'{}' is not an absolute path", bundle.display()),
            });
        }
        Ok(())
    }

    /// Library directory name for this app's ABI (`lib64` or `lib`).
    pub fn lib_dir(&self) -> &'static str {
        if LP64_ABIS.contains(&self.abi.as_str()) {
            "lib64"
        } else {
            "lib"
        }
    }
}

fn check_component(field: &'static str, value: &str) -> Result<(), SandboxError> {
    let reason = if value.is_empty() {
        "must not be empty"
    } else if value == "." || value == ".." {
        "must not be '.' or '..'"
    } else if value.contains('/') {
        "must not contain '/'"
    } else if value.contains('\0') {
        "must not contain NUL"
    } else if value.contains('<') || value.contains('>') {
        "must not contain template brackets"
    } else {
        return Ok(());
    };

    Err(SandboxError::InvalidAppProperty {
        field,
        reason: format!("'{}' {}", value.escape_debug(), reason),
    })
}
