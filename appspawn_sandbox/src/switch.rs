//! Sandbox mode selection.

use crate::app::AppProperty;
use crate::policy::SandboxPolicy;
use serde::Serialize;
use std::fmt;

/// How strongly an app is sandboxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    /// The app runs against the unmodified system root.
    Off,
    /// Shared system view only.
    Common,
    /// Shared system view plus the package's private entries.
    Private,
}

impl SandboxMode {
    pub fn is_sandboxed(&self) -> bool {
        !matches!(self, SandboxMode::Off)
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SandboxMode::Off => "off",
            SandboxMode::Common => "common",
            SandboxMode::Private => "private",
        };
        f.write_str(name)
    }
}

/// Decide the mode for `app` under `policy`.
///
/// The global switch is checked first and nothing per-app can override it.
/// With sandboxing on, every app gets its private entries unless its
/// `individual` section sets `sandbox-switch: false`, which limits it to the
/// common view. An explicit private request from the app beats that package
/// switch.
pub fn evaluate(policy: &SandboxPolicy, app: &AppProperty) -> SandboxMode {
    if !policy.sandbox_switch {
        return SandboxMode::Off;
    }

    let package_switch = policy
        .individual
        .get(&app.package_name)
        .and_then(|section| section.sandbox_switch)
        .unwrap_or(true);

    if app.flags.private_sandbox || package_switch {
        SandboxMode::Private
    } else {
        SandboxMode::Common
    }
}
