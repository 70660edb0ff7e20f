//! # Sandbox Policy Model
//!
//! Strongly typed form of the JSON mount policy. Documents are decoded eagerly at
//! load time; everything downstream works on these types, never on raw JSON.
//!
//! ## Document shape
//!
//! ```json
//! {
//!   "sandbox-switch": true,
//!   "common":  { "mount-paths": [...], "symlinks": [...], "install": [...] },
//!   "private": { "mount-paths": [...], "symlinks": [...], "install": [...] },
//!   "individual": { "com.example.app": { "sandbox-switch": true, "mount-paths": [...] } }
//! }
//! ```
//!
//! Unknown fields are rejected everywhere so a misspelled key fails the load
//! instead of silently dropping a restriction.

use crate::error::SandboxError;
use crate::variables;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The complete policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SandboxPolicy {
    /// Global switch. When false no app is sandboxed, whatever its own settings.
    pub sandbox_switch: bool,
    /// Applied to every sandboxed app.
    pub common: PolicySection,
    /// Applied to apps running in private mode.
    pub private: PolicySection,
    /// Per-package additions, applied after `private` for that package only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub individual: BTreeMap<String, PackageSection>,
}

/// An ordered group of mount, symlink and install entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PolicySection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mount_paths: Vec<MountPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symlinks: Vec<SymlinkPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<InstallPoint>,
}

/// Per-package section with its own switch and root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PackageSection {
    /// `false` limits this package to the common view. Absent or `true` keeps
    /// its private entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_switch: Option<bool>,
    /// Root path template replacing `<install_root>/<uid>/sandbox/<package>`.
    /// Must resolve inside the install root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_root: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mount_paths: Vec<MountPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symlinks: Vec<SymlinkPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub install: Vec<InstallPoint>,
}

/// One planned bind mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MountPoint {
    /// Host path template. Relative results are taken from the package data root.
    pub source: String,
    /// Path template inside the sandbox root.
    pub target: String,
    /// Symbolic mount flags, e.g. `["rec", "rdonly"]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// Mode applied to the target after mounting, e.g. `"S_IRWXU|S_IXOTH"`.
    #[serde(rename = "dest-mode", default, skip_serializing_if = "Option::is_none")]
    pub dest_mode: Option<String>,
}

/// One planned symbolic link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SymlinkPoint {
    /// What the link points to.
    pub source: String,
    /// Where the link is created. Empty means "same name as the source".
    #[serde(default)]
    pub target: String,
}

/// Links the binaries of an installed native package into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct InstallPoint {
    /// Installed package directory template.
    pub source: String,
    /// Directory inside the sandbox root that receives the links.
    pub target: String,
    /// Explicit links, relative to `source`. When absent, every regular file in
    /// `<source>/bin` is linked by its own name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<SymlinkPoint>>,
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

impl fmt::Display for SymlinkPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.source, self.target)
    }
}

/// Borrowed view over the entries of either section kind.
#[derive(Debug, Clone, Copy)]
pub struct SectionEntries<'a> {
    pub label: &'a str,
    pub sandbox_root: Option<&'a str>,
    pub mount_paths: &'a [MountPoint],
    pub symlinks: &'a [SymlinkPoint],
    pub install: &'a [InstallPoint],
}

impl PolicySection {
    pub fn entries<'a>(&'a self, label: &'a str) -> SectionEntries<'a> {
        SectionEntries {
            label,
            sandbox_root: None,
            mount_paths: &self.mount_paths,
            symlinks: &self.symlinks,
            install: &self.install,
        }
    }
}

impl PackageSection {
    pub fn entries<'a>(&'a self, label: &'a str) -> SectionEntries<'a> {
        SectionEntries {
            label,
            sandbox_root: self.sandbox_root.as_deref(),
            mount_paths: &self.mount_paths,
            symlinks: &self.symlinks,
            install: &self.install,
        }
    }
}

impl SectionEntries<'_> {
    /// Every path template in the section, nested install links included.
    pub fn templates(&self) -> impl Iterator<Item = &str> {
        let root = self.sandbox_root.into_iter();
        let mounts = self
            .mount_paths
            .iter()
            .flat_map(|m| [m.source.as_str(), m.target.as_str()]);
        let links = self
            .symlinks
            .iter()
            .flat_map(|s| [s.source.as_str(), s.target.as_str()]);
        let installs = self.install.iter().flat_map(|i| {
            let nested = i
                .links
                .iter()
                .flatten()
                .flat_map(|l| [l.source.as_str(), l.target.as_str()]);
            [i.source.as_str(), i.target.as_str()]
                .into_iter()
                .chain(nested)
        });
        root.chain(mounts).chain(links).chain(installs)
    }
}

impl SandboxPolicy {
    /// Parse and validate a policy document.
    pub fn from_json(json: &str) -> Result<Self, SandboxError> {
        let policy: SandboxPolicy =
            serde_json::from_str(json).map_err(|e| SandboxError::PolicyParse {
                reason: e.to_string(),
            })?;
        policy.validate()?;
        Ok(policy)
    }

    /// Every section of the document, common first.
    pub fn sections(&self) -> Vec<SectionEntries<'_>> {
        let mut sections = vec![
            self.common.entries("common"),
            self.private.entries("private"),
        ];
        sections.extend(
            self.individual
                .iter()
                .map(|(package, section)| section.entries(package)),
        );
        sections
    }

    /// Structural checks serde cannot express.
    ///
    /// Template syntax is checked here so a malformed path fails the load rather
    /// than a later launch. Mount flag tokens are checked by the planner.
    pub fn validate(&self) -> Result<(), SandboxError> {
        for section in self.sections() {
            for template in section.templates() {
                variables::check_template(template).map_err(|e| SandboxError::PolicyParse {
                    reason: format!("section '{}': {}", section.label, e),
                })?;
            }
            if section.sandbox_root.is_some_and(str::is_empty) {
                return Err(SandboxError::PolicyParse {
                    reason: format!("section '{}': sandbox-root is empty", section.label),
                });
            }
            for mount in section.mount_paths {
                if mount.source.is_empty() || mount.target.is_empty() {
                    return Err(SandboxError::PolicyParse {
                        reason: format!(
                            "section '{}': mount entry '{}' needs both source and target",
                            section.label, mount
                        ),
                    });
                }
            }
            for link in section.symlinks {
                if link.source.is_empty() {
                    return Err(SandboxError::PolicyParse {
                        reason: format!(
                            "section '{}': symlink entry has an empty source",
                            section.label
                        ),
                    });
                }
            }
            for install in section.install {
                if install.source.is_empty() {
                    return Err(SandboxError::PolicyParse {
                        reason: format!(
                            "section '{}': install entry has an empty source",
                            section.label
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
