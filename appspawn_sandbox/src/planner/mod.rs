//! # Operation Planning
//!
//! Turns policy entries into concrete, ordered operations for one launch. Planning
//! is a pure transformation over the policy and the resolver: nothing is created,
//! mounted or linked here. The only filesystem access is reading an install
//! directory's `bin/` listing when an install entry has no explicit links.
//!
//! Ordering within a scope:
//! 1. every `mount-paths` entry, section by section, in document order
//! 2. every `symlinks` entry, same order
//! 3. every `install` entry, same order
//!
//! The common scope is `common`. The private scope is `private` followed by the
//! package's `individual` section, if any.

pub mod flags;
pub mod mount;
pub mod symlink;

use crate::error::SandboxError;
use crate::path_security::{self, normalize_path};
use crate::policy::{SandboxPolicy, SectionEntries};
use crate::variables::VariableResolver;
use nix::mount::MsFlags;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which part of the policy an operation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Common,
    Private,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Common => f.write_str("common"),
            Scope::Private => f.write_str("private"),
        }
    }
}

/// A bind mount with concrete paths and mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountOperation {
    pub scope: Scope,
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(serialize_with = "serialize_flags")]
    pub flags: MsFlags,
    /// Permissions set on `target` once mounted.
    #[serde(serialize_with = "serialize_mode", skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

/// A symlink at `link` pointing to `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymlinkOperation {
    pub scope: Scope,
    pub source: PathBuf,
    pub link: PathBuf,
}

/// One step of a sandbox construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResolvedOperation {
    Mount(MountOperation),
    Symlink(SymlinkOperation),
}

impl ResolvedOperation {
    pub fn scope(&self) -> Scope {
        match self {
            ResolvedOperation::Mount(op) => op.scope,
            ResolvedOperation::Symlink(op) => op.scope,
        }
    }

    /// The path created inside the sandbox root.
    pub fn destination(&self) -> &Path {
        match self {
            ResolvedOperation::Mount(op) => &op.target,
            ResolvedOperation::Symlink(op) => &op.link,
        }
    }
}

impl fmt::Display for ResolvedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedOperation::Mount(op) => {
                write!(
                    f,
                    "[{}] mount {} -> {} ({})",
                    op.scope,
                    op.source.display(),
                    op.target.display(),
                    flags::flag_names(op.flags).join(",")
                )?;
                match op.mode {
                    Some(mode) => write!(f, " mode {mode:04o}"),
                    None => Ok(()),
                }
            }
            ResolvedOperation::Symlink(op) => write!(
                f,
                "[{}] symlink {} -> {}",
                op.scope,
                op.link.display(),
                op.source.display()
            ),
        }
    }
}

fn serialize_mode<S: Serializer>(mode: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
    match mode {
        Some(mode) => serializer.serialize_str(&format!("{mode:04o}")),
        None => serializer.serialize_none(),
    }
}

fn serialize_flags<S: Serializer>(flags: &MsFlags, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(flags::flag_names(*flags))
}

/// Resolution inputs shared by the mount and symlink planners.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub root: &'a Path,
    pub resolver: &'a VariableResolver,
}

impl PlanContext<'_> {
    /// Resolve a source template; relative results hang off the package data root.
    pub fn source_path(&self, template: &str) -> Result<PathBuf, SandboxError> {
        let resolved = PathBuf::from(self.resolver.resolve(template)?);
        if resolved.is_absolute() {
            Ok(normalize_path(&resolved))
        } else {
            Ok(normalize_path(
                &self.resolver.package_data_root().join(resolved),
            ))
        }
    }

    /// Resolve a destination template and confine it to the sandbox root.
    pub fn destination_path(&self, template: &str) -> Result<PathBuf, SandboxError> {
        let resolved = self.resolver.resolve(template)?;
        path_security::confine(self.root, &resolved)
    }
}

/// Plans one launch against one policy snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    policy: &'a SandboxPolicy,
    context: PlanContext<'a>,
}

impl<'a> Planner<'a> {
    pub fn new(policy: &'a SandboxPolicy, resolver: &'a VariableResolver, root: &'a Path) -> Self {
        Self {
            policy,
            context: PlanContext { root, resolver },
        }
    }

    fn sections(&self, scope: Scope) -> Vec<SectionEntries<'a>> {
        match scope {
            Scope::Common => vec![self.policy.common.entries("common")],
            Scope::Private => {
                let package = self.context.resolver.package_name();
                let mut sections = vec![self.policy.private.entries("private")];
                if let Some((name, individual)) = self.policy.individual.get_key_value(package) {
                    sections.push(individual.entries(name));
                }
                sections
            }
        }
    }

    /// Mount operations for `scope`.
    pub fn plan_mounts(&self, scope: Scope) -> Result<Vec<ResolvedOperation>, SandboxError> {
        let mut ops = Vec::new();
        for section in self.sections(scope) {
            ops.extend(mount::plan(&self.context, scope, section.mount_paths)?);
        }
        Ok(ops)
    }

    /// Symlink operations for `scope`: plain symlinks, then install links.
    pub fn plan_symlinks(&self, scope: Scope) -> Result<Vec<ResolvedOperation>, SandboxError> {
        let sections = self.sections(scope);
        let mut ops = Vec::new();
        for section in &sections {
            ops.extend(symlink::plan(&self.context, scope, section.symlinks)?);
        }
        for section in &sections {
            ops.extend(symlink::plan_installs(&self.context, scope, section.install)?);
        }
        Ok(ops)
    }

    /// Everything for `scope`, in application order.
    pub fn plan(&self, scope: Scope) -> Result<Vec<ResolvedOperation>, SandboxError> {
        let mut ops = self.plan_mounts(scope)?;
        ops.extend(self.plan_symlinks(scope)?);
        tracing::debug!(
            "Planned {} {} operations for '{}'",
            ops.len(),
            scope,
            self.context.resolver.package_name()
        );
        Ok(ops)
    }
}
