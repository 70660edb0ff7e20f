//! Sandbox root directory creation.

use crate::app::AppProperty;
use crate::config::EngineConfig;
use crate::error::SandboxError;
use crate::path_security::normalize_path;
use crate::policy::SandboxPolicy;
use crate::variables::VariableResolver;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Absolute path of a constructed sandbox root, handed back to the spawner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SandboxRootPath(PathBuf);

impl SandboxRootPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for SandboxRootPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for SandboxRootPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Creates `<install_root>/<uid>/sandbox/<package>`, or the package's
/// configured `sandbox-root`.
#[derive(Debug, Clone)]
pub struct RootBuilder {
    install_root: PathBuf,
    dir_mode: u32,
}

impl RootBuilder {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            install_root: config.install_root.clone(),
            dir_mode: config.effective_dir_mode(),
        }
    }

    /// Where the root for `app` lives. Pure; touches nothing.
    pub fn root_path(&self, app: &AppProperty) -> Result<SandboxRootPath, SandboxError> {
        app.validate()?;
        Ok(SandboxRootPath(
            self.install_root
                .join(app.uid.to_string())
                .join("sandbox")
                .join(&app.package_name),
        ))
    }

    /// Root named by a package's `sandbox-root` template.
    ///
    /// The resolved path must be absolute and strictly inside the install root,
    /// where cleanup can still find it.
    pub fn configured_root(
        &self,
        app: &AppProperty,
        template: &str,
        resolver: &VariableResolver,
    ) -> Result<SandboxRootPath, SandboxError> {
        app.validate()?;
        let resolved = resolver.resolve(template)?;
        if !Path::new(&resolved).is_absolute() {
            return Err(SandboxError::InvalidTemplate {
                template: template.to_string(),
                reason: format!("sandbox-root resolves to relative path '{resolved}'"),
            });
        }

        let path = normalize_path(Path::new(&resolved));
        let install_root = normalize_path(&self.install_root);
        if path == install_root || !path.starts_with(&install_root) {
            return Err(SandboxError::PathEscapesRoot {
                path,
                root: install_root,
            });
        }
        Ok(SandboxRootPath(path))
    }

    /// The root `policy` assigns to `app`: its package override if any,
    /// the default layout otherwise.
    pub fn root_for(
        &self,
        app: &AppProperty,
        policy: &SandboxPolicy,
        resolver: &VariableResolver,
    ) -> Result<SandboxRootPath, SandboxError> {
        match policy
            .individual
            .get(&app.package_name)
            .and_then(|section| section.sandbox_root.as_deref())
        {
            Some(template) => self.configured_root(app, template, resolver),
            None => self.root_path(app),
        }
    }

    /// Create `root` and any missing parents. An existing root is fine.
    pub fn create(&self, root: &SandboxRootPath) -> Result<(), SandboxError> {
        create_dir_tree(root.as_path(), self.dir_mode).map_err(|source| {
            SandboxError::RootCreate {
                path: root.as_path().to_path_buf(),
                source,
            }
        })?;
        tracing::debug!("Sandbox root ready at {} (mode {:o})", root, self.dir_mode);
        Ok(())
    }

    /// Create the default root for `app`.
    pub fn ensure_root(&self, app: &AppProperty) -> Result<SandboxRootPath, SandboxError> {
        let root = self.root_path(app)?;
        self.create(&root)?;
        Ok(root)
    }
}

/// Create `path` and every missing ancestor with exactly `mode`.
///
/// Directories that already exist keep their permissions. Losing a creation
/// race to another launch counts as success.
pub(crate) fn create_dir_tree(path: &Path, mode: u32) -> io::Result<()> {
    let mut missing = Vec::new();
    let mut current = path;

    loop {
        match fs::symlink_metadata(current) {
            Ok(_) if current.is_dir() => break,
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("'{}' exists and is not a directory", current.display()),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                missing.push(current);
                match current.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => current = parent,
                    _ => break,
                }
            }
            Err(e) => return Err(e),
        }
    }

    for dir in missing.into_iter().rev() {
        match fs::create_dir(dir) {
            Ok(()) => fs::set_permissions(dir, fs::Permissions::from_mode(mode))?,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
