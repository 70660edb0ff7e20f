//! # Path Template Variables
//!
//! Policy paths are templates such as `<PackageDataRoot>/cache` or
//! `/system/<lib>/ndk`. Substitution works over a closed set of named variables
//! (see [`Variable`]); there is no general interpolation.
//!
//! - Known placeholders are replaced with per-launch values.
//! - Unknown placeholders (`<PackagName>`) are kept verbatim so a typo shows up
//!   in the resolved path instead of silently vanishing.
//! - Malformed templates (unclosed `<`, empty `<>`, nested `<`, stray `>`) are
//!   errors, distinct from unknown names.
//! - Substitution is a single pass: a substituted value is never scanned again,
//!   so no variable can expand into another.

use crate::app::AppProperty;
use crate::config::EngineConfig;
use crate::error::SandboxError;
use crate::path_security;
use std::path::Path;

/// The closed set of placeholders a policy may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    PackageName,
    CurrentUserId,
    Lib,
    SystemAbiLib,
    PackageDataRoot,
    SystemRoot,
    BundlePath,
}

impl Variable {
    pub const ALL: [Variable; 7] = [
        Variable::PackageName,
        Variable::CurrentUserId,
        Variable::Lib,
        Variable::SystemAbiLib,
        Variable::PackageDataRoot,
        Variable::SystemRoot,
        Variable::BundlePath,
    ];

    /// Name as written between the angle brackets.
    pub fn name(&self) -> &'static str {
        match self {
            Variable::PackageName => "PackageName",
            Variable::CurrentUserId => "currentUserId",
            Variable::Lib => "lib",
            Variable::SystemAbiLib => "SystemAbiLib",
            Variable::PackageDataRoot => "PackageDataRoot",
            Variable::SystemRoot => "SystemRoot",
            Variable::BundlePath => "BundlePath",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn malformed(template: &str, reason: &str) -> SandboxError {
    SandboxError::InvalidTemplate {
        template: template.to_string(),
        reason: reason.to_string(),
    }
}

fn push_text<'a>(
    segments: &mut Vec<Segment<'a>>,
    template: &str,
    text: &'a str,
) -> Result<(), SandboxError> {
    if text.contains('>') {
        return Err(malformed(template, "'>' without a matching '<'"));
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(())
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, SandboxError> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('<') {
        push_text(&mut segments, template, &rest[..open])?;

        let after = &rest[open + 1..];
        let close = after
            .find('>')
            .ok_or_else(|| malformed(template, "unclosed '<'"))?;
        let name = &after[..close];
        if name.is_empty() {
            return Err(malformed(template, "empty placeholder '<>'"));
        }
        if name.contains('<') {
            return Err(malformed(template, "nested '<' inside a placeholder"));
        }
        segments.push(Segment::Placeholder(name));
        rest = &after[close + 1..];
    }
    push_text(&mut segments, template, rest)?;

    Ok(segments)
}

/// Check template syntax without resolving anything.
pub fn check_template(template: &str) -> Result<(), SandboxError> {
    parse(template).map(|_| ())
}

/// Placeholder names in `template` that are not part of the variable set.
pub fn unknown_placeholders(template: &str) -> Result<Vec<String>, SandboxError> {
    Ok(parse(template)?
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Placeholder(name) if Variable::from_name(name).is_none() => {
                Some(name.to_string())
            }
            _ => None,
        })
        .collect())
}

/// Per-launch variable values.
#[derive(Debug, Clone)]
pub struct VariableResolver {
    package_name: String,
    user_id: String,
    lib: &'static str,
    system_abi_lib: String,
    package_data_root: String,
    system_root: String,
    bundle_path: Option<String>,
}

impl VariableResolver {
    /// Compute every variable value for `app`.
    ///
    /// The app is validated first, and a supplied bundle path is canonicalized
    /// with [`path_security::resolve_real_path`] before it is trusted.
    pub fn new(app: &AppProperty, config: &EngineConfig) -> Result<Self, SandboxError> {
        app.validate()?;

        let bundle_path = match &app.bundle_path {
            Some(bundle) => {
                let real = path_security::resolve_real_path(bundle).map_err(|e| {
                    SandboxError::InvalidAppProperty {
                        field: "bundle_path",
                        reason: format!("cannot resolve '{}': {}", bundle.display(), e),
                    }
                })?;
                Some(path_string(&real))
            }
            None => None,
        };

        let lib = app.lib_dir();
        Ok(Self {
            package_name: app.package_name.clone(),
            user_id: app.uid.to_string(),
            lib,
            system_abi_lib: path_string(&config.system_root.join("system").join(lib)),
            package_data_root: path_string(
                &config.package_data_root(app.uid, &app.package_name),
            ),
            system_root: path_string(&config.system_root),
            bundle_path,
        })
    }

    /// Value of `variable` for this launch, if it has one.
    pub fn value(&self, variable: Variable) -> Option<&str> {
        match variable {
            Variable::PackageName => Some(&self.package_name),
            Variable::CurrentUserId => Some(&self.user_id),
            Variable::Lib => Some(self.lib),
            Variable::SystemAbiLib => Some(&self.system_abi_lib),
            Variable::PackageDataRoot => Some(&self.package_data_root),
            Variable::SystemRoot => Some(&self.system_root),
            Variable::BundlePath => self.bundle_path.as_deref(),
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Package data root for this launch, used as the base of relative sources.
    pub fn package_data_root(&self) -> &Path {
        Path::new(&self.package_data_root)
    }

    /// Substitute every known placeholder in `template`.
    pub fn resolve(&self, template: &str) -> Result<String, SandboxError> {
        let mut resolved = String::with_capacity(template.len());

        for segment in parse(template)? {
            match segment {
                Segment::Text(text) => resolved.push_str(text),
                Segment::Placeholder(name) => match Variable::from_name(name) {
                    Some(variable) => {
                        let value = self.value(variable).ok_or_else(|| {
                            SandboxError::UnresolvedVariable {
                                name: name.to_string(),
                                package: self.package_name.clone(),
                            }
                        })?;
                        resolved.push_str(value);
                    }
                    None => {
                        tracing::warn!(
                            "Unknown placeholder <{}> left unresolved in '{}'",
                            name,
                            template
                        );
                        resolved.push('<');
                        resolved.push_str(name);
                        resolved.push('>');
                    }
                },
            }
        }

        Ok(resolved)
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
