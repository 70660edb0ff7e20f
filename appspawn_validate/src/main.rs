use anyhow::{Result, anyhow};
use appspawn_sandbox::planner::flags::{parse_flags, parse_mode};
use appspawn_sandbox::utils::logging::{LogTarget, init_logging};
use appspawn_sandbox::variables::unknown_placeholders;
use appspawn_sandbox::{SandboxError, SandboxPolicy};
use clap::Parser;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, instrument, warn};

/// AppSpawn Sandbox Policy Validator
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "Validates sandbox policy documents: JSON structure, path template syntax, mount flag tokens and dest-mode bits. Nothing is mounted or created."
)]
struct Cli {
    /// Policy file, directory of policy files, or a comma-separated list of either.
    #[arg(default_value = "/system/etc/sandbox")]
    validation_target: String,

    /// Treat unknown placeholders such as `<PackagName>` as errors.
    #[arg(long)]
    strict: bool,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    debug: bool,
}

/// Problems that do not make a policy unusable.
#[derive(Debug, Default, PartialEq, Eq)]
struct ValidationReport {
    warnings: Vec<String>,
}

#[instrument]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    init_logging(log_level, LogTarget::Stderr)?;

    if run_validation_mode(&cli)? {
        info!("All sandbox policies are valid.");
        Ok(())
    } else {
        Err(anyhow!(
            "Some sandbox policies are invalid. Please check the error messages above."
        ))
    }
}

fn run_validation_mode(cli: &Cli) -> Result<bool> {
    let mut all_valid = true;

    let mut files_to_validate = Vec::new();
    for target in cli.validation_target.split(',').map(str::trim) {
        let path = PathBuf::from(target);
        if path.is_dir() {
            files_to_validate.extend(get_json_files(&path)?);
        } else if path.is_file() {
            files_to_validate.push(path);
        } else {
            error!("Validation target not found: {}", path.display());
            all_valid = false;
        }
    }

    for file_path in files_to_validate {
        let content = match fs::read_to_string(&file_path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to read file {}: {}", file_path.display(), e);
                all_valid = false;
                continue;
            }
        };

        match validate_policy(&content) {
            Ok(report) => {
                for warning in &report.warnings {
                    warn!("{}: {}", file_path.display(), warning);
                }
                if cli.strict && !report.warnings.is_empty() {
                    error!(
                        "{} has {} warning(s) in strict mode",
                        file_path.display(),
                        report.warnings.len()
                    );
                    all_valid = false;
                } else {
                    info!("{} is valid.", file_path.display());
                }
            }
            Err(e) => {
                error!("Validation failed for {}: {}", file_path.display(), e);
                all_valid = false;
            }
        }
    }

    Ok(all_valid)
}

/// Check everything the engine would reject before a launch, without an app.
fn validate_policy(content: &str) -> Result<ValidationReport, SandboxError> {
    let policy = SandboxPolicy::from_json(content)?;
    let mut report = ValidationReport::default();

    for section in policy.sections() {
        for mount in section.mount_paths {
            let label = mount.to_string();
            parse_flags(&mount.flags, &label)?;
            if let Some(spec) = &mount.dest_mode {
                parse_mode(spec, &label)?;
            }
        }
        for template in section.templates() {
            for name in unknown_placeholders(template)? {
                report.warnings.push(format!(
                    "section '{}': unknown placeholder <{}> in '{}'",
                    section.label, name, template
                ));
            }
        }
    }

    Ok(report)
}

fn get_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const VALID: &str = r#"{
        "sandbox-switch": true,
        "common": {
            "mount-paths": [ { "source": "/system/<lib>", "target": "/system/<lib>", "flags": ["rec", "MS_RDONLY"] } ]
        },
        "private": { "mount-paths": [ { "source": "data", "target": "data" } ] }
    }"#;

    fn cli(target: &Path, strict: bool) -> Cli {
        Cli {
            validation_target: target.to_string_lossy().into_owned(),
            strict,
            debug: false,
        }
    }

    #[test]
    fn test_valid_policy_has_no_warnings() {
        assert_eq!(validate_policy(VALID).unwrap(), ValidationReport::default());
    }

    #[test]
    fn test_shipped_sample_policy_is_clean() {
        let sample = include_str!("../../docs/appdata-sandbox.json");
        assert_eq!(validate_policy(sample).unwrap(), ValidationReport::default());
    }

    #[test]
    fn test_unknown_flag_is_an_error() {
        let err = validate_policy(
            r#"{ "sandbox-switch": true, "private": {},
                 "individual": { "demo": { "mount-paths": [ { "source": "/a", "target": "/a", "flags": ["ro"] } ] } },
                 "common": {} }"#,
        )
        .unwrap_err();
        assert!(matches!(err, SandboxError::UnknownMountFlag { .. }));
    }

    #[test]
    fn test_unknown_dest_mode_is_an_error() {
        let policy = r#"{ "sandbox-switch": true, "common": {}, "private": {},
            "individual": { "demo": { "mount-paths": [
                { "source": "/dev/gpu", "target": "/dev/gpu", "dest-mode": "S_IRWXU|S_IRWXW" }
            ] } } }"#;
        let err = validate_policy(policy).unwrap_err();
        assert!(matches!(err, SandboxError::UnknownModeBit { ref token, .. } if token == "S_IRWXW"));
    }

    #[test]
    fn test_unknown_placeholder_is_a_warning() {
        let report = validate_policy(
            r#"{ "sandbox-switch": true, "private": {},
                 "common": { "symlinks": [ { "source": "/data/<PackagName>", "target": "/x" } ] } }"#,
        )
        .unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("PackagName"));
    }

    #[test]
    fn test_directory_validation() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("good.json"), VALID).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        assert!(run_validation_mode(&cli(dir.path(), false)).unwrap());

        fs::write(dir.path().join("bad.json"), r#"{ "sandbox-switch": true }"#).unwrap();
        assert!(!run_validation_mode(&cli(dir.path(), false)).unwrap());
    }

    #[test]
    fn test_strict_mode_fails_on_warnings() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("typo.json");
        fs::write(
            &file,
            r#"{ "sandbox-switch": true, "private": {},
                 "common": { "mount-paths": [ { "source": "/<Lib>", "target": "/lib" } ] } }"#,
        )
        .unwrap();

        assert!(run_validation_mode(&cli(&file, false)).unwrap());
        assert!(!run_validation_mode(&cli(&file, true)).unwrap());
    }

    #[test]
    fn test_missing_target_is_invalid() {
        let dir = tempdir().unwrap();
        assert!(!run_validation_mode(&cli(&dir.path().join("absent.json"), false)).unwrap());
    }

    #[test]
    fn test_get_json_files_sorted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.json"), "{}").unwrap();
        fs::write(dir.path().join("a.json"), "{}").unwrap();
        let files = get_json_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.json"), dir.path().join("b.json")]);
    }
}
