//! Generate Sandbox Policy JSON Schema
//!
//! Writes the JSON schema of the sandbox policy document to
//! docs/sandbox-policy-schema.json (or `<dir>/sandbox-policy-schema.json`).

use appspawn_sandbox::SandboxPolicy;
use appspawn_sandbox::utils::logging::{LogTarget, init_logging};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const SCHEMA_FILE_NAME: &str = "sandbox-policy-schema.json";

/// The policy document schema, pretty-printed.
pub fn generate_schema_json() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(SandboxPolicy);
    serde_json::to_string_pretty(&schema)
}

/// First argument after the program name, or `docs`.
pub fn parse_output_dir<I, S>(mut args: I) -> PathBuf
where
    I: Iterator<Item = S>,
    S: Into<String>,
{
    args.nth(1)
        .map(|s| PathBuf::from(s.into()))
        .unwrap_or_else(|| PathBuf::from("docs"))
}

/// Write the schema into `output_dir`, creating it if needed.
pub fn write_schema_to_file(output_dir: &Path, schema_json: &str) -> Result<PathBuf, std::io::Error> {
    fs::create_dir_all(output_dir)?;
    let docs_path = output_dir.join(SCHEMA_FILE_NAME);
    fs::write(&docs_path, schema_json)?;
    Ok(docs_path)
}

/// First `max_lines` lines, indented, with a count of the rest.
pub fn generate_preview(schema_json: &str, max_lines: usize) -> String {
    let mut preview: String = schema_json
        .lines()
        .take(max_lines)
        .map(|line| format!("    {line}\n"))
        .collect();

    let hidden = schema_json.lines().count().saturating_sub(max_lines);
    if hidden > 0 {
        preview.push_str(&format!("    ... and {hidden} more lines\n"));
    }
    preview
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info", LogTarget::Stderr)?;

    let schema_json = generate_schema_json()?;
    let output_dir = parse_output_dir(env::args());
    let docs_path = write_schema_to_file(&output_dir, &schema_json)?;

    println!("✓ Generated sandbox policy schema at: {}", docs_path.display());
    println!("  Schema size: {} bytes", schema_json.len());
    println!("  Preview:");
    print!("{}", generate_preview(&schema_json, 10));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_schema_describes_policy_document() {
        let schema: serde_json::Value = serde_json::from_str(&generate_schema_json().unwrap()).unwrap();

        assert_eq!(schema["title"], "SandboxPolicy");
        let required = schema["required"].as_array().unwrap();
        for key in ["sandbox-switch", "common", "private"] {
            assert!(required.iter().any(|r| r == key), "{key} should be required");
        }
        assert!(schema["properties"].get("individual").is_some());
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn test_schema_has_entry_definitions() {
        let schema: serde_json::Value = serde_json::from_str(&generate_schema_json().unwrap()).unwrap();
        let defs = schema["$defs"].as_object().unwrap();
        for name in ["PolicySection", "PackageSection", "MountPoint", "SymlinkPoint", "InstallPoint"] {
            assert!(defs.contains_key(name), "missing definition {name}");
        }
    }

    #[test]
    fn test_parse_output_dir() {
        assert_eq!(parse_output_dir(["prog", "/custom"].into_iter()), PathBuf::from("/custom"));
        assert_eq!(parse_output_dir(["prog"].into_iter()), PathBuf::from("docs"));
        assert_eq!(parse_output_dir(std::iter::empty::<String>()), PathBuf::from("docs"));
    }

    #[test]
    fn test_write_schema_creates_nested_directory() {
        let temp_dir = tempdir().unwrap();
        let output_dir = temp_dir.path().join("nested/docs");

        let docs_path = write_schema_to_file(&output_dir, r#"{"v": 1}"#).unwrap();
        assert_eq!(docs_path, output_dir.join(SCHEMA_FILE_NAME));

        write_schema_to_file(&output_dir, r#"{"v": 2}"#).unwrap();
        assert_eq!(fs::read_to_string(&docs_path).unwrap(), r#"{"v": 2}"#);
    }

    #[test]
    fn test_generate_preview_truncates() {
        let json = (1..=12).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let preview = generate_preview(&json, 10);
        assert!(preview.contains("    line10"));
        assert!(!preview.contains("line11"));
        assert!(preview.contains("... and 2 more lines"));
        assert_eq!(generate_preview("", 10), "");
    }
}
