use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;

use crate::adapter::EcosystemAdapter;
use crate::models::Ecosystem;

/// Adapter for npm projects.
///
/// Reads declared ranges from `package.json` and pinned versions from
/// `package-lock.json` (v2/v3 `packages` map) and `yarn.lock`.
pub struct NpmAdapter;

impl EcosystemAdapter for NpmAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn get_manifest_files(&self) -> &'static [&'static str] {
        &["package.json"]
    }

    fn get_lockfile_names(&self) -> &'static [&'static str] {
        &["package-lock.json", "yarn.lock"]
    }

    fn extract_dependencies(&self, file: &Path) -> Result<Vec<(String, String)>> {
        match file.file_name().and_then(|name| name.to_str()) {
            Some("package.json") => parse_package_json(file),
            Some("package-lock.json") => parse_package_lock_json(file),
            Some("yarn.lock") => parse_yarn_lock(file),
            _ => Ok(Vec::new()),
        }
    }
}

/// `dependencies` and `devDependencies` of a `package.json`, ranges kept
/// verbatim.
fn parse_package_json(path: &Path) -> Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;
    let json: Value =
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))?;

    let mut deps = Vec::new();
    for section in ["dependencies", "devDependencies"] {
        if let Some(packages) = json.get(section).and_then(|value| value.as_object()) {
            for (name, version) in packages {
                let version = version.as_str().unwrap_or("*").to_string();
                deps.push((name.clone(), version));
            }
        }
    }
    Ok(deps)
}

/// The `packages` map of a v2/v3 `package-lock.json`.
///
/// Keys are install paths, so nested entries like
/// `node_modules/a/node_modules/b` resolve to the innermost package name.
/// Lockfiles pin the full installed tree, which is exactly what a
/// compromised-version check wants to see.
fn parse_package_lock_json(path: &Path) -> Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;
    let json: Value =
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))?;

    let mut deps = Vec::new();
    if let Some(packages) = json.get("packages").and_then(|value| value.as_object()) {
        for (install_path, info) in packages {
            // The "" key is the root project itself.
            if install_path.is_empty() {
                continue;
            }
            let name = install_path
                .rsplit("node_modules/")
                .next()
                .unwrap_or(install_path)
                .to_string();
            let version = info
                .get("version")
                .and_then(|value| value.as_str())
                .unwrap_or("*")
                .to_string();
            deps.push((name, version));
        }
    }
    Ok(deps)
}

/// Line-oriented `yarn.lock` parse.
///
/// An unindented line opens an entry; comma-separated specs all name the
/// same package, so the first one is enough. The indented `version` line
/// that follows closes the entry. Handles both classic quoting
/// (`version "1.3.0"`) and berry's `version: 1.3.0`.
fn parse_yarn_lock(path: &Path) -> Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;

    let name_re = Regex::new(r#"^"?(@?[^@"\s]+)@"#)?;
    let version_re = Regex::new(r#"^\s+version:?\s+"?([^"\s]+)"?"#)?;

    let mut deps = Vec::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        if !line.starts_with(' ') && !line.starts_with('\t') {
            let first_spec = line.trim_end_matches(':').split(", ").next().unwrap_or("");
            current = name_re
                .captures(first_spec)
                .map(|caps| caps[1].to_string());
        } else if let Some(name) = current.as_ref() {
            if let Some(caps) = version_re.captures(line) {
                deps.push((name.clone(), caps[1].to_string()));
                current = None;
            }
        }
    }
    Ok(deps)
}
