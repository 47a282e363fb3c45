use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

/// Root configuration structure, deserialized from `.package-scan/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Scan behavior settings.
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScanConfig {
    /// Directory holding threat CSV files. Overrides the built-in
    /// candidate locations.
    pub threats_dir: Option<PathBuf>,
    /// Report path used when `--output` is not given.
    pub output: Option<PathBuf>,
}

/// Load the scan configuration, searching in order:
///
/// 1. `config_override` — path passed via `--config`
/// 2. `<scan_dir>/.package-scan/config.toml`
/// 3. `~/.config/package-scan/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(scan_dir: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        let content = std::fs::read_to_string(path)?;
        return Ok(toml::from_str(&content)?);
    }

    let project_config = scan_dir.join(".package-scan").join("config.toml");
    if project_config.exists() {
        let content = std::fs::read_to_string(&project_config)?;
        return Ok(toml::from_str(&content)?);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("package-scan").join("config.toml");
        if home_config.exists() {
            let content = std::fs::read_to_string(&home_config)?;
            return Ok(toml::from_str(&content)?);
        }
    }

    Ok(Config::default())
}

/// Resolve the threats directory: the config value when set, otherwise the
/// first existing candidate of `./threats` and `/app/threats`. Falls back
/// to `./threats` so error messages name a concrete path.
pub fn resolve_threats_dir(config: &Config) -> PathBuf {
    if let Some(dir) = &config.scan.threats_dir {
        return dir.clone();
    }

    let local = PathBuf::from("threats");
    if local.is_dir() {
        return local;
    }
    let container = PathBuf::from("/app/threats");
    if container.is_dir() {
        return container;
    }
    local
}
