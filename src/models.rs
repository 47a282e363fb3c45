use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A packaging ecosystem with its own manifest/lockfile conventions and
/// package-naming rules.
///
/// The threat database itself is string-keyed so feeds may carry ecosystems
/// this binary has no adapter for; this enum covers the ecosystems the
/// scanner knows how to detect and (for some) scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Maven,
    Pip,
    Gem,
}

impl Ecosystem {
    /// Every ecosystem the scanner can detect, in scan order.
    pub const ALL: [Ecosystem; 4] = [
        Ecosystem::Npm,
        Ecosystem::Maven,
        Ecosystem::Pip,
        Ecosystem::Gem,
    ];

    /// Lowercase identifier used in threat CSVs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Maven => "maven",
            Ecosystem::Pip => "pip",
            Ecosystem::Gem => "gem",
        }
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Ecosystem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "npm" => Ok(Ecosystem::Npm),
            // Maven and Gradle projects share Maven Central coordinates.
            "maven" | "gradle" => Ok(Ecosystem::Maven),
            "pip" => Ok(Ecosystem::Pip),
            "gem" => Ok(Ecosystem::Gem),
            other => anyhow::bail!("unknown ecosystem: {}", other),
        }
    }
}

/// One match between a scanned project's dependency and a known-compromised
/// package version.
///
/// Findings are append-only: adapters emit them, the report engine collects
/// them, nothing mutates them afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub ecosystem: Ecosystem,
    pub package: String,
    pub version: String,
    /// Manifest or lockfile the dependency was declared in.
    pub file: PathBuf,
    /// Name of the threat feed that flagged the version.
    pub threat: String,
}
