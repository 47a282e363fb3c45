use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::threat::metadata::read_csv_without_comments;

/// Ecosystem assigned to every row of a legacy-format feed.
const LEGACY_ECOSYSTEM: &str = "npm";

/// Column layout of a threat CSV, resolved once from the header row.
///
/// Two layouts exist: the multi-ecosystem format with `ecosystem`, `name`
/// and `version` columns in any order, and the legacy npm-only format with
/// the exact columns `Package Name` and `Version`. Anything else is a
/// format error for the whole file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum CsvFormat {
    MultiEcosystem {
        ecosystem: usize,
        name: usize,
        version: usize,
    },
    Legacy {
        name: usize,
        version: usize,
    },
}

impl CsvFormat {
    pub(crate) fn is_legacy(&self) -> bool {
        matches!(self, CsvFormat::Legacy { .. })
    }

    /// (ecosystem, name, version) of a data row, trimmed, with the
    /// ecosystem lowercased. Missing columns come back empty.
    pub(crate) fn extract(&self, record: &csv::StringRecord) -> (String, String, String) {
        let field = |index: usize| record.get(index).unwrap_or("").trim();
        match *self {
            CsvFormat::MultiEcosystem {
                ecosystem,
                name,
                version,
            } => (
                field(ecosystem).to_lowercase(),
                field(name).to_string(),
                field(version).to_string(),
            ),
            CsvFormat::Legacy { name, version } => (
                LEGACY_ECOSYSTEM.to_string(),
                field(name).to_string(),
                field(version).to_string(),
            ),
        }
    }
}

pub(crate) fn detect_format(headers: &csv::StringRecord) -> Result<CsvFormat> {
    let position = |wanted: &str| headers.iter().position(|header| header.trim() == wanted);

    if let (Some(ecosystem), Some(name), Some(version)) =
        (position("ecosystem"), position("name"), position("version"))
    {
        return Ok(CsvFormat::MultiEcosystem {
            ecosystem,
            name,
            version,
        });
    }
    if let (Some(name), Some(version)) = (position("Package Name"), position("Version")) {
        return Ok(CsvFormat::Legacy { name, version });
    }

    bail!(
        "unrecognized CSV header '{}': expected 'ecosystem,name,version' or 'Package Name,Version'",
        headers.iter().collect::<Vec<_>>().join(",")
    )
}

fn threat_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// In-memory index of compromised package versions, keyed by ecosystem.
///
/// Ecosystem keys are lowercased on insert and lookup; package names are
/// matched exactly since npm names are case-sensitive by registry rule.
/// Version strings are matched verbatim. A freshly constructed database
/// answers every query with empty results until a load succeeds.
pub struct ThreatDatabase {
    threats_dir: PathBuf,
    /// ecosystem -> package name -> version -> threat that first listed it.
    threats: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
    loaded_threats: Vec<String>,
    is_loaded: bool,
}

impl ThreatDatabase {
    pub fn new(threats_dir: impl Into<PathBuf>) -> Self {
        ThreatDatabase {
            threats_dir: threats_dir.into(),
            threats: BTreeMap::new(),
            loaded_threats: Vec::new(),
            is_loaded: false,
        }
    }

    /// Load threat feeds into the index.
    ///
    /// `csv_file` short-circuits discovery and loads exactly that file, with
    /// any failure fatal. Otherwise `*.csv` files under the threats
    /// directory are loaded in sorted name order, optionally filtered to
    /// `threat_names`; a file that fails to parse is skipped with a warning
    /// and the load only fails if nothing could be loaded at all.
    pub fn load_threats(
        &mut self,
        threat_names: Option<&[String]>,
        csv_file: Option<&Path>,
    ) -> Result<()> {
        if let Some(csv_file) = csv_file {
            let name = threat_name_for(csv_file);
            self.load_file(csv_file, &name)
                .with_context(|| format!("failed to load threat CSV {}", csv_file.display()))?;
            self.loaded_threats.push(name);
            self.is_loaded = true;
            return Ok(());
        }

        let files = self.discover_threat_files(threat_names)?;
        if files.is_empty() {
            bail!(
                "no threat CSV files found in {}",
                self.threats_dir.display()
            );
        }

        for (path, name) in files {
            match self.load_file(&path, &name) {
                Ok(()) => self.loaded_threats.push(name),
                Err(err) => eprintln!(
                    "{}",
                    format!("⚠ Warning: skipping {}: {:#}", path.display(), err).yellow()
                ),
            }
        }

        if self.loaded_threats.is_empty() {
            bail!(
                "no threat data could be loaded from {}",
                self.threats_dir.display()
            );
        }
        self.is_loaded = true;
        Ok(())
    }

    /// All `*.csv` files in the threats directory, as (path, threat name)
    /// pairs sorted by name. With a filter, files are returned in the
    /// requested order and unknown names are warned about and dropped.
    fn discover_threat_files(
        &self,
        threat_names: Option<&[String]>,
    ) -> Result<Vec<(PathBuf, String)>> {
        if !self.threats_dir.is_dir() {
            bail!("threats directory not found: {}", self.threats_dir.display());
        }

        let mut files = Vec::new();
        let entries = fs::read_dir(&self.threats_dir)
            .with_context(|| format!("failed to read {}", self.threats_dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("csv") {
                let name = threat_name_for(&path);
                files.push((path, name));
            }
        }
        files.sort_by(|a, b| a.1.cmp(&b.1));

        let Some(requested) = threat_names else {
            return Ok(files);
        };

        let mut selected = Vec::new();
        for name in requested {
            match files.iter().find(|(_, candidate)| candidate == name) {
                Some(found) => selected.push(found.clone()),
                None => eprintln!(
                    "{}",
                    format!(
                        "⚠ Warning: threat '{}' not found in {}",
                        name,
                        self.threats_dir.display()
                    )
                    .yellow()
                ),
            }
        }
        Ok(selected)
    }

    /// Parse one CSV feed and merge its rows into the index.
    ///
    /// Rows with an empty ecosystem, name or version are skipped with a
    /// warning; only an unreadable file or an unrecognized header fails the
    /// whole file. Duplicate (ecosystem, name, version) rows collapse, the
    /// first loader keeping the attribution.
    fn load_file(&mut self, path: &Path, threat: &str) -> Result<()> {
        let content = read_csv_without_comments(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers = reader
            .headers()
            .with_context(|| format!("failed to parse CSV header of {}", path.display()))?
            .clone();
        let format = detect_format(&headers)?;

        if format.is_legacy() {
            eprintln!(
                "{}",
                format!(
                    "⚠ Warning: {} uses the legacy 'Package Name,Version' format; rows are treated as npm",
                    path.display()
                )
                .yellow()
            );
        }

        // Rows are numbered from 1 counting the header, so data starts at 2.
        for (index, record) in reader.records().enumerate() {
            let row = index + 2;
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    eprintln!(
                        "{}",
                        format!("⚠ Warning: skipping malformed row {}: {}", row, err).yellow()
                    );
                    continue;
                }
            };

            let (ecosystem, name, version) = format.extract(&record);
            if ecosystem.is_empty() || name.is_empty() || version.is_empty() {
                eprintln!(
                    "{}",
                    format!("⚠ Warning: skipping row {} with empty fields", row).yellow()
                );
                continue;
            }

            self.threats
                .entry(ecosystem)
                .or_default()
                .entry(name)
                .or_default()
                .entry(version)
                .or_insert_with(|| threat.to_string());
        }
        Ok(())
    }

    /// Compromised versions recorded for a package, empty when unknown.
    pub fn get_compromised_versions(&self, ecosystem: &str, package_name: &str) -> BTreeSet<String> {
        self.threats
            .get(&ecosystem.to_lowercase())
            .and_then(|packages| packages.get(package_name))
            .map(|versions| versions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Exact-string membership test. The ecosystem compares
    /// case-insensitively, the package name and version do not.
    pub fn is_compromised(&self, ecosystem: &str, package_name: &str, version: &str) -> bool {
        self.threats
            .get(&ecosystem.to_lowercase())
            .and_then(|packages| packages.get(package_name))
            .is_some_and(|versions| versions.contains_key(version))
    }

    /// Name of the threat feed that listed this exact version, if any.
    pub fn threat_source(&self, ecosystem: &str, package_name: &str, version: &str) -> Option<&str> {
        self.threats
            .get(&ecosystem.to_lowercase())?
            .get(package_name)?
            .get(version)
            .map(String::as_str)
    }

    /// Affected packages and their versions.
    ///
    /// Without an ecosystem this merges every ecosystem by package name,
    /// which is lossy when the same name exists in two ecosystems; callers
    /// needing unambiguous results must pass the ecosystem.
    pub fn get_all_packages(&self, ecosystem: Option<&str>) -> BTreeMap<String, BTreeSet<String>> {
        match ecosystem {
            Some(ecosystem) => self
                .threats
                .get(&ecosystem.to_lowercase())
                .map(|packages| {
                    packages
                        .iter()
                        .map(|(name, versions)| {
                            (name.clone(), versions.keys().cloned().collect())
                        })
                        .collect()
                })
                .unwrap_or_default(),
            None => {
                let mut merged: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
                for packages in self.threats.values() {
                    for (name, versions) in packages {
                        merged
                            .entry(name.clone())
                            .or_default()
                            .extend(versions.keys().cloned());
                    }
                }
                merged
            }
        }
    }

    /// Ecosystems present in the loaded data, sorted.
    pub fn get_ecosystems(&self) -> BTreeSet<String> {
        self.threats.keys().cloned().collect()
    }

    pub fn get_package_count(&self, ecosystem: Option<&str>) -> usize {
        match ecosystem {
            Some(ecosystem) => self
                .threats
                .get(&ecosystem.to_lowercase())
                .map_or(0, |packages| packages.len()),
            None => self.threats.values().map(|packages| packages.len()).sum(),
        }
    }

    /// Distinct compromised versions, summed per package entry.
    pub fn get_version_count(&self, ecosystem: Option<&str>) -> usize {
        match ecosystem {
            Some(ecosystem) => self
                .threats
                .get(&ecosystem.to_lowercase())
                .map_or(0, |packages| {
                    packages.values().map(|versions| versions.len()).sum()
                }),
            None => self
                .threats
                .values()
                .flat_map(|packages| packages.values())
                .map(|versions| versions.len())
                .sum(),
        }
    }

    /// Names of the feeds that loaded successfully, in load order.
    pub fn get_loaded_threats(&self) -> &[String] {
        &self.loaded_threats
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    /// One-paragraph load summary on stdout, with a per-ecosystem breakdown
    /// when more than one ecosystem is present.
    pub fn print_summary(&self) {
        if !self.is_loaded {
            eprintln!("{}", "✗ Threat database not loaded".red());
            return;
        }

        let ecosystems = self.get_ecosystems();
        if ecosystems.is_empty() {
            println!("{}", "⚠ Threat database is empty".yellow());
            return;
        }

        println!(
            "{}",
            format!(
                "✓ Loaded threat database: {} package(s), {} version(s)",
                self.get_package_count(None),
                self.get_version_count(None)
            )
            .green()
            .bold()
        );
        if ecosystems.len() > 1 {
            println!("{}", format!("  Ecosystems: {}", ecosystems.len()).cyan());
            for ecosystem in &ecosystems {
                println!(
                    "{}",
                    format!(
                        "    • {}: {} package(s), {} version(s)",
                        ecosystem,
                        self.get_package_count(Some(ecosystem)),
                        self.get_version_count(Some(ecosystem))
                    )
                    .cyan()
                );
            }
        } else if let Some(ecosystem) = ecosystems.iter().next() {
            println!("{}", format!("  Ecosystem: {}", ecosystem).cyan());
        }
    }
}
