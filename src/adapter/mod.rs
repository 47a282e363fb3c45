//! Ecosystem scanning adapters.
//!
//! Each adapter knows one ecosystem's manifest and lockfile names and how to
//! pull `(name, version)` pairs out of them. The walk over the scan root,
//! the lockfile-over-manifest precedence and the threat matching are shared
//! here, so an adapter only implements the file formats.
//!
//! - [`npm`] — `package.json`, `package-lock.json`, `yarn.lock`
//! - [`maven`] — `pom.xml`, `build.gradle(.kts)`, `gradle.lockfile`

pub mod maven;
pub mod npm;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use walkdir::{DirEntry, WalkDir};

use crate::models::{Ecosystem, Finding};
use crate::threat::database::ThreatDatabase;

pub use maven::MavenAdapter;
pub use npm::NpmAdapter;

/// Directory names never descended into while scanning or detecting.
pub const EXCLUDED_DIRS: [&str; 10] = [
    "node_modules",
    ".git",
    "venv",
    "env",
    ".venv",
    "build",
    "dist",
    "target",
    "vendor",
    "__pycache__",
];

/// True for directories the walk must prune. The walk root itself is never
/// pruned, so a scan pointed directly at e.g. `build/` still works.
pub fn is_excluded_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

/// Spinner shown while an adapter walks a project tree. Disabled in quiet
/// mode, where every call is a no-op.
pub struct ProgressSpinner {
    bar: Option<ProgressBar>,
}

impl ProgressSpinner {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(100));
        ProgressSpinner { bar: Some(bar) }
    }

    pub fn disabled() -> Self {
        ProgressSpinner { bar: None }
    }

    pub fn update(&self, message: String) {
        if let Some(bar) = &self.bar {
            bar.set_message(message);
        }
    }

    pub fn clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

/// One ecosystem's project scanner.
///
/// Implementations supply file names and parsing; `scan_all_projects` is the
/// shared scan loop.
pub trait EcosystemAdapter {
    fn ecosystem(&self) -> Ecosystem;

    /// Manifest file names recognized in a project directory.
    fn get_manifest_files(&self) -> &'static [&'static str];

    /// Lockfile names recognized in a project directory.
    fn get_lockfile_names(&self) -> &'static [&'static str];

    /// Declared `(name, version)` pairs of one manifest or lockfile.
    ///
    /// Manifest version ranges come back verbatim (`^1.3.0` stays
    /// `^1.3.0`), so range declarations only match a threat listing the
    /// identical string. Pinned lockfile versions are the reliable signal.
    fn extract_dependencies(&self, file: &Path) -> Result<Vec<(String, String)>>;

    /// Walk `scan_root`, parse every recognized file and return the
    /// dependencies that match the threat database.
    ///
    /// Within one project directory, lockfile versions take precedence: a
    /// package named in any lockfile is not also reported from a manifest,
    /// since the lockfile pins what is actually installed. A file that
    /// fails to parse is skipped with a warning and the scan continues.
    fn scan_all_projects(
        &self,
        db: &ThreatDatabase,
        scan_root: &Path,
        spinner: &ProgressSpinner,
    ) -> Vec<Finding> {
        let ecosystem = self.ecosystem();
        let mut findings = Vec::new();

        for dir in project_dirs(scan_root, self.get_manifest_files(), self.get_lockfile_names()) {
            spinner.update(format!("Scanning {} project: {}", ecosystem, dir.display()));

            let mut seen: HashSet<(String, String)> = HashSet::new();
            let mut locked_names: HashSet<String> = HashSet::new();

            for lock_name in self.get_lockfile_names() {
                let lock_path = dir.join(lock_name);
                if !lock_path.is_file() {
                    continue;
                }
                match self.extract_dependencies(&lock_path) {
                    Ok(pairs) => {
                        for (name, version) in pairs {
                            locked_names.insert(name.clone());
                            if seen.insert((name.clone(), version.clone())) {
                                push_match(db, ecosystem, &lock_path, name, version, &mut findings);
                            }
                        }
                    }
                    Err(err) => warn_unparseable(&lock_path, &err),
                }
            }

            for manifest_name in self.get_manifest_files() {
                let manifest_path = dir.join(manifest_name);
                if !manifest_path.is_file() {
                    continue;
                }
                match self.extract_dependencies(&manifest_path) {
                    Ok(pairs) => {
                        for (name, version) in pairs {
                            if locked_names.contains(&name) {
                                continue;
                            }
                            if seen.insert((name.clone(), version.clone())) {
                                push_match(
                                    db,
                                    ecosystem,
                                    &manifest_path,
                                    name,
                                    version,
                                    &mut findings,
                                );
                            }
                        }
                    }
                    Err(err) => warn_unparseable(&manifest_path, &err),
                }
            }
        }
        findings
    }
}

fn push_match(
    db: &ThreatDatabase,
    ecosystem: Ecosystem,
    file: &Path,
    name: String,
    version: String,
    findings: &mut Vec<Finding>,
) {
    if !db.is_compromised(ecosystem.as_str(), &name, &version) {
        return;
    }
    let threat = db
        .threat_source(ecosystem.as_str(), &name, &version)
        .unwrap_or_default()
        .to_string();
    findings.push(Finding {
        ecosystem,
        package: name,
        version,
        file: file.to_path_buf(),
        threat,
    });
}

fn warn_unparseable(path: &Path, err: &anyhow::Error) {
    eprintln!(
        "{}",
        format!("⚠ Warning: failed to parse {}: {:#}", path.display(), err).yellow()
    );
}

/// Directories under `root` containing at least one recognized file, in
/// walk order (sorted by name at each level, parents before children).
fn project_dirs(root: &Path, manifests: &[&str], lockfiles: &[&str]) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded_dir(entry));

    for entry in walker.filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir = entry.path();
        let recognized = manifests
            .iter()
            .chain(lockfiles)
            .any(|name| dir.join(name).is_file());
        if recognized {
            dirs.push(dir.to_path_buf());
        }
    }
    dirs
}

/// Adapter for `ecosystem`, or `None` where only detection is supported.
pub fn adapter_for(ecosystem: Ecosystem) -> Option<Box<dyn EcosystemAdapter>> {
    match ecosystem {
        Ecosystem::Npm => Some(Box::new(NpmAdapter)),
        Ecosystem::Maven => Some(Box::new(MavenAdapter)),
        // Detected and announced, but not scannable yet.
        Ecosystem::Pip | Ecosystem::Gem => None,
    }
}

/// Ecosystems that have a scanning adapter, in scan order.
pub fn available_ecosystems() -> Vec<Ecosystem> {
    Ecosystem::ALL
        .iter()
        .copied()
        .filter(|ecosystem| adapter_for(*ecosystem).is_some())
        .collect()
}
