use std::collections::BTreeSet;
use std::path::Path;

use walkdir::WalkDir;

use crate::adapter::is_excluded_dir;
use crate::models::Ecosystem;

/// Manifest names whose presence anywhere in the tree marks an ecosystem.
const INDICATORS: [(Ecosystem, &[&str]); 4] = [
    (Ecosystem::Npm, &["package.json"]),
    (
        Ecosystem::Maven,
        &["pom.xml", "build.gradle", "build.gradle.kts"],
    ),
    (
        Ecosystem::Pip,
        &["requirements.txt", "pyproject.toml", "setup.py", "Pipfile"],
    ),
    (Ecosystem::Gem, &["Gemfile"]),
];

/// Auto-detect ecosystems present under `root`.
///
/// Walks the whole tree, pruning the usual build and cache directories, and
/// stops early once every known ecosystem has been seen. Detection is
/// independent of adapter support: an ecosystem can be detected that the
/// scanner cannot scan yet.
pub fn detect_ecosystems(root: &Path) -> Vec<Ecosystem> {
    let mut detected = BTreeSet::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded_dir(entry));
    for entry in walker.filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        for (ecosystem, names) in &INDICATORS {
            if names.contains(&file_name) {
                detected.insert(*ecosystem);
            }
        }
        if detected.len() == INDICATORS.len() {
            break;
        }
    }
    detected.into_iter().collect()
}
