use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use serde::{Deserialize, Serialize};

use crate::models::Finding;

/// JSON document written by [`ReportEngine::save_report`].
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_directory: String,
    pub threats_checked: Vec<String>,
    pub findings: Vec<Finding>,
    pub summary: ReportSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_findings: usize,
    pub by_ecosystem: BTreeMap<String, usize>,
}

/// Collects findings across ecosystem scans and renders them for the
/// terminal and as JSON.
///
/// Output is deterministic: findings are ordered by (ecosystem, package,
/// version, file) no matter the order adapters delivered them in.
pub struct ReportEngine {
    scan_dir: PathBuf,
    threats: Vec<String>,
    findings: Vec<Finding>,
}

impl ReportEngine {
    pub fn new(scan_dir: impl Into<PathBuf>) -> Self {
        ReportEngine {
            scan_dir: scan_dir.into(),
            threats: Vec::new(),
            findings: Vec::new(),
        }
    }

    /// Record which threat feeds the scan checked against.
    pub fn set_threats(&mut self, threats: Vec<String>) {
        self.threats = threats;
    }

    pub fn add_findings(&mut self, findings: Vec<Finding>) {
        self.findings.extend(findings);
    }

    pub fn get_findings_count(&self) -> usize {
        self.findings.len()
    }

    fn compare(a: &Finding, b: &Finding) -> Ordering {
        a.ecosystem
            .cmp(&b.ecosystem)
            .then_with(|| a.package.cmp(&b.package))
            .then_with(|| a.version.cmp(&b.version))
            .then_with(|| a.file.cmp(&b.file))
    }

    fn sorted_findings(&self) -> Vec<Finding> {
        let mut sorted = self.findings.clone();
        sorted.sort_by(Self::compare);
        sorted
    }

    fn summary(&self) -> ReportSummary {
        let mut by_ecosystem: BTreeMap<String, usize> = BTreeMap::new();
        for finding in &self.findings {
            *by_ecosystem.entry(finding.ecosystem.to_string()).or_insert(0) += 1;
        }
        ReportSummary {
            total_findings: self.findings.len(),
            by_ecosystem,
        }
    }

    pub fn build_report(&self) -> ScanReport {
        ScanReport {
            scan_directory: self.scan_dir.display().to_string(),
            threats_checked: self.threats.clone(),
            findings: self.sorted_findings(),
            summary: self.summary(),
        }
    }

    /// Render the findings to the terminal, grouped per ecosystem.
    pub fn print_report(&self) {
        let summary = self.summary();

        println!("\n {}", "SCAN RESULTS".bold());
        println!(" Scanned : {}", self.scan_dir.display());
        if !self.threats.is_empty() {
            println!(" Threats : {}", self.threats.join(", "));
        }
        println!();

        if self.findings.is_empty() {
            println!(" {} No compromised packages found\n", "✓".green().bold());
            return;
        }

        println!(
            " {} {} compromised package reference(s) found:\n",
            "[ALERT]".red().bold(),
            summary.total_findings
        );

        let sorted = self.sorted_findings();
        let mut index = 0;
        while index < sorted.len() {
            let ecosystem = sorted[index].ecosystem;
            let group_end = sorted[index..]
                .iter()
                .position(|finding| finding.ecosystem != ecosystem)
                .map_or(sorted.len(), |offset| index + offset);

            println!(
                " {} {} — {} finding(s):\n",
                "[!]".red().bold(),
                ecosystem.as_str().to_uppercase().bold(),
                group_end - index
            );
            render_table(&sorted[index..group_end]);
            println!();
            index = group_end;
        }

        let breakdown: Vec<String> = summary
            .by_ecosystem
            .iter()
            .map(|(ecosystem, count)| format!("{}: {}", ecosystem, count))
            .collect();
        println!(" Findings by ecosystem: {}\n", breakdown.join(", "));
    }

    /// Write the JSON report, all or nothing.
    ///
    /// The document is written to a sibling temp file first and renamed
    /// over the target, so a crash mid-write cannot leave a truncated
    /// report and a previous report survives until the new one is ready.
    pub fn save_report(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.build_report())?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("report.json");
        let tmp = path.with_file_name(format!(".{}.tmp", file_name));
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        if let Err(err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(err)
                .with_context(|| format!("failed to move report into place at {}", path.display()));
        }
        Ok(())
    }
}

fn render_table(findings: &[Finding]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("File").add_attribute(Attribute::Bold),
            Cell::new("Threat").add_attribute(Attribute::Bold),
        ]);

    for finding in findings {
        table.add_row(vec![
            Cell::new(&finding.package).fg(Color::Red),
            Cell::new(&finding.version),
            Cell::new(finding.file.display().to_string()),
            Cell::new(&finding.threat).fg(Color::Yellow),
        ]);
    }

    println!("{}", table);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ecosystem;
    use tempfile::TempDir;

    fn finding(ecosystem: Ecosystem, package: &str, version: &str, file: &str) -> Finding {
        Finding {
            ecosystem,
            package: package.to_string(),
            version: version.to_string(),
            file: PathBuf::from(file),
            threat: "feed".to_string(),
        }
    }

    #[test]
    fn test_findings_are_sorted_deterministically() {
        let mut engine = ReportEngine::new("/proj");
        engine.add_findings(vec![
            finding(Ecosystem::Maven, "g:a", "1.0.0", "/proj/pom.xml"),
            finding(Ecosystem::Npm, "left-pad", "1.3.0", "/proj/b/package-lock.json"),
            finding(Ecosystem::Npm, "event-stream", "3.3.6", "/proj/package-lock.json"),
            finding(Ecosystem::Npm, "left-pad", "1.3.0", "/proj/a/package-lock.json"),
        ]);

        let report = engine.build_report();
        let keys: Vec<(String, String)> = report
            .findings
            .iter()
            .map(|f| (f.package.clone(), f.file.display().to_string()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("event-stream".to_string(), "/proj/package-lock.json".to_string()),
                ("left-pad".to_string(), "/proj/a/package-lock.json".to_string()),
                ("left-pad".to_string(), "/proj/b/package-lock.json".to_string()),
                ("g:a".to_string(), "/proj/pom.xml".to_string()),
            ]
        );
    }

    #[test]
    fn test_summary_counts_by_ecosystem() {
        let mut engine = ReportEngine::new("/proj");
        engine.add_findings(vec![
            finding(Ecosystem::Npm, "a", "1.0.0", "/proj/package.json"),
            finding(Ecosystem::Npm, "b", "2.0.0", "/proj/package.json"),
            finding(Ecosystem::Maven, "g:c", "3.0.0", "/proj/pom.xml"),
        ]);

        let summary = engine.build_report().summary;
        assert_eq!(summary.total_findings, 3);
        assert_eq!(summary.by_ecosystem["npm"], 2);
        assert_eq!(summary.by_ecosystem["maven"], 1);
    }

    #[test]
    fn test_report_json_schema() {
        let mut engine = ReportEngine::new("/proj");
        engine.set_threats(vec!["alpha".to_string(), "beta".to_string()]);
        engine.add_findings(vec![finding(
            Ecosystem::Npm,
            "left-pad",
            "1.3.0",
            "/proj/package-lock.json",
        )]);

        let json = serde_json::to_value(engine.build_report()).unwrap();
        assert_eq!(json["scan_directory"], "/proj");
        assert_eq!(json["threats_checked"][0], "alpha");
        assert_eq!(json["findings"][0]["package"], "left-pad");
        assert_eq!(json["findings"][0]["ecosystem"], "npm");
        assert_eq!(json["summary"]["total_findings"], 1);
        assert_eq!(json["summary"]["by_ecosystem"]["npm"], 1);
    }

    #[test]
    fn test_save_report_writes_json_and_removes_temp() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("report.json");

        let mut engine = ReportEngine::new("/proj");
        engine.add_findings(vec![finding(
            Ecosystem::Npm,
            "left-pad",
            "1.3.0",
            "/proj/package-lock.json",
        )]);
        engine.save_report(&target).unwrap();

        let parsed: ScanReport =
            serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(parsed.summary.total_findings, 1);
        assert!(!dir.path().join(".report.json.tmp").exists());
    }

    #[test]
    fn test_save_report_overwrites_previous_report() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("report.json");
        fs::write(&target, "stale").unwrap();

        let engine = ReportEngine::new("/proj");
        engine.save_report(&target).unwrap();

        let parsed: ScanReport =
            serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(parsed.summary.total_findings, 0);
        assert!(parsed.findings.is_empty());
    }

    #[test]
    fn test_save_report_to_missing_directory_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nope").join("report.json");

        let engine = ReportEngine::new("/proj");
        assert!(engine.save_report(&target).is_err());
    }

    #[test]
    fn test_empty_report() {
        let engine = ReportEngine::new("/proj");
        let report = engine.build_report();
        assert_eq!(report.summary.total_findings, 0);
        assert!(report.summary.by_ecosystem.is_empty());
        assert_eq!(engine.get_findings_count(), 0);
    }
}
