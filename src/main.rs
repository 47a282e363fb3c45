//! `package-scan` — scan dependency manifests and lockfiles for packages
//! with known-compromised versions.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]).
//! 2. Load scan config ([`config::load_config`]).
//! 3. Load threat feeds into the database ([`threat::database`]).
//! 4. Resolve ecosystems: explicit `--ecosystem` list or auto-detection
//!    ([`detector::detect_ecosystems`]).
//! 5. Scan each ecosystem's projects ([`adapter`]).
//! 6. Render the report and save it as JSON ([`report`]).
//! 7. Exit `0` (clean) or `1` (findings, or a fatal error).

mod adapter;
mod cli;
mod config;
mod detector;
mod models;
mod report;
mod threat;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use adapter::{adapter_for, available_ecosystems, ProgressSpinner};
use cli::{Cli, Command, ScanArgs};
use config::{load_config, resolve_threats_dir};
use detector::detect_ecosystems;
use models::Ecosystem;
use report::ReportEngine;
use threat::database::ThreatDatabase;
use threat::metadata::parse_threat_metadata;
use threat::validator::{validate_threat_file, ValidationOptions};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::ListEcosystems) => {
            list_ecosystems();
            Ok(())
        }
        Some(Command::Validate {
            file,
            strict,
            verbose,
            error_limit,
        }) => {
            let options = ValidationOptions {
                strict,
                verbose,
                error_limit,
            };
            if !validate_threat_file(&file, &options) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Info {
            file,
            threats,
            summary,
            packages,
            csv,
        }) => run_info(file.as_deref(), &threats, summary, packages, csv),
        None => run_scan(cli.scan),
    }
}

fn run_scan(args: ScanArgs) -> Result<()> {
    let scan_dir = args
        .scan_dir
        .canonicalize()
        .unwrap_or_else(|_| args.scan_dir.clone());
    if !scan_dir.is_dir() {
        eprintln!(
            "{}",
            format!("✗ Error: directory not found: {}", scan_dir.display())
                .red()
                .bold()
        );
        std::process::exit(1);
    }

    let config = load_config(&scan_dir, args.config.as_deref())?;
    let threats_dir = resolve_threats_dir(&config);

    banner("MULTI-ECOSYSTEM PACKAGE THREAT SCANNER");
    println!("{} {}", "Scan directory :".bold(), scan_dir.display());
    if let Some(csv_file) = &args.csv_file {
        println!("{} {}", "Threat CSV     :".bold(), csv_file.display());
    } else if !args.threats.is_empty() {
        println!("{} {}", "Threat feeds   :".bold(), args.threats.join(", "));
    } else {
        println!(
            "{} {} (all feeds)",
            "Threats dir    :".bold(),
            threats_dir.display()
        );
    }
    println!();

    // Load threat data; nothing to scan against is fatal.
    let mut db = ThreatDatabase::new(&threats_dir);
    let threat_filter = (!args.threats.is_empty()).then_some(args.threats.as_slice());
    if let Err(err) = db.load_threats(threat_filter, args.csv_file.as_deref()) {
        eprintln!("{}", format!("✗ Error: {:#}", err).red().bold());
        std::process::exit(1);
    }
    db.print_summary();
    println!();

    let ecosystems = resolve_ecosystems(&args, &scan_dir);

    let mut engine = ReportEngine::new(&scan_dir);
    engine.set_threats(db.get_loaded_threats().to_vec());

    let spinner = if args.quiet {
        ProgressSpinner::disabled()
    } else {
        ProgressSpinner::new()
    };
    for ecosystem in ecosystems {
        if !db.get_ecosystems().contains(ecosystem.as_str()) {
            println!(
                "{}",
                format!("⚠ Note: no threats for {} in the database. Skipping.", ecosystem)
                    .yellow()
                    .dimmed()
            );
            continue;
        }
        let Some(adapter) = adapter_for(ecosystem) else {
            continue;
        };
        let findings = adapter.scan_all_projects(&db, &scan_dir, &spinner);
        if !args.quiet {
            eprintln!(
                "  {} {}: {} finding(s)",
                "→".cyan(),
                ecosystem,
                findings.len()
            );
        }
        engine.add_findings(findings);
    }
    spinner.clear();

    engine.print_report();

    if !args.no_save {
        let output = args
            .output
            .or(config.scan.output)
            .unwrap_or_else(|| PathBuf::from("package_scan_report.json"));
        match engine.save_report(&output) {
            Ok(()) => println!(
                "{}",
                format!("✓ Report saved to: {}", output.display())
                    .green()
                    .bold()
            ),
            Err(err) => eprintln!(
                "{}",
                format!("✗ Error: could not save report: {:#}", err)
                    .red()
                    .bold()
            ),
        }
    }

    if engine.get_findings_count() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Pick the ecosystems to scan.
///
/// An explicit `--ecosystem` list with no usable entry is an error (exit 1).
/// Auto-detection finding nothing, or only ecosystems without adapters, is a
/// clean exit 0: an empty directory has nothing compromised in it.
fn resolve_ecosystems(args: &ScanArgs, scan_dir: &Path) -> Vec<Ecosystem> {
    if let Some(list) = &args.ecosystems {
        let mut requested = Vec::new();
        for token in list.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.parse::<Ecosystem>() {
                Ok(ecosystem) => requested.push(ecosystem),
                Err(_) => eprintln!(
                    "{}",
                    format!("⚠ Warning: unknown ecosystem '{}'. Skipping.", token).yellow()
                ),
            }
        }

        let selected = keep_scannable(&requested);
        if selected.is_empty() {
            eprintln!("{}", "✗ Error: no scannable ecosystems specified".red().bold());
            eprintln!("   Available: {}", ecosystem_list(&available_ecosystems()));
            std::process::exit(1);
        }
        println!(
            "{}",
            format!("Scanning ecosystems: {}", ecosystem_list(&selected))
                .cyan()
                .bold()
        );
        return selected;
    }

    println!("{}", "Auto-detecting ecosystems...".cyan());
    let detected = detect_ecosystems(scan_dir);
    if detected.is_empty() {
        println!(
            "{}",
            "⚠ No recognizable project files found. Try --ecosystem to force a scan."
                .yellow()
                .bold()
        );
        std::process::exit(0);
    }
    println!(
        "{}",
        format!("✓ Detected: {}", ecosystem_list(&detected)).green()
    );

    let selected = keep_scannable(&detected);
    if selected.is_empty() {
        println!(
            "{}",
            "⚠ None of the detected ecosystems has a scanner yet."
                .yellow()
                .bold()
        );
        std::process::exit(0);
    }
    println!(
        "{}",
        format!("  Scanning: {}", ecosystem_list(&selected))
            .cyan()
            .bold()
    );
    selected
}

/// Drop ecosystems without an adapter, warning for each.
fn keep_scannable(requested: &[Ecosystem]) -> Vec<Ecosystem> {
    let available = available_ecosystems();
    let mut selected = Vec::new();
    for ecosystem in requested {
        if available.contains(ecosystem) {
            if !selected.contains(ecosystem) {
                selected.push(*ecosystem);
            }
        } else {
            eprintln!(
                "{}",
                format!(
                    "⚠ Warning: no scanner implemented for '{}' yet. Skipping.",
                    ecosystem
                )
                .yellow()
            );
        }
    }
    selected
}

fn ecosystem_list(ecosystems: &[Ecosystem]) -> String {
    ecosystems
        .iter()
        .map(Ecosystem::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn list_ecosystems() {
    let available = available_ecosystems();

    banner("SUPPORTED ECOSYSTEMS");
    println!("{} ecosystem(s) with a scanner:\n", available.len());
    for ecosystem in available {
        let Some(adapter) = adapter_for(ecosystem) else {
            continue;
        };
        println!("  • {}", ecosystem.to_string().green().bold());
        println!("    Manifests: {}", adapter.get_manifest_files().join(", "));
        println!("    Lockfiles: {}", adapter.get_lockfile_names().join(", "));
        println!();
    }

    let detect_only: Vec<Ecosystem> = Ecosystem::ALL
        .iter()
        .copied()
        .filter(|ecosystem| adapter_for(*ecosystem).is_none())
        .collect();
    if !detect_only.is_empty() {
        println!(
            "{}",
            format!("Detection only (no scanner yet): {}", ecosystem_list(&detect_only)).dimmed()
        );
    }
}

/// `info` subcommand: show feed metadata and/or the packages they list.
///
/// With neither `--summary` nor `--packages` both sections print. `--file`
/// inspects a single CSV; otherwise the configured threats directory is
/// loaded, optionally filtered by `--threat`.
fn run_info(
    file: Option<&Path>,
    threats: &[String],
    summary: bool,
    packages: bool,
    csv: bool,
) -> Result<()> {
    let show_summary = summary || !packages;
    let show_packages = packages || !summary;

    let threats_dir;
    let mut db;
    if let Some(file) = file {
        threats_dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        db = ThreatDatabase::new(&threats_dir);
        if let Err(err) = db.load_threats(None, Some(file)) {
            eprintln!("{}", format!("✗ Error: {:#}", err).red().bold());
            std::process::exit(1);
        }
    } else {
        let config = load_config(Path::new("."), None)?;
        threats_dir = resolve_threats_dir(&config);
        db = ThreatDatabase::new(&threats_dir);
        let filter = (!threats.is_empty()).then_some(threats);
        if let Err(err) = db.load_threats(filter, None) {
            eprintln!("{}", format!("✗ Error: {:#}", err).red().bold());
            std::process::exit(1);
        }
    }

    if csv {
        print_info_csv(&db, &threats_dir, file, show_summary, show_packages)?;
        return Ok(());
    }

    if show_summary {
        banner("THREAT DATABASE");
        db.print_summary();
        println!();
        for threat in db.get_loaded_threats() {
            let path = feed_path(&threats_dir, file, threat);
            print_feed_metadata(&path, threat);
            println!();
        }
    }

    if show_packages {
        print_packages(&db);
    }
    Ok(())
}

/// Path of a loaded feed's CSV, for metadata display.
fn feed_path(threats_dir: &Path, file: Option<&Path>, threat: &str) -> PathBuf {
    match file {
        Some(file) => file.to_path_buf(),
        None => threats_dir.join(format!("{}.csv", threat)),
    }
}

fn print_feed_metadata(path: &Path, threat: &str) {
    println!("{}", format!("Feed: {}", threat).cyan().bold());
    let metadata = parse_threat_metadata(path);
    if metadata.is_empty() {
        println!("  {}", "(no metadata header)".dimmed());
    }
    for (key, value) in metadata.fields() {
        println!("  {}: {}", key.bold(), value);
    }
    if metadata.is_complete() {
        println!("  {}", "✓ all recommended fields present".green());
    } else {
        println!(
            "  {}",
            format!(
                "⚠ missing recommended fields: {}",
                metadata.get_missing_recommended_fields().join(", ")
            )
            .yellow()
        );
    }
}

fn print_packages(db: &ThreatDatabase) {
    banner("COMPROMISED PACKAGES");
    for ecosystem in db.get_ecosystems() {
        let packages = db.get_all_packages(Some(&ecosystem));
        println!(
            "{}",
            format!(
                "{}: {} package(s), {} version(s)",
                ecosystem.to_uppercase(),
                packages.len(),
                db.get_version_count(Some(&ecosystem))
            )
            .magenta()
            .bold()
        );
        for (name, versions) in &packages {
            println!("  {}", name.red());
            for version in versions {
                println!("    └─ {}", version);
            }
        }
        println!();
    }
}

/// Machine-readable `info --csv`: metadata as comment lines, packages as
/// multi-ecosystem CSV rows.
fn print_info_csv(
    db: &ThreatDatabase,
    threats_dir: &Path,
    file: Option<&Path>,
    show_summary: bool,
    show_packages: bool,
) -> Result<()> {
    if show_summary {
        for threat in db.get_loaded_threats() {
            let path = feed_path(threats_dir, file, threat);
            println!("# Threat: {}", threat);
            for (key, value) in parse_threat_metadata(&path).fields() {
                println!("# {}: {}", key, value);
            }
        }
    }

    if show_packages {
        // Always the multi-ecosystem layout, even for legacy feeds.
        println!("ecosystem,name,version");
        for ecosystem in db.get_ecosystems() {
            for (name, versions) in db.get_all_packages(Some(&ecosystem)) {
                for version in versions {
                    println!("{},{},{}", ecosystem, name, version);
                }
            }
        }
    }
    Ok(())
}

fn banner(title: &str) {
    let line = "=".repeat(64);
    println!("{}", line.cyan());
    println!("{}", title.cyan().bold());
    println!("{}", line.cyan());
}
