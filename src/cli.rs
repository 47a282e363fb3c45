use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "package-scan",
    about = "Scan projects for known-compromised package versions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub scan: ScanArgs,
}

/// Options of the default scan run.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory to scan recursively
    #[arg(long = "dir", value_name = "DIR", default_value = ".")]
    pub scan_dir: PathBuf,

    /// Threat feed to check against, by name (repeatable) [default: all]
    #[arg(long = "threat", value_name = "NAME")]
    pub threats: Vec<String>,

    /// Custom threat CSV file; overrides --threat and the threats directory
    #[arg(long = "csv", value_name = "FILE")]
    pub csv_file: Option<PathBuf>,

    /// Comma-separated ecosystems to scan [default: auto-detect]
    #[arg(long = "ecosystem", value_name = "LIST")]
    pub ecosystems: Option<String>,

    /// JSON report path [default: package_scan_report.json]
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Do not write the JSON report
    #[arg(long)]
    pub no_save: bool,

    /// Config file [default: <dir>/.package-scan/config.toml, fallback ~/.config/package-scan/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Suppress the progress spinner
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List supported ecosystems and their recognized files
    ListEcosystems,

    /// Check a threat CSV file for format and content problems
    Validate {
        /// Threat CSV file to validate
        #[arg(long, value_name = "FILE")]
        file: PathBuf,

        /// Escalate row warnings to errors and reject unknown ecosystems
        #[arg(long)]
        strict: bool,

        /// Print every warning instead of the first few
        #[arg(short, long)]
        verbose: bool,

        /// Row errors tolerated before the file fails
        #[arg(long, value_name = "N", default_value_t = 0)]
        error_limit: usize,
    },

    /// Show threat feed metadata and the packages they list
    Info {
        /// Inspect one threat CSV file instead of the threats directory
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Restrict to specific feeds by name (repeatable)
        #[arg(long = "threat", value_name = "NAME")]
        threats: Vec<String>,

        /// Show only metadata and statistics
        #[arg(long)]
        summary: bool,

        /// Show only the affected packages
        #[arg(long)]
        packages: bool,

        /// Emit machine-readable CSV instead of formatted output
        #[arg(long)]
        csv: bool,
    },
}
