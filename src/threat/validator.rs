use std::collections::HashSet;
use std::path::Path;

use colored::Colorize;

use crate::threat::database::detect_format;
use crate::threat::metadata::{parse_threat_metadata, read_csv_without_comments};

/// Ecosystems a feed may reference without tripping strict mode.
pub const KNOWN_ECOSYSTEMS: [&str; 4] = ["npm", "maven", "pip", "gem"];

/// Warnings printed before the rest are summarized, unless verbose.
const WARNING_PRINT_LIMIT: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Escalate row warnings to errors and reject unknown ecosystems.
    pub strict: bool,
    /// Print every warning instead of the first few.
    pub verbose: bool,
    /// Row errors tolerated before the file fails.
    pub error_limit: usize,
}

/// Outcome of one row check.
enum Diagnostic {
    Warning(String),
    Error(String),
}

/// Check a threat CSV for structural and content problems.
///
/// The whole file is always processed so one bad row cannot mask later
/// ones. An unreadable file or an unrecognized header fails outright in
/// every mode; row problems are warnings unless strict escalates them.
/// Duplicate rows are reported but never fail validation. Returns whether
/// the file passed.
pub fn validate_threat_file(path: &Path, options: &ValidationOptions) -> bool {
    println!(
        "{}",
        format!("Validating {}", path.display()).cyan().bold()
    );

    let content = match read_csv_without_comments(path) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("{}", format!("✗ {:#}", err).red().bold());
            return false;
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(err) => {
            eprintln!("{}", format!("✗ invalid CSV header: {}", err).red().bold());
            return false;
        }
    };

    let format = match detect_format(&headers) {
        Ok(format) => format,
        Err(err) => {
            eprintln!("{}", format!("✗ {:#}", err).red().bold());
            return false;
        }
    };
    if format.is_legacy() {
        println!(
            "{}",
            "⚠ Legacy 'Package Name,Version' format; rows default to the npm ecosystem".yellow()
        );
    }

    let metadata = parse_threat_metadata(path);
    if !metadata.is_complete() {
        println!(
            "{}",
            format!(
                "⚠ Missing recommended metadata: {}",
                metadata.get_missing_recommended_fields().join(", ")
            )
            .yellow()
        );
    }

    let mut diagnostics = Vec::new();
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mut rows = 0usize;

    for (index, record) in reader.records().enumerate() {
        let row = index + 2;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                diagnostics.push(row_problem(
                    options.strict,
                    format!("row {}: unparseable: {}", row, err),
                ));
                continue;
            }
        };
        rows += 1;

        let (ecosystem, name, version) = format.extract(&record);
        if ecosystem.is_empty() || name.is_empty() || version.is_empty() {
            diagnostics.push(row_problem(
                options.strict,
                format!("row {}: empty required field", row),
            ));
            continue;
        }

        if !KNOWN_ECOSYSTEMS.contains(&ecosystem.as_str()) {
            if options.strict {
                diagnostics.push(Diagnostic::Error(format!(
                    "row {}: unknown ecosystem '{}'",
                    row, ecosystem
                )));
            } else if options.verbose {
                diagnostics.push(Diagnostic::Warning(format!(
                    "row {}: ecosystem '{}' is not one of {}",
                    row,
                    ecosystem,
                    KNOWN_ECOSYSTEMS.join(", ")
                )));
            }
        }

        if let Some(problem) = check_name_shape(&ecosystem, &name) {
            diagnostics.push(row_problem(
                options.strict,
                format!("row {}: {}", row, problem),
            ));
        }

        // Duplicates are informational in every mode.
        let key = (ecosystem, name, version);
        if !seen.insert(key.clone()) {
            diagnostics.push(Diagnostic::Warning(format!(
                "row {}: duplicate entry {}/{}@{}",
                row, key.0, key.1, key.2
            )));
        }
    }

    print_diagnostics(&diagnostics, options.verbose);

    let errors = diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::Error(_)))
        .count();
    let warnings = diagnostics.len() - errors;
    let passed = errors <= options.error_limit;

    if passed {
        println!(
            "{}",
            format!(
                "✓ Validation passed: {} row(s), {} warning(s)",
                rows, warnings
            )
            .green()
            .bold()
        );
    } else {
        eprintln!(
            "{}",
            format!(
                "✗ Validation failed: {} error(s), {} warning(s) in {} row(s)",
                errors, warnings, rows
            )
            .red()
            .bold()
        );
    }
    passed
}

/// Ecosystem-specific package name checks.
///
/// Maven coordinates need a `group:artifact` colon; npm names may not
/// contain colons or whitespace. Other ecosystems are not shape-checked.
fn check_name_shape(ecosystem: &str, name: &str) -> Option<String> {
    match ecosystem {
        "maven" if !name.contains(':') => Some(format!(
            "maven name '{}' is missing the group:artifact colon",
            name
        )),
        "npm" if name.contains(':') || name.contains(char::is_whitespace) => {
            Some(format!("npm name '{}' contains invalid characters", name))
        }
        _ => None,
    }
}

fn row_problem(strict: bool, message: String) -> Diagnostic {
    if strict {
        Diagnostic::Error(message)
    } else {
        Diagnostic::Warning(message)
    }
}

/// Errors always print; warnings are capped unless verbose.
fn print_diagnostics(diagnostics: &[Diagnostic], verbose: bool) {
    let mut warnings_printed = 0usize;
    let mut warnings_total = 0usize;

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Error(message) => {
                eprintln!("{}", format!("  ✗ {}", message).red());
            }
            Diagnostic::Warning(message) => {
                warnings_total += 1;
                if verbose || warnings_printed < WARNING_PRINT_LIMIT {
                    eprintln!("{}", format!("  ⚠ {}", message).yellow());
                    warnings_printed += 1;
                }
            }
        }
    }
    if warnings_printed < warnings_total {
        eprintln!(
            "{}",
            format!(
                "  … {} more warning(s), rerun with --verbose to see them",
                warnings_total - warnings_printed
            )
            .dimmed()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    fn validate(content: &str, options: &ValidationOptions) -> bool {
        let file = csv_file(content);
        validate_threat_file(file.path(), options)
    }

    #[test]
    fn test_clean_file_passes() {
        let content = "# Description: test\n\
                       ecosystem,name,version\n\
                       npm,left-pad,1.3.0\n\
                       maven,org.example:core,2.0.0\n";
        assert!(validate(content, &ValidationOptions::default()));
        assert!(validate(
            content,
            &ValidationOptions {
                strict: true,
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_legacy_format_passes() {
        let content = "Package Name,Version\nevent-stream,3.3.6\n";
        assert!(validate(content, &ValidationOptions::default()));
    }

    #[test]
    fn test_unrecognized_header_fails_in_every_mode() {
        let content = "package,release\nfoo,1.0.0\n";
        assert!(!validate(content, &ValidationOptions::default()));
        assert!(!validate(
            content,
            &ValidationOptions {
                strict: true,
                verbose: true,
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(!validate_threat_file(
            Path::new("/nonexistent/feed.csv"),
            &ValidationOptions::default()
        ));
    }

    #[test]
    fn test_unknown_ecosystem_only_fails_strict() {
        let content = "ecosystem,name,version\ncargo,serde,1.0.0\n";
        assert!(validate(content, &ValidationOptions::default()));
        assert!(!validate(
            content,
            &ValidationOptions {
                strict: true,
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_empty_field_only_fails_strict() {
        let content = "ecosystem,name,version\nnpm,,1.0.0\n";
        assert!(validate(content, &ValidationOptions::default()));
        assert!(!validate(
            content,
            &ValidationOptions {
                strict: true,
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_duplicates_never_fail() {
        let content = "ecosystem,name,version\n\
                       npm,left-pad,1.3.0\n\
                       npm,left-pad,1.3.0\n";
        assert!(validate(content, &ValidationOptions::default()));
        assert!(validate(
            content,
            &ValidationOptions {
                strict: true,
                verbose: true,
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_maven_name_without_colon_only_fails_strict() {
        let content = "ecosystem,name,version\nmaven,log4j-core,2.14.1\n";
        assert!(validate(content, &ValidationOptions::default()));
        assert!(!validate(
            content,
            &ValidationOptions {
                strict: true,
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_npm_name_with_whitespace_only_fails_strict() {
        let content = "ecosystem,name,version\nnpm,left pad,1.3.0\n";
        assert!(validate(content, &ValidationOptions::default()));
        assert!(!validate(
            content,
            &ValidationOptions {
                strict: true,
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_error_limit_tolerates_that_many_errors() {
        let content = "ecosystem,name,version\n\
                       npm,,1.0.0\n\
                       npm,left-pad,1.3.0\n";
        assert!(validate(
            content,
            &ValidationOptions {
                strict: true,
                error_limit: 1,
                ..Default::default()
            }
        ));

        let two_bad = "ecosystem,name,version\n\
                       npm,,1.0.0\n\
                       pip,,2.0.0\n";
        assert!(!validate(
            two_bad,
            &ValidationOptions {
                strict: true,
                error_limit: 1,
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_verbose_does_not_change_outcome() {
        let content = "ecosystem,name,version\ncargo,serde,1.0.0\nnpm,,1.0.0\n";
        let quiet = validate(content, &ValidationOptions::default());
        let loud = validate(
            content,
            &ValidationOptions {
                verbose: true,
                ..Default::default()
            },
        );
        assert_eq!(quiet, loud);
        assert!(loud);
    }

    #[test]
    fn test_whole_file_is_processed_despite_early_errors() {
        // The late duplicate is only detectable if rows after the bad one
        // were still examined.
        let content = "ecosystem,name,version\n\
                       npm,,1.0.0\n\
                       npm,left-pad,1.3.0\n\
                       npm,left-pad,1.3.0\n";
        assert!(validate(content, &ValidationOptions::default()));
    }
}
