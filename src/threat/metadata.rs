use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Fields every threat feed is expected to document in its comment header.
pub const RECOMMENDED_FIELDS: [&str; 5] =
    ["Description", "Source", "Last updated", "Severity", "CVE"];

/// Metadata parsed from the leading `#` comment block of a threat CSV.
///
/// Comment lines of the form `# Key: Value` become fields; the split happens
/// at the first colon, so values may themselves contain colons (URLs). Field
/// order and display casing are preserved, while lookups ignore case.
#[derive(Debug, Clone, Default)]
pub struct ThreatMetadata {
    fields: Vec<(String, String)>,
    /// Every leading comment line as it appeared, colon or not.
    pub comment_lines: Vec<String>,
}

impl ThreatMetadata {
    /// Value of `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Parsed fields in file order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when every recommended field is present with a non-empty value.
    pub fn is_complete(&self) -> bool {
        RECOMMENDED_FIELDS
            .iter()
            .all(|field| self.get(field).is_some_and(|value| !value.is_empty()))
    }

    /// Lowercase names of recommended fields that are absent or empty.
    pub fn get_missing_recommended_fields(&self) -> Vec<String> {
        RECOMMENDED_FIELDS
            .iter()
            .filter(|field| self.get(field).is_none_or(str::is_empty))
            .map(|field| field.to_lowercase())
            .collect()
    }

    fn push_comment_line(&mut self, line: &str) {
        self.comment_lines.push(line.to_string());
        let body = line.trim().trim_start_matches('#').trim();
        if let Some((name, value)) = body.split_once(':') {
            let name = name.trim();
            if !name.is_empty() {
                self.fields
                    .push((name.to_string(), value.trim().to_string()));
            }
        }
    }
}

/// Parse the comment header of the threat CSV at `path`.
///
/// A missing or unreadable file yields empty metadata rather than an error;
/// header scanning stops at the first line that is neither a comment nor
/// blank (normally the CSV header row).
pub fn parse_threat_metadata(path: &Path) -> ThreatMetadata {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return ThreatMetadata::default(),
    };

    let mut metadata = ThreatMetadata::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('#') {
            break;
        }
        metadata.push_comment_line(line);
    }
    metadata
}

/// Drop comment (`#`) and blank lines so a CSV parser sees only the header
/// row and data rows. Kept lines pass through verbatim.
pub fn filter_csv_comments<'a, I>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(str::to_string)
        .collect()
}

/// Read a threat CSV with comment and blank lines removed.
pub fn read_csv_without_comments(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut filtered = filter_csv_comments(content.lines()).join("\n");
    if !filtered.is_empty() {
        filtered.push('\n');
    }
    Ok(filtered)
}
