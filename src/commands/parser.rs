//! Parser for the column-aligned tables winget prints for `list` and `upgrade`.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::commands::process::decode_line;
use crate::models::PackageRecord;

/// Any line with a dash run is discarded.
static SEPARATOR_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{3,}").unwrap());

/// The dashed rule winget prints below a table header, and nothing else.
static RULE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*-{3,}\s*$").unwrap());

/// Columns are padded with at least two spaces; single spaces belong to a value.
static COLUMN_SPLIT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

const MIN_FIELDS: usize = 4;

fn is_separator(line: &str) -> bool {
    SEPARATOR_REGEX.is_match(line)
}

fn is_rule(line: &str) -> bool {
    RULE_REGEX.is_match(line)
}

/// Splits a table row into its column values.
fn split_columns(line: &str) -> Vec<&str> {
    COLUMN_SPLIT_REGEX
        .split(line.trim())
        .filter(|field| !field.is_empty())
        .collect()
}

/// Maps a row to a record positionally: name, id, version, available.
fn parse_row(line: &str) -> Option<PackageRecord> {
    let fields = split_columns(line);
    if fields.len() < MIN_FIELDS {
        log::debug!("Skipping row with {} fields: '{}'", fields.len(), line);
        return None;
    }
    Some(PackageRecord::new(fields[0], fields[1], fields[2], fields[3]))
}

/// Parses winget's tabular output into package records.
///
/// Banner lines before the first separator are ignored, rows with fewer than
/// four columns are dropped. When a second table follows, its header row is
/// not mistaken for a package. Never fails.
pub fn parse_packages(text: &str) -> Vec<PackageRecord> {
    let mut packages = Vec::new();
    let mut in_table = false;
    // Whether the last pushed record came from the line right before this one.
    let mut previous_was_row = false;

    for raw in text.split('\n') {
        let line = decode_line(raw.as_bytes());
        if line.trim().is_empty() {
            previous_was_row = false;
            continue;
        }

        if is_separator(&line) {
            // Only a real rule turns the row above it into a header.
            if previous_was_row && is_rule(&line) {
                packages.pop();
            }
            in_table = true;
            previous_was_row = false;
            continue;
        }

        if !in_table {
            continue;
        }

        match parse_row(&line) {
            Some(record) => {
                packages.push(record);
                previous_was_row = true;
            }
            None => previous_was_row = false,
        }
    }

    log::debug!("Parsed {} packages from winget output", packages.len());
    packages
}
