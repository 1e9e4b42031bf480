//! Structural check of box files before they reach the toolchain
//!
//! Only the field count is checked. Glyph width, coordinate signs and
//! `left < right` are left to the toolchain.

use std::path::{Path, PathBuf};
use tracing::warn;

use super::FIELD_COUNT;

/// A line that does not split into exactly six fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// 1-based line number
    pub line_number: usize,
    pub content: String,
    pub field_count: usize,
}

/// Outcome of validating one box file
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub path: PathBuf,
    /// Non-blank lines checked
    pub lines_checked: usize,
    /// Every offending line, in file order
    pub malformed: Vec<MalformedLine>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.malformed.is_empty()
    }

    pub fn first_malformed(&self) -> Option<&MalformedLine> {
        self.malformed.first()
    }
}

/// Validate a box file line by line
///
/// Blank lines are ignored. All malformed lines are collected.
pub fn validate_ground_truth(path: &Path) -> std::io::Result<ValidationReport> {
    let content = std::fs::read_to_string(path)?;
    Ok(validate_content(path, &content))
}

fn validate_content(path: &Path, content: &str) -> ValidationReport {
    let mut lines_checked = 0;
    let mut malformed = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        lines_checked += 1;

        let field_count = trimmed.split_whitespace().count();
        if field_count != FIELD_COUNT {
            warn!("Invalid line format in {:?} line {}: {}", path, index + 1, trimmed);
            malformed.push(MalformedLine {
                line_number: index + 1,
                content: trimmed.to_string(),
                field_count,
            });
        }
    }

    ValidationReport {
        path: path.to_path_buf(),
        lines_checked,
        malformed,
    }
}
