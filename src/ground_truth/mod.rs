//! Ground-truth box files
//!
//! One line per glyph: `<glyph> <left> <bottom> <right> <top> <page_index>`.

pub mod validator;
pub mod writer;

pub use validator::validate_ground_truth;
pub use writer::write_ground_truth;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Number of whitespace-separated fields on every box line
pub const FIELD_COUNT: usize = 6;

/// One line of a box file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroundTruthRecord {
    pub glyph: char,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
    pub top: i32,
    /// Always 0, box files here describe single pages
    pub page_index: u32,
}

impl fmt::Display for GroundTruthRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.glyph, self.left, self.bottom, self.right, self.top, self.page_index
        )
    }
}

/// Errors raised while parsing a box line
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRecordError {
    /// Line did not split into exactly six fields
    #[error("expected 6 fields, found {0}")]
    FieldCount(usize),
    /// First field is not a single character
    #[error("glyph field {0:?} is not a single character")]
    Glyph(String),
    /// A numeric field failed to parse
    #[error("invalid {field} value {value:?}")]
    Number { field: &'static str, value: String },
}

impl FromStr for GroundTruthRecord {
    type Err = ParseRecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != FIELD_COUNT {
            return Err(ParseRecordError::FieldCount(fields.len()));
        }

        let mut chars = fields[0].chars();
        let glyph = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => return Err(ParseRecordError::Glyph(fields[0].to_string())),
        };

        let number = |index: usize, field: &'static str| {
            fields[index].parse::<i32>().map_err(|_| ParseRecordError::Number {
                field,
                value: fields[index].to_string(),
            })
        };

        let page_index = fields[5].parse::<u32>().map_err(|_| ParseRecordError::Number {
            field: "page_index",
            value: fields[5].to_string(),
        })?;

        Ok(Self {
            glyph,
            left: number(1, "left")?,
            bottom: number(2, "bottom")?,
            right: number(3, "right")?,
            top: number(4, "top")?,
            page_index,
        })
    }
}

/// Errors raised while reading a whole box file
#[derive(Debug, thiserror::Error)]
pub enum ReadGroundTruthError {
    /// The file could not be read
    #[error("Failed to read ground-truth file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A line failed to parse
    #[error("{path}:{line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        source: ParseRecordError,
    },
}

/// Parse every non-blank line of a box file
pub fn read_ground_truth(path: &Path) -> Result<Vec<GroundTruthRecord>, ReadGroundTruthError> {
    let content = std::fs::read_to_string(path).map_err(|source| ReadGroundTruthError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            line.parse().map_err(|source| ReadGroundTruthError::Parse {
                path: path.to_path_buf(),
                line: index + 1,
                source,
            })
        })
        .collect()
}
