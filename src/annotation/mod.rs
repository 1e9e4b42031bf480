//! Annotation Layer
//!
//! User-drawn rectangles with transcribed text, as submitted by the scan
//! overlay, and their conversion into ground-truth box records.

pub mod mapper;
pub mod submission;

pub use mapper::map_annotations;
pub use submission::{ingest_submission, Submission};

use anyhow::{Context, Result};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::path::Path;

/// One labelled rectangle over a source image
///
/// Coordinates are image pixels with a top-left origin. `x1 < x2` is expected;
/// no ordering is enforced between `y1` and `y2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(deserialize_with = "round_coordinate")]
    pub x1: i32,
    #[serde(deserialize_with = "round_coordinate")]
    pub y1: i32,
    #[serde(deserialize_with = "round_coordinate")]
    pub x2: i32,
    #[serde(deserialize_with = "round_coordinate")]
    pub y2: i32,
    /// Transcribed text, one glyph per character
    pub text: String,
}

#[cfg(test)]
impl Annotation {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32, text: impl Into<String>) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            text: text.into(),
        }
    }
}

/// Vertical convention used when turning annotation rows into box rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalMapping {
    /// bottom = y2, top = y1, no height correction
    #[default]
    DirectSwap,
    /// bottom = height - y2, top = height - y1 (bottom-left origin)
    HeightFlip,
}

/// The canvas overlay reports fractional pixels; boxes need integers.
fn round_coordinate<'de, D>(deserializer: D) -> std::result::Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value.abs() > i32::MAX as f64 {
        return Err(D::Error::custom(format!("coordinate out of range: {}", value)));
    }
    Ok(value.round() as i32)
}

/// Parse a JSON array of annotations
pub fn parse_annotations(json: &str) -> Result<Vec<Annotation>> {
    let annotations: Vec<Annotation> =
        serde_json::from_str(json).context("Failed to parse annotations JSON")?;
    Ok(annotations)
}

/// Load a JSON array of annotations from file
pub fn load_annotations(path: &Path) -> Result<Vec<Annotation>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read annotations file {:?}", path))?;
    parse_annotations(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_annotations() {
        let json = r#"[{"x1": 10, "y1": 50, "x2": 40, "y2": 90, "text": "AB"}]"#;
        let annotations = parse_annotations(json).unwrap();
        assert_eq!(annotations, vec![Annotation::new(10, 50, 40, 90, "AB")]);
    }

    #[test]
    fn test_parse_rounds_fractional_coordinates() {
        let json = r#"[{"x1": 10.4, "y1": 49.6, "x2": 40.5, "y2": 90.0, "text": "x"}]"#;
        let annotations = parse_annotations(json).unwrap();
        assert_eq!(annotations[0].x1, 10);
        assert_eq!(annotations[0].y1, 50);
        assert_eq!(annotations[0].x2, 41);
        assert_eq!(annotations[0].y2, 90);
    }

    #[test]
    fn test_parse_rejects_missing_text() {
        let json = r#"[{"x1": 1, "y1": 2, "x2": 3, "y2": 4}]"#;
        assert!(parse_annotations(json).is_err());
    }

    #[test]
    fn test_vertical_mapping_serde_names() {
        assert_eq!(
            serde_json::to_string(&VerticalMapping::HeightFlip).unwrap(),
            "\"height_flip\""
        );
        let parsed: VerticalMapping = serde_json::from_str("\"direct_swap\"").unwrap();
        assert_eq!(parsed, VerticalMapping::DirectSwap);
    }
}
