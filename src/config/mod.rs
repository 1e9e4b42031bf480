//! Application Configuration
//!
//! Directory layout, training parameters and toolchain executables, stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::annotation::VerticalMapping;
use crate::vision::DEFAULT_DPI;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where images, boxes and training outputs live
    pub directories: DirectoryConfig,
    /// Training run parameters
    pub training: TrainingSettings,
    /// External executables
    pub toolchain: ToolchainConfig,
    /// Annotation-to-box coordinate mapping
    pub mapping: MappingConfig,
}

/// Working directories shared by submission, batch driver and orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Untouched copies of submitted source images (JPEG)
    pub origin: PathBuf,
    /// Source images with the annotation rectangles drawn on top
    pub boundary: PathBuf,
    /// TIFF copies of submitted images, scanned by the batch driver
    pub tiff: PathBuf,
    /// DPI-corrected derivatives handed to the toolchain
    pub normalized: PathBuf,
    /// Ground-truth box files
    pub boxes: PathBuf,
    /// Toolchain working directory and trained model output
    pub output: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            origin: PathBuf::from("images/origin"),
            boundary: PathBuf::from("images/boundary"),
            tiff: PathBuf::from("images/tiff"),
            normalized: PathBuf::from("images/normalized"),
            boxes: PathBuf::from("boxes"),
            output: PathBuf::from("training_output"),
        }
    }
}

impl DirectoryConfig {
    /// Every directory, in creation order
    pub fn all(&self) -> [&Path; 6] {
        [
            self.origin.as_path(),
            self.boundary.as_path(),
            self.tiff.as_path(),
            self.normalized.as_path(),
            self.boxes.as_path(),
            self.output.as_path(),
        ]
    }
}

/// Training run parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Resolution written on both axes of the normalized image
    pub dpi: u32,
    /// Upper bound for a single toolchain command, in seconds
    pub stage_timeout_secs: u64,
    /// Extensions the batch driver treats as training images
    pub image_extensions: Vec<String>,
    /// Extension of ground-truth files matched by base name
    pub ground_truth_extension: String,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            stage_timeout_secs: 600,
            image_extensions: vec!["tiff".to_string(), "tif".to_string()],
            ground_truth_extension: "box".to_string(),
        }
    }
}

impl TrainingSettings {
    /// Per-stage timeout as a duration
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

/// Names (or paths) of the external training executables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub tesseract: PathBuf,
    pub unicharset_extractor: PathBuf,
    pub mftraining: PathBuf,
    pub cntraining: PathBuf,
    pub combine_tessdata: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            tesseract: PathBuf::from("tesseract"),
            unicharset_extractor: PathBuf::from("unicharset_extractor"),
            mftraining: PathBuf::from("mftraining"),
            cntraining: PathBuf::from("cntraining"),
            combine_tessdata: PathBuf::from("combine_tessdata"),
        }
    }
}

/// Coordinate mapping settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// How annotation y-coordinates become box bottom/top values
    pub vertical: VerticalMapping,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
