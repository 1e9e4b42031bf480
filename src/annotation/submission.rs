//! Annotation submission ingest
//!
//! Persists one submitted document: the source image (JPEG and TIFF copies),
//! a boundary image with the labels outlined, and the derived box file.

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use std::path::PathBuf;
use tracing::info;

use super::{map_annotations, Annotation};
use crate::config::AppConfig;
use crate::ground_truth::write_ground_truth;
use crate::storage::prepare_directories;
use crate::vision::{decode_data_url, render_boundary};

/// One document submitted from the scan overlay
#[derive(Debug, Clone)]
pub struct Submission {
    pub annotations: Vec<Annotation>,
    /// Rectified source image the annotations were drawn on
    pub source_image: PathBuf,
    /// Overlay snapshot as a `data:image/...;base64,` URL, rendered locally when absent
    pub annotated_image: Option<String>,
    /// Run identifier; a local timestamp is used when absent
    pub run_id: Option<String>,
}

/// Files written for a submission
#[derive(Debug, Clone)]
pub struct SubmissionOutput {
    pub run_id: String,
    pub origin_image: PathBuf,
    pub tiff_image: PathBuf,
    pub boundary_image: PathBuf,
    pub ground_truth: PathBuf,
    pub glyph_count: usize,
}

/// Timestamp run identifier, e.g. `20241014153012`
pub fn timestamp_run_id() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Persist a submission and write its ground truth
pub fn ingest_submission(submission: &Submission, config: &AppConfig) -> Result<SubmissionOutput> {
    let dirs = &config.directories;
    prepare_directories(dirs)?;

    let run_id = submission.run_id.clone().unwrap_or_else(timestamp_run_id);

    let source = image::open(&submission.source_image)
        .with_context(|| format!("Failed to load source image {:?}", submission.source_image))?;
    let (_, height) = source.dimensions();

    // Decode everything up front so a bad submission writes nothing
    let boundary = match &submission.annotated_image {
        Some(data_url) => decode_data_url(data_url)?.to_rgb8(),
        None => render_boundary(&source, &submission.annotations),
    };

    let origin_image = dirs.origin.join(format!("{}.jpg", run_id));
    DynamicImage::ImageRgb8(source.to_rgb8())
        .save(&origin_image)
        .with_context(|| format!("Failed to save {:?}", origin_image))?;

    let tiff_image = dirs.tiff.join(format!("{}.tiff", run_id));
    source
        .save(&tiff_image)
        .with_context(|| format!("Failed to save {:?}", tiff_image))?;

    let boundary_image = dirs.boundary.join(format!("{}.jpg", run_id));
    boundary
        .save(&boundary_image)
        .with_context(|| format!("Failed to save {:?}", boundary_image))?;

    let records = map_annotations(&submission.annotations, height, config.mapping.vertical);
    let ground_truth = dirs
        .boxes
        .join(format!("{}.{}", run_id, config.training.ground_truth_extension));
    write_ground_truth(&ground_truth, &records)
        .with_context(|| format!("Failed to write ground truth {:?}", ground_truth))?;

    info!(
        "Submission {} stored: {} annotations, {} glyphs",
        run_id,
        submission.annotations.len(),
        records.len()
    );

    Ok(SubmissionOutput {
        run_id,
        origin_image,
        tiff_image,
        boundary_image,
        ground_truth,
        glyph_count: records.len(),
    })
}
