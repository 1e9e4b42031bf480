//! Box file writer

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use super::GroundTruthRecord;

/// Write records to `path`, one line each, replacing any existing file
///
/// The parent directory is created when missing. A crash mid-write leaves a
/// truncated file; validation catches it before training.
pub fn write_ground_truth(path: &Path, records: &[GroundTruthRecord]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        writeln!(writer, "{}", record)?;
    }
    writer.flush()?;

    info!("Box file created: {:?} ({} glyphs)", path, records.len());
    Ok(())
}
