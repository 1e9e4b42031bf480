//! Vision Layer
//!
//! Image-side steps of the pipeline: DPI normalization for the training
//! toolchain and boundary rendering of submitted annotations.
//!
//! Document boundary detection and recognition inference happen upstream and
//! downstream of training respectively and are not part of this crate.

pub mod boundary;
pub mod normalize;

pub use boundary::{decode_data_url, render_boundary};
pub use normalize::{normalize_dpi, NormalizeError, DEFAULT_DPI};
