//! Boundary images
//!
//! A copy of the source with every annotation rectangle outlined, kept next to
//! the ground truth so labels can be reviewed by eye. Each rectangle carries
//! its text when a system font can be loaded.

use ab_glyph::FontVec;
use anyhow::{Context, Result};
use base64::Engine;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::debug;

use crate::annotation::Annotation;

const OUTLINE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OUTLINE_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 16.0;

const FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// First usable font from the common system locations
pub fn load_label_font() -> Option<FontVec> {
    for path in FONT_PATHS {
        if let Ok(data) = std::fs::read(path) {
            if let Ok(font) = FontVec::try_from_vec(data) {
                debug!("Labelling boundary images with {}", path);
                return Some(font);
            }
        }
    }
    debug!("No label font found, boundary images get outlines only");
    None
}

/// Draw every annotation rectangle onto a copy of `image`
pub fn render_boundary(image: &DynamicImage, annotations: &[Annotation]) -> RgbImage {
    let font = load_label_font();
    draw_boundary(image, annotations, font.as_ref())
}

/// Outline every annotation, writing its text above the rectangle if `font` is given
pub fn draw_boundary(image: &DynamicImage, annotations: &[Annotation], font: Option<&FontVec>) -> RgbImage {
    let mut canvas = image.to_rgb8();

    for annotation in annotations {
        let left = annotation.x1.min(annotation.x2);
        let top = annotation.y1.min(annotation.y2);
        let width = annotation.x1.abs_diff(annotation.x2).max(1);
        let height = annotation.y1.abs_diff(annotation.y2).max(1);

        for inset in 0..OUTLINE_THICKNESS {
            let shrink = 2 * inset as u32;
            if width <= shrink || height <= shrink {
                break;
            }
            let rect = Rect::at(left + inset, top + inset).of_size(width - shrink, height - shrink);
            draw_hollow_rect_mut(&mut canvas, rect, OUTLINE_COLOR);
        }

        if let Some(font) = font {
            let label_y = (top - LABEL_SCALE as i32 - 2).max(0);
            draw_text_mut(
                &mut canvas,
                OUTLINE_COLOR,
                left.max(0),
                label_y,
                LABEL_SCALE,
                font,
                &annotation.text,
            );
        }
    }

    canvas
}

/// Decode a `data:image/...;base64,` URL (or a bare base64 payload) into an image
pub fn decode_data_url(data_url: &str) -> Result<DynamicImage> {
    let payload = match data_url.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:image/") => payload,
        _ => data_url,
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("Annotated image is not valid base64")?;
    let image = image::load_from_memory(&bytes).context("Failed to decode annotated image")?;
    Ok(image)
}
