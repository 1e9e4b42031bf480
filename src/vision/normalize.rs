//! DPI normalization
//!
//! Rewrites an image as TIFF with the resolution tag the training toolchain expects.

use image::{DynamicImage, GenericImageView};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tiff::encoder::{colortype, Rational, TiffEncoder};
use tiff::tags::ResolutionUnit;
use tiff::TiffResult;
use tracing::{debug, info};

/// Resolution expected by the box.train stage when none is configured
pub const DEFAULT_DPI: u32 = 150;

/// Errors raised while normalizing an image
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// Source image is missing or could not be decoded
    #[error("Unable to read image {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    /// Resolution tags could not be encoded
    #[error("Unable to encode image {path} with DPI {dpi}: {source}")]
    Encode {
        path: PathBuf,
        dpi: u32,
        source: tiff::TiffError,
    },
    /// Encoded image could not be written to the destination
    #[error("Unable to save image to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Read `source` and write it to `destination` as TIFF at `dpi` on both axes
///
/// The image is fully encoded in memory before the destination is touched, so
/// a decode or encode failure never leaves a file behind. An existing
/// destination is overwritten.
pub fn normalize_dpi(source: &Path, destination: &Path, dpi: u32) -> Result<(), NormalizeError> {
    let image = image::open(source).map_err(|err| NormalizeError::Decode {
        path: source.to_path_buf(),
        source: err,
    })?;

    let (width, height) = image.dimensions();
    debug!("Decoded {:?} ({}x{}, {:?})", source, width, height, image.color());

    let encoded = encode_tiff(&image, dpi).map_err(|err| NormalizeError::Encode {
        path: destination.to_path_buf(),
        dpi,
        source: err,
    })?;

    std::fs::write(destination, encoded).map_err(|err| NormalizeError::Write {
        path: destination.to_path_buf(),
        source: err,
    })?;

    info!("Normalized {:?} -> {:?} at {} DPI", source, destination, dpi);
    Ok(())
}

fn encode_tiff(image: &DynamicImage, dpi: u32) -> TiffResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    let resolution = Rational { n: dpi, d: 1 };
    let (width, height) = image.dimensions();

    {
        let mut encoder = TiffEncoder::new(&mut cursor)?;
        match image {
            DynamicImage::ImageLuma8(gray) => {
                let mut tiff = encoder.new_image::<colortype::Gray8>(width, height)?;
                tiff.resolution(ResolutionUnit::Inch, resolution);
                tiff.write_data(gray.as_raw())?;
            }
            DynamicImage::ImageLuma16(gray) => {
                let mut tiff = encoder.new_image::<colortype::Gray16>(width, height)?;
                tiff.resolution(ResolutionUnit::Inch, resolution);
                tiff.write_data(gray.as_raw())?;
            }
            DynamicImage::ImageRgb16(rgb) => {
                let mut tiff = encoder.new_image::<colortype::RGB16>(width, height)?;
                tiff.resolution(ResolutionUnit::Inch, resolution);
                tiff.write_data(rgb.as_raw())?;
            }
            DynamicImage::ImageRgba8(rgba) => {
                let mut tiff = encoder.new_image::<colortype::RGBA8>(width, height)?;
                tiff.resolution(ResolutionUnit::Inch, resolution);
                tiff.write_data(rgba.as_raw())?;
            }
            // No gray+alpha color type in the encoder, alpha is kept as RGBA
            DynamicImage::ImageLumaA8(_) => {
                let rgba = image.to_rgba8();
                let mut tiff = encoder.new_image::<colortype::RGBA8>(width, height)?;
                tiff.resolution(ResolutionUnit::Inch, resolution);
                tiff.write_data(rgba.as_raw())?;
            }
            DynamicImage::ImageRgba16(_) | DynamicImage::ImageLumaA16(_) => {
                let rgba = image.to_rgba16();
                let mut tiff = encoder.new_image::<colortype::RGBA16>(width, height)?;
                tiff.resolution(ResolutionUnit::Inch, resolution);
                tiff.write_data(rgba.as_raw())?;
            }
            other => {
                let rgb = other.to_rgb8();
                let mut tiff = encoder.new_image::<colortype::RGB8>(width, height)?;
                tiff.resolution(ResolutionUnit::Inch, resolution);
                tiff.write_data(rgb.as_raw())?;
            }
        }
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, GrayImage, ImageBuffer, Luma, LumaA, Rgb, RgbImage, Rgba};
    use std::fs::File;
    use tempfile::TempDir;
    use tiff::decoder::{ifd::Value, Decoder};
    use tiff::tags::Tag;

    fn read_resolution(path: &Path) -> (Value, Value, u32) {
        let mut decoder = Decoder::new(File::open(path).unwrap()).unwrap();
        let x = decoder.get_tag(Tag::XResolution).unwrap();
        let y = decoder.get_tag(Tag::YResolution).unwrap();
        let unit = decoder.get_tag_u32(Tag::ResolutionUnit).unwrap();
        (x, y, unit)
    }

    #[test]
    fn test_normalize_sets_dpi_on_both_axes() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("scan.png");
        let destination = dir.path().join("scan.tiff");
        RgbImage::from_pixel(4, 3, Rgb([200, 10, 10])).save(&source).unwrap();

        normalize_dpi(&source, &destination, DEFAULT_DPI).unwrap();

        let (x, y, unit) = read_resolution(&destination);
        assert!(matches!(x, Value::Rational(150, 1)), "x resolution was {:?}", x);
        assert!(matches!(y, Value::Rational(150, 1)), "y resolution was {:?}", y);
        assert_eq!(unit, 2); // inch

        let reread = image::open(&destination).unwrap();
        assert_eq!(reread.dimensions(), (4, 3));
    }

    #[test]
    fn test_normalize_grayscale_custom_dpi() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("gray.png");
        let destination = dir.path().join("gray.tiff");
        GrayImage::from_pixel(2, 2, Luma([128])).save(&source).unwrap();

        normalize_dpi(&source, &destination, 300).unwrap();

        let (x, _, _) = read_resolution(&destination);
        assert!(matches!(x, Value::Rational(300, 1)));
    }

    #[test]
    fn test_normalize_keeps_sixteen_bit_depth() {
        let dir = TempDir::new().unwrap();

        let gray_source = dir.path().join("gray16.png");
        let gray_destination = dir.path().join("gray16.tiff");
        ImageBuffer::<Luma<u16>, Vec<u16>>::from_pixel(3, 2, Luma([40_000]))
            .save(&gray_source)
            .unwrap();
        normalize_dpi(&gray_source, &gray_destination, DEFAULT_DPI).unwrap();
        let gray = image::open(&gray_destination).unwrap();
        assert_eq!(gray.color(), ColorType::L16);
        assert_eq!(gray.to_luma16().get_pixel(0, 0), &Luma([40_000]));

        let rgb_source = dir.path().join("rgb16.png");
        let rgb_destination = dir.path().join("rgb16.tiff");
        ImageBuffer::<Rgb<u16>, Vec<u16>>::from_pixel(2, 2, Rgb([1, 30_000, 65_535]))
            .save(&rgb_source)
            .unwrap();
        normalize_dpi(&rgb_source, &rgb_destination, DEFAULT_DPI).unwrap();
        let rgb = image::open(&rgb_destination).unwrap();
        assert_eq!(rgb.color(), ColorType::Rgb16);
        assert_eq!(rgb.to_rgb16().get_pixel(1, 1), &Rgb([1, 30_000, 65_535]));

        let (x, _, _) = read_resolution(&rgb_destination);
        assert!(matches!(x, Value::Rational(150, 1)));
    }

    #[test]
    fn test_normalize_keeps_gray_alpha_transparency() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("gray_alpha.png");
        let destination = dir.path().join("gray_alpha.tiff");
        ImageBuffer::<LumaA<u8>, Vec<u8>>::from_pixel(2, 2, LumaA([90, 10]))
            .save(&source)
            .unwrap();

        normalize_dpi(&source, &destination, DEFAULT_DPI).unwrap();

        let reread = image::open(&destination).unwrap();
        assert_eq!(reread.color(), ColorType::Rgba8);
        assert_eq!(reread.to_rgba8().get_pixel(0, 0), &Rgba([90, 90, 90, 10]));
    }

    #[test]
    fn test_normalize_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("scan.png");
        let destination = dir.path().join("scan.tiff");
        RgbImage::from_pixel(5, 5, Rgb([0, 0, 0])).save(&source).unwrap();
        std::fs::write(&destination, b"stale").unwrap();

        normalize_dpi(&source, &destination, DEFAULT_DPI).unwrap();
        assert_eq!(image::open(&destination).unwrap().dimensions(), (5, 5));
    }

    #[test]
    fn test_non_image_fails_with_decode_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("notes.tiff");
        let destination = dir.path().join("out.tiff");
        std::fs::write(&source, "this is not an image").unwrap();

        let result = normalize_dpi(&source, &destination, DEFAULT_DPI);

        assert!(matches!(result, Err(NormalizeError::Decode { .. })));
        assert!(!destination.exists());
    }

    #[test]
    fn test_missing_source_fails_with_decode_error() {
        let dir = TempDir::new().unwrap();
        let result = normalize_dpi(
            &dir.path().join("missing.tiff"),
            &dir.path().join("out.tiff"),
            DEFAULT_DPI,
        );
        assert!(matches!(result, Err(NormalizeError::Decode { .. })));
    }

    #[test]
    fn test_unwritable_destination_fails_with_write_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("scan.png");
        RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])).save(&source).unwrap();

        let destination = dir.path().join("no/such/dir/out.tiff");
        let result = normalize_dpi(&source, &destination, DEFAULT_DPI);
        assert!(matches!(result, Err(NormalizeError::Write { .. })));
    }
}
