//! Annotation rectangle to box record mapping
//!
//! Every character of an annotation's text becomes one record carrying the
//! whole annotation rectangle. Boxes are not subdivided per glyph, so a
//! multi-character label trains each glyph on the full label box.

use super::{Annotation, VerticalMapping};
use crate::ground_truth::GroundTruthRecord;

/// Map annotations to ground-truth records
///
/// `image_height` is only consulted by [`VerticalMapping::HeightFlip`].
/// Annotations with empty text produce no records. Geometry is passed
/// through as-is, including inverted rectangles.
pub fn map_annotations(
    annotations: &[Annotation],
    image_height: u32,
    mapping: VerticalMapping,
) -> Vec<GroundTruthRecord> {
    annotations
        .iter()
        .flat_map(|annotation| {
            let (bottom, top) = map_vertical(annotation, image_height, mapping);
            annotation.text.chars().map(move |glyph| GroundTruthRecord {
                glyph,
                left: annotation.x1,
                bottom,
                right: annotation.x2,
                top,
                page_index: 0,
            })
        })
        .collect()
}

/// Returns `(bottom, top)` for an annotation
pub fn map_vertical(annotation: &Annotation, image_height: u32, mapping: VerticalMapping) -> (i32, i32) {
    match mapping {
        VerticalMapping::DirectSwap => (annotation.y2, annotation.y1),
        VerticalMapping::HeightFlip => {
            let flip = |y: i32| clamp_to_i32(i64::from(image_height) - i64::from(y));
            (flip(annotation.y2), flip(annotation.y1))
        }
    }
}

/// Out-of-range results saturate at the `i32` bounds
fn clamp_to_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_swap_example() {
        let annotations = vec![Annotation::new(10, 50, 40, 90, "AB")];
        let records = map_annotations(&annotations, 200, VerticalMapping::DirectSwap);

        let lines: Vec<String> = records.iter().map(|r| r.to_string()).collect();
        assert_eq!(lines, vec!["A 10 90 40 50 0", "B 10 90 40 50 0"]);
    }

    #[test]
    fn test_height_flip() {
        let annotations = vec![Annotation::new(10, 50, 40, 90, "A")];
        let records = map_annotations(&annotations, 200, VerticalMapping::HeightFlip);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bottom, 110);
        assert_eq!(records[0].top, 150);
        assert_eq!(records[0].left, 10);
        assert_eq!(records[0].right, 40);
    }

    #[test]
    fn test_height_flip_saturates_extreme_coordinates() {
        let annotations = vec![
            Annotation::new(0, 0, 10, -2_147_483_000, "A"),
            Annotation::new(0, i32::MIN, 10, i32::MAX, "B"),
        ];
        let records = map_annotations(&annotations, 1000, VerticalMapping::HeightFlip);

        assert_eq!(records[0].bottom, i32::MAX);
        assert_eq!(records[0].top, 1000);
        assert_eq!(records[1].bottom, 1000 - i32::MAX);
        assert_eq!(records[1].top, i32::MAX);

        let tall = map_annotations(&[Annotation::new(0, 0, 1, 1, "C")], u32::MAX, VerticalMapping::HeightFlip);
        assert_eq!(tall[0].bottom, i32::MAX);
    }

    #[test]
    fn test_record_count_matches_character_count() {
        let annotations = vec![
            Annotation::new(0, 0, 5, 5, "abc"),
            Annotation::new(0, 0, 5, 5, ""),
            Annotation::new(0, 0, 5, 5, "가나"),
            Annotation::new(0, 0, 5, 5, "z"),
        ];
        let expected: usize = annotations.iter().map(|a| a.text.chars().count()).sum();

        let records = map_annotations(&annotations, 10, VerticalMapping::DirectSwap);
        assert_eq!(records.len(), expected);
        assert_eq!(records.len(), 6);
    }

    #[test]
    fn test_empty_text_yields_no_records() {
        let annotations = vec![Annotation::new(1, 2, 3, 4, "")];
        assert!(map_annotations(&annotations, 10, VerticalMapping::DirectSwap).is_empty());
    }

    #[test]
    fn test_inverted_geometry_passes_through() {
        // y1 > y2 is not corrected
        let annotations = vec![Annotation::new(10, 90, 40, 50, "Q")];
        let records = map_annotations(&annotations, 100, VerticalMapping::DirectSwap);
        assert_eq!(records[0].bottom, 50);
        assert_eq!(records[0].top, 90);
    }

    #[test]
    fn test_glyphs_share_the_annotation_box() {
        let annotations = vec![Annotation::new(3, 4, 30, 40, "xyz")];
        let records = map_annotations(&annotations, 100, VerticalMapping::DirectSwap);
        assert!(records
            .iter()
            .all(|r| (r.left, r.bottom, r.right, r.top) == (3, 40, 30, 4)));
        let glyphs: String = records.iter().map(|r| r.glyph).collect();
        assert_eq!(glyphs, "xyz");
    }
}
