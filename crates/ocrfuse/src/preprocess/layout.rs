//! Contour-based layout analysis.
//!
//! Classifies large connected regions of a binarized page into tables,
//! images, and text blocks using fixed area and aspect-ratio thresholds.
//! This is structural hinting, not ground truth: the classifier attaches a
//! fixed per-class confidence rather than a measured score.

use crate::core::config::LayoutConfig;
use crate::types::{BoundingBox, LayoutBlock, LayoutInfo};
use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};

/// Analyze the layout of a binarized image.
///
/// Expects dark ink on a light background (the output of
/// [`normalize`](super::normalize) or a plain grayscale page).
pub fn analyze_layout(image: &GrayImage, config: &LayoutConfig) -> LayoutInfo {
    // find_contours wants bright foreground on black; pages are the opposite.
    let inverted = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let Luma([v]) = *image.get_pixel(x, y);
        Luma([u8::MAX - v])
    });

    let mut layout = LayoutInfo::default();

    for contour in find_contours::<i32>(&inverted) {
        if contour.border_type != BorderType::Outer {
            continue;
        }
        let Some(bbox) = bounding_box(&contour.points) else {
            continue;
        };
        if bbox.area() < config.min_block_area {
            continue;
        }

        let aspect = bbox.aspect_ratio();
        if aspect > config.image_aspect_min && aspect < config.image_aspect_max {
            layout.images.push(LayoutBlock {
                bbox,
                confidence: config.image_confidence,
            });
        } else if aspect > config.table_aspect_min {
            layout.tables.push(LayoutBlock {
                bbox,
                confidence: config.table_confidence,
            });
        } else {
            layout.text_blocks.push(LayoutBlock {
                bbox,
                confidence: config.text_confidence,
            });
        }
    }

    // Contour discovery order depends on scan internals; sort for stable output.
    for blocks in [
        &mut layout.tables,
        &mut layout.images,
        &mut layout.text_blocks,
    ] {
        blocks.sort_by_key(|b| (b.bbox.y, b.bbox.x));
    }

    layout.columns = detect_columns(&layout.text_blocks, config);
    layout
}

fn bounding_box(points: &[imageproc::point::Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox::new(
        min_x.max(0) as u32,
        min_y.max(0) as u32,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    ))
}

/// Text blocks that sit side by side with substantial vertical overlap are
/// reported as columns.
fn detect_columns(text_blocks: &[LayoutBlock], config: &LayoutConfig) -> Vec<LayoutBlock> {
    let mut in_column = vec![false; text_blocks.len()];

    for i in 0..text_blocks.len() {
        for j in (i + 1)..text_blocks.len() {
            let (a, b) = (&text_blocks[i].bbox, &text_blocks[j].bbox);
            let horizontally_disjoint = a.x + a.width <= b.x || b.x + b.width <= a.x;
            if !horizontally_disjoint {
                continue;
            }

            let overlap_top = a.y.max(b.y);
            let overlap_bottom = (a.y + a.height).min(b.y + b.height);
            if overlap_bottom <= overlap_top {
                continue;
            }
            let overlap = (overlap_bottom - overlap_top) as f64;
            let shorter = a.height.min(b.height).max(1) as f64;
            if overlap / shorter >= 0.5 {
                in_column[i] = true;
                in_column[j] = true;
            }
        }
    }

    text_blocks
        .iter()
        .zip(&in_column)
        .filter(|(_, flagged)| **flagged)
        .map(|(block, _)| LayoutBlock {
            bbox: block.bbox,
            confidence: config.column_confidence,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White page with filled dark rectangles.
    fn page(rects: &[(u32, u32, u32, u32)]) -> GrayImage {
        GrayImage::from_fn(640, 480, |x, y| {
            for &(rx, ry, rw, rh) in rects {
                if x >= rx && x < rx + rw && y >= ry && y < ry + rh {
                    return Luma([0u8]);
                }
            }
            Luma([u8::MAX])
        })
    }

    #[test]
    fn test_small_regions_ignored() {
        let image = page(&[(10, 10, 20, 20)]);
        let layout = analyze_layout(&image, &LayoutConfig::default());
        assert!(layout.is_empty());
    }

    #[test]
    fn test_square_block_classified_as_image() {
        let image = page(&[(50, 50, 150, 150)]);
        let layout = analyze_layout(&image, &LayoutConfig::default());
        assert_eq!(layout.images.len(), 1);
        assert!(layout.tables.is_empty());
        assert!(layout.text_blocks.is_empty());
        assert_eq!(layout.images[0].confidence, 0.7);
    }

    #[test]
    fn test_wide_block_classified_as_table() {
        let image = page(&[(20, 40, 500, 90)]);
        let layout = analyze_layout(&image, &LayoutConfig::default());
        assert_eq!(layout.tables.len(), 1);
        assert_eq!(layout.tables[0].confidence, 0.6);
        let bbox = layout.tables[0].bbox;
        assert_eq!((bbox.x, bbox.y), (20, 40));
        assert_eq!((bbox.width, bbox.height), (500, 90));
    }

    #[test]
    fn test_moderate_block_classified_as_text() {
        // Aspect ratio 2.0: neither square-ish nor table-wide.
        let image = page(&[(30, 60, 240, 120)]);
        let layout = analyze_layout(&image, &LayoutConfig::default());
        assert_eq!(layout.text_blocks.len(), 1);
        assert_eq!(layout.text_blocks[0].confidence, 0.8);
    }

    #[test]
    fn test_layout_is_deterministic() {
        let image = page(&[(30, 60, 240, 120), (50, 250, 150, 150), (20, 420, 400, 50)]);
        let config = LayoutConfig::default();
        let a = analyze_layout(&image, &config);
        let b = analyze_layout(&image, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_blocks_sorted_by_position() {
        let image = page(&[(30, 300, 240, 100), (30, 60, 240, 100)]);
        let layout = analyze_layout(&image, &LayoutConfig::default());
        assert_eq!(layout.text_blocks.len(), 2);
        assert!(layout.text_blocks[0].bbox.y < layout.text_blocks[1].bbox.y);
    }

    #[test]
    fn test_side_by_side_text_blocks_reported_as_columns() {
        let image = page(&[(20, 60, 200, 300), (300, 60, 200, 300)]);
        let layout = analyze_layout(&image, &LayoutConfig::default());
        assert_eq!(layout.text_blocks.len(), 2);
        assert_eq!(layout.columns.len(), 2);
    }

    #[test]
    fn test_stacked_text_blocks_are_not_columns() {
        let image = page(&[(30, 60, 240, 100), (30, 300, 240, 100)]);
        let layout = analyze_layout(&image, &LayoutConfig::default());
        assert!(layout.columns.is_empty());
    }
}
