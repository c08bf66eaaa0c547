//! Binarize an extracted region into glyph ink and background.
//!
//! Font strokes are bright with a dark outline over a colored row
//! background. The dark outline and the background merge into one barrier,
//! the region connected to the corner is treated as visible background, and
//! what remains enclosed is ink. No smoothing is applied afterwards; it
//! degrades recognition.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use war_data::Presets;

/// Width of the border band wiped of ink; components reaching it are
/// cropping artifacts, not glyphs.
const BORDER_BAND: u32 = 3;

fn patch_mean(plane: &GrayImage, patch: (u32, u32, u32, u32)) -> f64 {
    let (w, h) = plane.dimensions();
    let (x0, y0, x1, y1) = patch;
    let x1 = x1.min(w);
    let y1 = y1.min(h);
    let x0 = x0.min(x1);
    let y0 = y0.min(y1);
    let mut sum = 0u64;
    let mut count = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            sum += plane.get_pixel(x, y)[0] as u64;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    sum as f64 / count as f64 / 255.0
}

/// Clean a cropped lightness region for recognition. `line` selects the
/// full-width row background patch; small crops sample a corner patch
/// instead. Output: 0 = glyph ink, 255 = background.
pub fn clean_region(crop: &GrayImage, presets: &Presets, line: bool) -> GrayImage {
    let (w, h) = crop.dimensions();
    if w == 0 || h == 0 {
        return crop.clone();
    }

    let outline_upper = (presets.outline_upper * 255.0) as u8;
    let patch = if line { presets.line_bg_patch } else { presets.corner_bg_patch };
    let bg = patch_mean(crop, patch);
    let bg_thresh = ((bg + presets.background_delta(bg)).clamp(0.0, 1.0) * 255.0) as u8;
    debug!("Cleaning region {}x{}: bg {:.3}, threshold {}", w, h, bg, bg_thresh);

    // Dark outline and dark background form one barrier.
    let barrier = GrayImage::from_fn(w, h, |x, y| {
        let v = crop.get_pixel(x, y)[0];
        if v <= outline_upper || v < bg_thresh {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    // Non-barrier pixels connected to the corner are the visible background
    // around the glyphs. On rows brighter than the barrier threshold this is
    // what separates background from enclosed strokes.
    let open = GrayImage::from_fn(w, h, |x, y| {
        if barrier.get_pixel(x, y)[0] == 255 {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    let open_labels = connected_components(&open, Connectivity::Eight, Luma([0u8]));
    let corner_label = open_labels.get_pixel(0, 0)[0];

    // Ink: neither barrier nor corner-connected background.
    let mut ink = GrayImage::from_fn(w, h, |x, y| {
        let in_barrier = barrier.get_pixel(x, y)[0] == 255;
        let in_corner = corner_label != 0 && open_labels.get_pixel(x, y)[0] == corner_label;
        if in_barrier || in_corner {
            Luma([0])
        } else {
            Luma([255])
        }
    });

    // Prune components exceeding the area ratio and components reaching the
    // border band.
    let labels = connected_components(&ink, Connectivity::Eight, Luma([0u8]));
    let max_area = (presets.blob_area_ratio * (w * h) as f64) as u32;
    let mut areas: HashMap<u32, u32> = HashMap::new();
    let mut border_hits: HashSet<u32> = HashSet::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        *areas.entry(label).or_insert(0) += 1;
        if x < BORDER_BAND || x + BORDER_BAND >= w || y < BORDER_BAND || y + BORDER_BAND >= h {
            border_hits.insert(label);
        }
    }
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        let too_big = areas.get(&label).copied().unwrap_or(0) > max_area;
        if too_big || border_hits.contains(&label) {
            ink.put_pixel(x, y, Luma([0]));
        }
    }

    GrayImage::from_fn(w, h, |x, y| {
        if ink.get_pixel(x, y)[0] == 255 {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

/// A cleaned region with no ink at all. An attack sub-row cleaning to pure
/// background means the player did not use that attack.
pub fn is_blank(cleaned: &GrayImage) -> bool {
    cleaned.pixels().all(|p| p[0] == 255)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bg_crop(w: u32, h: u32, bg: u8) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([bg]))
    }

    fn fill(img: &mut GrayImage, x0: u32, x1: u32, y0: u32, y1: u32, v: u8) {
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Luma([v]));
            }
        }
    }

    #[test]
    fn test_bright_stroke_on_dark_row_becomes_ink() {
        // Row background below the adaptive threshold; the bright stroke is
        // the only thing kept.
        let mut crop = bg_crop(40, 20, 180);
        fill(&mut crop, 10, 14, 5, 15, 255);
        let cleaned = clean_region(&crop, &Presets::default(), false);
        assert_eq!(cleaned.get_pixel(11, 8)[0], 0);
        assert_eq!(cleaned.get_pixel(5, 5)[0], 255);
        assert!(!is_blank(&cleaned));
    }

    #[test]
    fn test_large_blob_is_pruned() {
        let mut crop = bg_crop(40, 20, 180);
        // 120 px, above the 6% area ratio for a 40x20 crop.
        fill(&mut crop, 6, 16, 4, 16, 255);
        let cleaned = clean_region(&crop, &Presets::default(), false);
        assert!(is_blank(&cleaned));
    }

    #[test]
    fn test_border_touching_component_is_pruned() {
        let mut crop = bg_crop(40, 20, 180);
        fill(&mut crop, 0, 4, 8, 12, 255);
        let cleaned = clean_region(&crop, &Presets::default(), false);
        assert!(is_blank(&cleaned));
    }

    #[test]
    fn test_bright_background_kept_out_by_corner_fill() {
        // Background brighter than its threshold stays open; only the
        // stroke enclosed by the dark outline survives.
        let mut crop = bg_crop(40, 20, 240);
        fill(&mut crop, 8, 16, 6, 14, 30); // outline ring
        fill(&mut crop, 10, 14, 8, 12, 255); // stroke
        let cleaned = clean_region(&crop, &Presets::default(), false);
        assert_eq!(cleaned.get_pixel(11, 9)[0], 0);
        assert_eq!(cleaned.get_pixel(2, 2)[0], 255);
        assert_eq!(cleaned.get_pixel(9, 7)[0], 255); // outline is not ink
    }

    #[test]
    fn test_blank_region_stays_blank() {
        let crop = bg_crop(40, 20, 180);
        let cleaned = clean_region(&crop, &Presets::default(), false);
        assert!(is_blank(&cleaned));
    }
}
