//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::CropBox;

/// A pixel region `(x, y, width, height)` inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Calculate the output dimensions for a resize request.
///
/// # Arguments
/// * `native` - Dimensions of the image being resized (after any crop)
/// * `width` - Requested width, if any
/// * `height` - Requested height, if any
///
/// # Returns
/// * `(width, height)` - Only one side set: the other follows the native
///   aspect ratio. Both set: used as-is. Neither: native dimensions.
///
/// # Examples
/// ```
/// # use img_rewrite::imaging::calculate_target_dimensions;
/// // 400x200 source, width 100 → 100x50
/// assert_eq!(calculate_target_dimensions((400, 200), Some(100), None), (100, 50));
///
/// // Both sides requested → exact, ratio not preserved
/// assert_eq!(calculate_target_dimensions((400, 200), Some(100), Some(100)), (100, 100));
/// ```
pub fn calculate_target_dimensions(
    native: (u32, u32),
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    let (native_w, native_h) = native;
    let ratio = native_w as f64 / native_h.max(1) as f64;

    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => {
            let h = (w as f64 / ratio).round() as u32;
            (w, h.max(1))
        }
        (None, Some(h)) => {
            let w = (h as f64 * ratio).round() as u32;
            (w.max(1), h)
        }
        (None, None) => native,
    }
}

/// Fit a crop rectangle inside an image.
///
/// The bottom-right corner is clamped to the image bounds. Returns `None`
/// when the top-left corner already lies outside the image, leaving nothing
/// to crop.
pub fn clamp_crop(crop: CropBox, native: (u32, u32)) -> Option<Region> {
    let (native_w, native_h) = native;
    if crop.x1 >= native_w || crop.y1 >= native_h {
        return None;
    }
    let x2 = crop.x2.min(native_w);
    let y2 = crop.y2.min(native_h);
    Some(Region {
        x: crop.x1,
        y: crop.y1,
        width: x2 - crop.x1,
        height: y2 - crop.y1,
    })
}

/// Largest centered square inside an image.
///
/// Used for icons: the longer edge is trimmed equally on both sides.
pub fn center_square(native: (u32, u32)) -> Region {
    let (native_w, native_h) = native;
    let side = native_w.min(native_h);
    Region {
        x: (native_w - side) / 2,
        y: (native_h - side) / 2,
        width: side,
        height: side,
    }
}

/// Pick the icon size a rewritten value should point at.
///
/// A preferred size (from a link's `sizes` attribute) wins when it is one of
/// the generated sizes; otherwise the largest generated size is used.
pub fn select_icon_size(sizes: &[u32], preferred: Option<u32>) -> Option<u32> {
    if let Some(p) = preferred
        && sizes.contains(&p)
    {
        return Some(p);
    }
    sizes.iter().copied().max()
}
