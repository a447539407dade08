//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. The
//! [`reference`](crate::reference) parser produces them from the text of a
//! markup value, the [`cache`](crate::cache) module folds them into output
//! names, and [`operations`](super::operations) turns them into codec calls.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`CropBox`]: Corner-to-corner crop rectangle `(x1, y1)-(x2, y2)`.
//! - [`TransformParams`]: Everything a reference may ask for: size, crop, grayscale, blur, color tweaks.

use std::fmt;

/// Largest width or height an output image may have.
pub const MAX_DIMENSION: u32 = 16_384;

/// Largest Gaussian blur sigma accepted.
pub const MAX_BLUR_RADIUS: f32 = 1000.0;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// A crop rectangle given by its top-left and bottom-right corners.
///
/// Construction does not validate; [`CropBox::is_valid`] holds the ordering
/// rule the parser enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Bottom-right must lie strictly below and right of top-left, and
    /// neither bottom-right coordinate may be zero.
    pub fn is_valid(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1 && self.x2 != 0 && self.y2 != 0
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }
}

impl fmt::Display for CropBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})-({},{})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Transform requested by a single image reference.
///
/// All fields are optional; the default value means "publish the source
/// unchanged". `hue`, `saturation` and `lightness` are accepted by the
/// parser and carried along but no codec operation consumes them yet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransformParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub crop: Option<CropBox>,
    pub grayscale: bool,
    pub blur: Option<f32>,
    pub hue: Option<f32>,
    pub saturation: Option<f32>,
    pub lightness: Option<f32>,
}

impl TransformParams {
    /// Parameters for one square icon variant.
    pub fn square(size: u32) -> Self {
        Self {
            width: Some(size),
            height: Some(size),
            ..Self::default()
        }
    }

    /// True when decoding is required to honor these parameters.
    pub fn needs_raster_work(&self) -> bool {
        self.width.is_some()
            || self.height.is_some()
            || self.crop.is_some()
            || self.grayscale
            || self.blur.is_some()
    }
}
