//! Image processing behind a swappable codec.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` |
//! | **Crop** | `crop_imm` |
//! | **Resize** | Lanczos3 `resize_exact` |
//! | **Grayscale / blur** | `grayscale`, `blur` |
//! | **Encode** | per-format encoder, same format as the source |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and crop math (unit testable)
//! - **Parameters**: Data structures describing a requested transform
//! - **Codec**: [`ImageCodec`] trait + [`RustCodec`]
//! - **Operations**: [`materialize`] and [`create_icons`], combining the cache key, calculations and codec

mod calculations;
pub mod codec;
pub mod operations;
mod params;
pub mod rust_codec;

pub use calculations::{Region, calculate_target_dimensions, center_square, clamp_crop, select_icon_size};
pub use codec::{CodecError, Dimensions, ImageCodec, SourceFormat};
pub use operations::{
    Artifact, ArtifactStatus, IconSet, IconVariant, TransformError, create_icons, materialize,
};
pub use params::{CropBox, MAX_BLUR_RADIUS, MAX_DIMENSION, Quality, TransformParams};
pub use rust_codec::RustCodec;
