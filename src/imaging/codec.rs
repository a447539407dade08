//! Image codec trait and shared types.
//!
//! The [`ImageCodec`] trait is the boundary to pixel work: decode a byte
//! buffer, crop/resize/grayscale/blur the decoded image, encode it back to
//! bytes. Nothing above this trait touches pixels.
//!
//! The production implementation is
//! [`RustCodec`](super::rust_codec::RustCodec), built on the `image` crate.
//! A codec is constructed by the caller and passed down explicitly; there is
//! no process-wide codec handle.

use super::calculations::Region;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Unsupported format: {0}")]
    Unsupported(String),
}

/// Result of a dimensions query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Image formats a reference can resolve to, one per recognized extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Gif,
    Png,
    Jpeg,
    WebP,
    Avif,
    Bmp,
    Svg,
}

impl SourceFormat {
    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "gif" => Some(Self::Gif),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "avif" => Some(Self::Avif),
            "bmp" => Some(Self::Bmp),
            "svg" => Some(Self::Svg),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Vector sources are published byte-for-byte, never rasterized.
    pub fn is_vector(self) -> bool {
        self == Self::Svg
    }
}

/// Trait for image codecs.
///
/// Transform methods take the image by value and return the result so an
/// implementation may work in place. `Sync` so one codec can be shared by
/// every rayon worker.
pub trait ImageCodec: Sync {
    /// Decoded image handle. Cloned when one decode feeds several outputs.
    type Image: Send + Clone;

    /// Decode raw file bytes.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Image, CodecError>;

    /// Native width and height of a decoded image.
    fn dimensions(&self, image: &Self::Image) -> Dimensions;

    /// Cut a region out of the image.
    fn crop(&self, image: Self::Image, region: Region) -> Result<Self::Image, CodecError>;

    /// Resize to exact dimensions with the codec's fixed resampling filter.
    fn resize(&self, image: Self::Image, width: u32, height: u32)
    -> Result<Self::Image, CodecError>;

    /// Convert to grayscale.
    fn grayscale(&self, image: Self::Image) -> Result<Self::Image, CodecError>;

    /// Gaussian blur with the given radius (sigma).
    fn blur(&self, image: Self::Image, sigma: f32) -> Result<Self::Image, CodecError>;

    /// Encode to bytes in the given format.
    fn encode(&self, image: &Self::Image, format: SourceFormat) -> Result<Vec<u8>, CodecError>;
}
