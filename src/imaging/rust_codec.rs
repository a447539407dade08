//! Pure Rust codec built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (GIF, PNG, JPEG, WebP, BMP) | `image::load_from_memory` |
//! | Crop | `DynamicImage::crop_imm` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Grayscale | `DynamicImage::grayscale` |
//! | Gaussian blur | `DynamicImage::blur` |
//! | Encode JPEG | `JpegEncoder::new_with_quality` |
//! | Encode PNG/GIF/WebP/BMP | `DynamicImage::write_to` |
//!
//! AVIF is not decodable with the compiled-in features, and SVG is never
//! rasterized; both report [`CodecError::Unsupported`].

use super::calculations::Region;
use super::codec::{CodecError, Dimensions, ImageCodec, SourceFormat};
use super::params::{MAX_BLUR_RADIUS, MAX_DIMENSION, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Resampling filter used for every resize.
const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Pure Rust codec using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCodec {
    quality: Quality,
}

impl RustCodec {
    pub fn new(quality: Quality) -> Self {
        Self { quality }
    }
}

fn raster_format(format: SourceFormat) -> Result<ImageFormat, CodecError> {
    match format {
        SourceFormat::Gif => Ok(ImageFormat::Gif),
        SourceFormat::Png => Ok(ImageFormat::Png),
        SourceFormat::Jpeg => Ok(ImageFormat::Jpeg),
        SourceFormat::WebP => Ok(ImageFormat::WebP),
        SourceFormat::Bmp => Ok(ImageFormat::Bmp),
        SourceFormat::Avif => Err(CodecError::Unsupported("avif".to_string())),
        SourceFormat::Svg => Err(CodecError::Unsupported("svg".to_string())),
    }
}

impl ImageCodec for RustCodec {
    type Image = DynamicImage;

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, CodecError> {
        image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn dimensions(&self, image: &DynamicImage) -> Dimensions {
        Dimensions {
            width: image.width(),
            height: image.height(),
        }
    }

    fn crop(&self, image: DynamicImage, region: Region) -> Result<DynamicImage, CodecError> {
        if region.width == 0 || region.height == 0 {
            return Err(CodecError::ProcessingFailed(format!(
                "empty crop region {}x{}",
                region.width, region.height
            )));
        }
        Ok(image.crop_imm(region.x, region.y, region.width, region.height))
    }

    fn resize(
        &self,
        image: DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, CodecError> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(CodecError::ProcessingFailed(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        Ok(image.resize_exact(width, height, RESIZE_FILTER))
    }

    fn grayscale(&self, image: DynamicImage) -> Result<DynamicImage, CodecError> {
        Ok(image.grayscale())
    }

    fn blur(&self, image: DynamicImage, sigma: f32) -> Result<DynamicImage, CodecError> {
        if !sigma.is_normal() || sigma < 0.0 || sigma > MAX_BLUR_RADIUS {
            return Err(CodecError::ProcessingFailed(format!(
                "blur sigma {sigma} out of range"
            )));
        }
        Ok(image.blur(sigma))
    }

    fn encode(&self, image: &DynamicImage, format: SourceFormat) -> Result<Vec<u8>, CodecError> {
        let target = raster_format(format)?;
        let mut buf = Vec::new();

        match target {
            ImageFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut buf, self.quality.value() as u8);
                rgb.write_with_encoder(encoder)
                    .map_err(|e| CodecError::Encode(format!("JPEG: {e}")))?;
            }
            ImageFormat::Png => {
                image
                    .write_to(&mut Cursor::new(&mut buf), target)
                    .map_err(|e| CodecError::Encode(format!("PNG: {e}")))?;
            }
            _ => {
                // GIF, WebP and BMP encoders only take 8-bit color
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                rgba.write_to(&mut Cursor::new(&mut buf), target)
                    .map_err(|e| CodecError::Encode(format!("{target:?}: {e}")))?;
            }
        }

        Ok(buf)
    }
}
