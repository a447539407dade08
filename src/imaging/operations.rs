//! High-level image operations.
//!
//! These functions combine the cache key, the dimension calculations and
//! the codec. Each takes a resolved source path and returns the artifact a
//! markup value should point at, producing it first if it does not exist.
//!
//! The existence of the output file is the only cache check: a present file
//! is trusted and neither the codec nor a write is issued for it.

use super::calculations::{center_square, clamp_crop, calculate_target_dimensions, select_icon_size};
use super::codec::{CodecError, ImageCodec, SourceFormat};
use super::params::{CropBox, TransformParams};
use crate::cache::cache_key_for_path;
use crate::storage::{Storage, StorageError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Image processing failed for {path}: {source}")]
    Codec { path: PathBuf, source: CodecError },
    #[error("Crop {crop} starts outside {path} ({width}x{height})")]
    CropOutsideImage {
        path: PathBuf,
        crop: CropBox,
        width: u32,
        height: u32,
    },
    #[error("Not a recognized image file: {0}")]
    UnknownFormat(PathBuf),
    #[error("No icon sizes configured for {0}")]
    NoIconSizes(PathBuf),
}

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// How an artifact came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// Already present from an earlier run.
    Cached,
    /// Produced by the codec.
    Transformed,
    /// Source bytes written unchanged.
    Copied,
}

/// A published output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Content-addressed name, also the last segment of `path`.
    pub file_name: String,
    pub path: PathBuf,
    pub status: ArtifactStatus,
}

/// One square icon size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconVariant {
    pub size: u32,
    pub artifact: Artifact,
}

/// Everything produced for an icon source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconSet {
    /// SVG icons scale on their own and are published once.
    Vector(Artifact),
    Raster(Vec<IconVariant>),
}

impl IconSet {
    /// The artifact a value should reference: `preferred` if it was
    /// generated, else the largest size.
    pub fn select(&self, preferred: Option<u32>) -> Option<&Artifact> {
        match self {
            IconSet::Vector(artifact) => Some(artifact),
            IconSet::Raster(variants) => {
                let sizes: Vec<u32> = variants.iter().map(|v| v.size).collect();
                let size = select_icon_size(&sizes, preferred)?;
                variants
                    .iter()
                    .find(|v| v.size == size)
                    .map(|v| &v.artifact)
            }
        }
    }

    pub fn artifacts(&self) -> Vec<&Artifact> {
        match self {
            IconSet::Vector(artifact) => vec![artifact],
            IconSet::Raster(variants) => variants.iter().map(|v| &v.artifact).collect(),
        }
    }
}

fn source_format(source: &Path) -> Result<SourceFormat> {
    SourceFormat::from_path(source).ok_or_else(|| TransformError::UnknownFormat(source.to_path_buf()))
}

fn codec_err(source: &Path) -> impl Fn(CodecError) -> TransformError + '_ {
    move |e| TransformError::Codec {
        path: source.to_path_buf(),
        source: e,
    }
}

/// Publish `source` under `output_dir` with `params` applied.
///
/// SVG sources are copied unchanged. AVIF sources are copied unchanged when
/// no pixel work is requested. Everything else is decoded, optionally
/// cropped, resized, grayscaled and blurred (in that order), then encoded in
/// the source's own format.
pub fn materialize<C: ImageCodec, S: Storage + ?Sized>(
    codec: &C,
    storage: &S,
    source: &Path,
    output_dir: &Path,
    params: &TransformParams,
) -> Result<Artifact> {
    let format = source_format(source)?;
    let bytes = storage.read_bytes(source)?;
    let file_name = cache_key_for_path(source, &bytes, params, format.is_vector());
    let path = storage.join(output_dir, &file_name);

    if storage.exists(&path) {
        tracing::debug!(file = %file_name, "Cache hit");
        return Ok(Artifact {
            file_name,
            path,
            status: ArtifactStatus::Cached,
        });
    }

    let copy_verbatim =
        format.is_vector() || (format == SourceFormat::Avif && !params.needs_raster_work());
    let (output, status) = if copy_verbatim {
        (bytes, ArtifactStatus::Copied)
    } else {
        (
            render(codec, source, &bytes, format, params)?,
            ArtifactStatus::Transformed,
        )
    };

    tracing::debug!(file = %file_name, source = %source.display(), ?status, "Cache miss");
    storage.write_bytes(&path, &output)?;
    Ok(Artifact {
        file_name,
        path,
        status,
    })
}

fn render<C: ImageCodec>(
    codec: &C,
    source: &Path,
    bytes: &[u8],
    format: SourceFormat,
    params: &TransformParams,
) -> Result<Vec<u8>> {
    let err = codec_err(source);
    let mut image = codec.decode(bytes).map_err(&err)?;
    let mut native = codec.dimensions(&image).as_tuple();

    if let Some(crop) = params.crop {
        let region = clamp_crop(crop, native).ok_or_else(|| TransformError::CropOutsideImage {
            path: source.to_path_buf(),
            crop,
            width: native.0,
            height: native.1,
        })?;
        image = codec.crop(image, region).map_err(&err)?;
        native = (region.width, region.height);
    }

    let (width, height) = calculate_target_dimensions(native, params.width, params.height);
    if (width, height) != native {
        image = codec.resize(image, width, height).map_err(&err)?;
    }
    if params.grayscale {
        image = codec.grayscale(image).map_err(&err)?;
    }
    if let Some(sigma) = params.blur {
        image = codec.blur(image, sigma).map_err(&err)?;
    }

    codec.encode(&image, format).map_err(&err)
}

/// Publish an icon source under `icons_dir` at every size in `sizes`.
///
/// Raster sources are center-cropped to a square once and resized to each
/// missing size. Sizes already on storage are reported as cached, and when
/// every size is present the source is never decoded.
pub fn create_icons<C: ImageCodec, S: Storage + ?Sized>(
    codec: &C,
    storage: &S,
    source: &Path,
    icons_dir: &Path,
    sizes: &[u32],
) -> Result<IconSet> {
    let format = source_format(source)?;
    if format.is_vector() {
        let artifact = materialize(codec, storage, source, icons_dir, &TransformParams::default())?;
        return Ok(IconSet::Vector(artifact));
    }
    if sizes.is_empty() {
        return Err(TransformError::NoIconSizes(source.to_path_buf()));
    }

    let bytes = storage.read_bytes(source)?;
    let planned: Vec<(u32, String, PathBuf, bool)> = sizes
        .iter()
        .map(|&size| {
            let name = cache_key_for_path(source, &bytes, &TransformParams::square(size), false);
            let path = storage.join(icons_dir, &name);
            let present = storage.exists(&path);
            (size, name, path, present)
        })
        .collect();

    let err = codec_err(source);
    let square = if planned.iter().any(|(_, _, _, present)| !present) {
        let image = codec.decode(&bytes).map_err(&err)?;
        let region = center_square(codec.dimensions(&image).as_tuple());
        Some(codec.crop(image, region).map_err(&err)?)
    } else {
        None
    };

    let mut variants = Vec::with_capacity(planned.len());
    for (size, file_name, path, present) in planned {
        let status = match (&square, present) {
            (Some(base), false) => {
                let resized = codec.resize(base.clone(), size, size).map_err(&err)?;
                let output = codec.encode(&resized, format).map_err(&err)?;
                tracing::debug!(file = %file_name, size, "Generated icon");
                storage.write_bytes(&path, &output)?;
                ArtifactStatus::Transformed
            }
            _ => ArtifactStatus::Cached,
        };
        variants.push(IconVariant {
            size,
            artifact: Artifact {
                file_name,
                path,
                status,
            },
        });
    }

    Ok(IconSet::Raster(variants))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::calculations::Region;
    use crate::imaging::codec::tests::{MockCodec, RecordedOp};
    use crate::storage::tests::MemoryStorage;

    const PHOTO: &str = "/site/img/sample-photo.jpg";

    fn out_dir() -> &'static Path {
        Path::new("/dist/images")
    }

    fn photo_storage() -> MemoryStorage {
        MemoryStorage::with_files(&[(PHOTO, b"jpeg bytes")])
    }

    // =========================================================================
    // materialize
    // =========================================================================

    #[test]
    fn crop_then_resize_preserves_crop_ratio() {
        let codec = MockCodec::with_dimensions(1000, 667);
        let storage = photo_storage();
        let params = TransformParams {
            width: Some(200),
            crop: Some(CropBox::new(250, 0, 500, 667)),
            ..TransformParams::default()
        };

        let artifact = materialize(&codec, &storage, Path::new(PHOTO), out_dir(), &params).unwrap();

        assert_eq!(artifact.status, ArtifactStatus::Transformed);
        assert!(artifact.file_name.starts_with("sample-photo."));
        assert!(artifact.file_name.ends_with(".200w.jpg"));
        assert_eq!(artifact.path, out_dir().join(&artifact.file_name));
        assert_eq!(
            codec.get_operations(),
            vec![
                RecordedOp::Decode(10),
                RecordedOp::Crop(Region {
                    x: 250,
                    y: 0,
                    width: 250,
                    height: 667
                }),
                RecordedOp::Resize {
                    width: 200,
                    height: 534
                },
                RecordedOp::Encode(SourceFormat::Jpeg),
            ]
        );
        assert_eq!(
            storage.get(artifact.path.to_str().unwrap()).unwrap(),
            b"200x534"
        );
    }

    #[test]
    fn second_call_is_cache_hit_without_codec() {
        let codec = MockCodec::with_dimensions(400, 200);
        let storage = photo_storage();
        let params = TransformParams {
            width: Some(100),
            ..TransformParams::default()
        };

        let first = materialize(&codec, &storage, Path::new(PHOTO), out_dir(), &params).unwrap();
        let ops_after_first = codec.get_operations().len();
        let writes_after_first = storage.write_count();

        let second = materialize(&codec, &storage, Path::new(PHOTO), out_dir(), &params).unwrap();

        assert_eq!(second.status, ArtifactStatus::Cached);
        assert_eq!(second.path, first.path);
        assert_eq!(codec.get_operations().len(), ops_after_first);
        assert_eq!(storage.write_count(), writes_after_first);
    }

    #[test]
    fn width_only_keeps_aspect_ratio() {
        let codec = MockCodec::with_dimensions(400, 200);
        let storage = photo_storage();
        let params = TransformParams {
            width: Some(100),
            ..TransformParams::default()
        };
        materialize(&codec, &storage, Path::new(PHOTO), out_dir(), &params).unwrap();
        assert!(codec.get_operations().contains(&RecordedOp::Resize {
            width: 100,
            height: 50
        }));
    }

    #[test]
    fn no_resize_when_target_equals_native() {
        let codec = MockCodec::with_dimensions(640, 480);
        let storage = photo_storage();
        let params = TransformParams {
            width: Some(640),
            grayscale: true,
            blur: Some(2.0),
            ..TransformParams::default()
        };
        materialize(&codec, &storage, Path::new(PHOTO), out_dir(), &params).unwrap();
        assert_eq!(
            codec.get_operations(),
            vec![
                RecordedOp::Decode(10),
                RecordedOp::Grayscale,
                RecordedOp::Blur(2.0),
                RecordedOp::Encode(SourceFormat::Jpeg),
            ]
        );
    }

    #[test]
    fn svg_copied_verbatim() {
        let codec = MockCodec::with_dimensions(10, 10);
        let storage = MemoryStorage::with_files(&[("/site/logo.svg", b"<svg/>")]);
        let params = TransformParams {
            width: Some(50),
            ..TransformParams::default()
        };

        let artifact =
            materialize(&codec, &storage, Path::new("/site/logo.svg"), out_dir(), &params).unwrap();

        assert_eq!(artifact.status, ArtifactStatus::Copied);
        assert!(!artifact.file_name.contains(".50w"));
        assert!(codec.get_operations().is_empty());
        assert_eq!(storage.get(artifact.path.to_str().unwrap()).unwrap(), b"<svg/>");
    }

    #[test]
    fn avif_without_pixel_work_copied() {
        let codec = MockCodec::with_dimensions(10, 10);
        let storage = MemoryStorage::with_files(&[("/site/a.avif", b"avif")]);
        let artifact = materialize(
            &codec,
            &storage,
            Path::new("/site/a.avif"),
            out_dir(),
            &TransformParams::default(),
        )
        .unwrap();
        assert_eq!(artifact.status, ArtifactStatus::Copied);
        assert!(codec.get_operations().is_empty());
    }

    #[test]
    fn crop_outside_image_fails() {
        let codec = MockCodec::with_dimensions(100, 100);
        let storage = photo_storage();
        let params = TransformParams {
            crop: Some(CropBox::new(200, 0, 300, 50)),
            ..TransformParams::default()
        };
        let result = materialize(&codec, &storage, Path::new(PHOTO), out_dir(), &params);
        assert!(matches!(
            result,
            Err(TransformError::CropOutsideImage {
                width: 100,
                height: 100,
                ..
            })
        ));
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn decode_failure_names_source() {
        let codec = MockCodec::failing();
        let storage = photo_storage();
        let err = materialize(
            &codec,
            &storage,
            Path::new(PHOTO),
            out_dir(),
            &TransformParams::default(),
        )
        .unwrap_err();
        match err {
            TransformError::Codec { path, .. } => assert_eq!(path, PathBuf::from(PHOTO)),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(storage.write_count(), 0);
    }

    #[test]
    fn missing_source_is_storage_error() {
        let codec = MockCodec::with_dimensions(10, 10);
        let storage = MemoryStorage::new();
        let result = materialize(
            &codec,
            &storage,
            Path::new("/site/gone.png"),
            out_dir(),
            &TransformParams::default(),
        );
        assert!(matches!(result, Err(TransformError::Storage(_))));
    }

    // =========================================================================
    // create_icons
    // =========================================================================

    const ICON: &str = "/site/favicon.png";

    fn icon_dir() -> &'static Path {
        Path::new("/dist/icons")
    }

    #[test]
    fn icons_decode_once_and_fan_out() {
        let codec = MockCodec::with_dimensions(800, 600);
        let storage = MemoryStorage::with_files(&[(ICON, b"png")]);

        let set = create_icons(&codec, &storage, Path::new(ICON), icon_dir(), &[16, 32]).unwrap();

        assert_eq!(
            codec.get_operations(),
            vec![
                RecordedOp::Decode(3),
                RecordedOp::Crop(Region {
                    x: 100,
                    y: 0,
                    width: 600,
                    height: 600
                }),
                RecordedOp::Resize {
                    width: 16,
                    height: 16
                },
                RecordedOp::Encode(SourceFormat::Png),
                RecordedOp::Resize {
                    width: 32,
                    height: 32
                },
                RecordedOp::Encode(SourceFormat::Png),
            ]
        );
        let artifacts = set.artifacts();
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts[0].file_name.ends_with(".16w.16h.png"));
        assert!(artifacts[1].file_name.ends_with(".32w.32h.png"));
        assert!(artifacts.iter().all(|a| a.path.starts_with(icon_dir())));
    }

    #[test]
    fn icons_all_cached_skip_decode() {
        let codec = MockCodec::with_dimensions(64, 64);
        let storage = MemoryStorage::with_files(&[(ICON, b"png")]);
        create_icons(&codec, &storage, Path::new(ICON), icon_dir(), &[16, 32]).unwrap();
        let ops = codec.get_operations().len();

        let set = create_icons(&codec, &storage, Path::new(ICON), icon_dir(), &[16, 32]).unwrap();

        assert_eq!(codec.get_operations().len(), ops);
        assert!(set.artifacts().iter().all(|a| a.status == ArtifactStatus::Cached));
    }

    #[test]
    fn icons_only_missing_sizes_generated() {
        let codec = MockCodec::with_dimensions(64, 64);
        let storage = MemoryStorage::with_files(&[(ICON, b"png")]);
        create_icons(&codec, &storage, Path::new(ICON), icon_dir(), &[16]).unwrap();

        let codec = MockCodec::with_dimensions(64, 64);
        let set = create_icons(&codec, &storage, Path::new(ICON), icon_dir(), &[16, 48]).unwrap();

        let resizes: Vec<_> = codec
            .get_operations()
            .into_iter()
            .filter(|op| matches!(op, RecordedOp::Resize { .. }))
            .collect();
        assert_eq!(
            resizes,
            vec![RecordedOp::Resize {
                width: 48,
                height: 48
            }]
        );
        let statuses: Vec<_> = set.artifacts().iter().map(|a| a.status).collect();
        assert_eq!(
            statuses,
            vec![ArtifactStatus::Cached, ArtifactStatus::Transformed]
        );
    }

    #[test]
    fn svg_icon_copied_once() {
        let codec = MockCodec::with_dimensions(1, 1);
        let storage = MemoryStorage::with_files(&[("/site/icon.svg", b"<svg/>")]);
        let set = create_icons(&codec, &storage, Path::new("/site/icon.svg"), icon_dir(), &[16, 32])
            .unwrap();
        assert!(matches!(set, IconSet::Vector(ref a) if a.status == ArtifactStatus::Copied));
        assert!(codec.get_operations().is_empty());
        assert_eq!(storage.write_count(), 1);
    }

    #[test]
    fn icons_require_sizes() {
        let codec = MockCodec::with_dimensions(1, 1);
        let storage = MemoryStorage::with_files(&[(ICON, b"png")]);
        let result = create_icons(&codec, &storage, Path::new(ICON), icon_dir(), &[]);
        assert!(matches!(result, Err(TransformError::NoIconSizes(_))));
    }

    #[test]
    fn icon_set_selects_preferred_or_largest() {
        let codec = MockCodec::with_dimensions(64, 64);
        let storage = MemoryStorage::with_files(&[(ICON, b"png")]);
        let set = create_icons(&codec, &storage, Path::new(ICON), icon_dir(), &[16, 180, 32]).unwrap();

        let chosen = set.select(Some(32)).unwrap();
        assert!(chosen.file_name.ends_with(".32w.32h.png"));
        let chosen = set.select(Some(99)).unwrap();
        assert!(chosen.file_name.ends_with(".180w.180h.png"));
    }
}
