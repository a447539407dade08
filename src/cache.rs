//! Content-addressed output names.
//!
//! Every transformed image is published under a name derived from the bytes
//! of its source and the transform applied to it. The output directory is
//! the cache: if a file with the derived name already exists, the work was
//! done by an earlier run and is skipped. There is no manifest to load or
//! save, and nothing is ever evicted.
//!
//! ## Key format
//!
//! ```text
//! <stem>.<checksum36>[.{w}w][.{h}h][.g][.{blur}b]<ext>
//! ```
//!
//! - **`checksum36`**: the leading 32 bits of a SHA-256 digest of the source
//!   bytes, read as a signed big-endian integer, biased by `2^31` so it is
//!   never negative, rendered in base 36. Content-based rather than
//!   mtime-based so it survives `git checkout`.
//! - **Suffixes**: one per set parameter, in the order shown.
//! - **Crop**: has no suffix of its own. When set, the rectangle is fed into
//!   the digest after the source bytes so two crops of the same file never
//!   share a name.
//!
//! SVG sources are copied byte-for-byte, so their name depends on content
//! only and carries no transform suffixes.
//!
//! Two concurrent runs may both miss on the same name and both write it.
//! The writes are identical because the transform is a pure function of the
//! name's inputs.

use crate::imaging::{ArtifactStatus, CropBox, TransformParams};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// 32-bit content checksum, biased into the unsigned range.
pub fn checksum(bytes: &[u8], crop: Option<CropBox>) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    if let Some(c) = crop {
        hasher.update(b"\0crop\0");
        for v in [c.x1, c.y1, c.x2, c.y2] {
            hasher.update(v.to_be_bytes());
        }
    }
    let digest = hasher.finalize();
    let signed = i32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    (i64::from(signed) + (1_i64 << 31)) as u32
}

/// Render a number in lowercase base 36.
pub fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Derive the output file name for a source and its transform.
///
/// `extension` includes the leading dot and is appended as given.
pub fn cache_key(
    stem: &str,
    extension: &str,
    bytes: &[u8],
    params: &TransformParams,
    vector: bool,
) -> String {
    let crop = if vector { None } else { params.crop };
    let mut key = format!("{stem}.{}", to_base36(u64::from(checksum(bytes, crop))));

    if !vector {
        if let Some(w) = params.width {
            key.push_str(&format!(".{w}w"));
        }
        if let Some(h) = params.height {
            key.push_str(&format!(".{h}h"));
        }
        if params.grayscale {
            key.push_str(".g");
        }
        if let Some(blur) = params.blur {
            key.push_str(&format!(".{blur}b"));
        }
    }

    key.push_str(extension);
    key
}

/// [`cache_key`] with stem and extension taken from the source path.
pub fn cache_key_for_path(
    source: &Path,
    bytes: &[u8],
    params: &TransformParams,
    vector: bool,
) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    cache_key(&stem, &extension, bytes, params, vector)
}

/// Summary of cache behavior for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Output already existed; nothing was read or written.
    pub cached: u32,
    /// Decoded, transformed and encoded.
    pub transformed: u32,
    /// Written byte-for-byte from the source.
    pub copied: u32,
}

impl CacheStats {
    pub fn record(&mut self, status: ArtifactStatus) {
        match status {
            ArtifactStatus::Cached => self.cached += 1,
            ArtifactStatus::Transformed => self.transformed += 1,
            ArtifactStatus::Copied => self.copied += 1,
        }
    }

    pub fn merge(&mut self, other: CacheStats) {
        self.cached += other.cached;
        self.transformed += other.transformed;
        self.copied += other.copied;
    }

    pub fn total(&self) -> u32 {
        self.cached + self.transformed + self.copied
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cached > 0 || self.copied > 0 {
            if self.copied > 0 {
                write!(
                    f,
                    "{} cached, {} copied, {} transformed ({} total)",
                    self.cached,
                    self.copied,
                    self.transformed,
                    self.total()
                )
            } else {
                write!(
                    f,
                    "{} cached, {} transformed ({} total)",
                    self.cached,
                    self.transformed,
                    self.total()
                )
            }
        } else {
            write!(f, "{} transformed", self.transformed)
        }
    }
}
