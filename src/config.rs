//! Rewriter configuration.
//!
//! Handles loading, validating, and merging `img-rewrite.toml`. Stock
//! defaults are serialized to a TOML value and the user file is merged on top
//! of it, so a config file only needs the keys it changes.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! source = "content"        # Search root for image references
//! output = "dist"           # Published output root
//!
//! [images]
//! folder = "images"         # Sub-folder of output for transformed images
//! url_prefix = ""           # Prepended to rewritten values, e.g. "/"
//! quality = 90              # JPEG quality (1-100)
//!
//! [icons]
//! folder = "icons"          # Sub-folder of output for icon sizes
//! sizes = [16, 32, 180, 192, 512]
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! on_error = "abort"        # "abort" or "skip-page"
//! ```
//!
//! Unknown keys are rejected to catch typos early. Command-line flags
//! override `source` and `output` after the file is loaded.

use crate::imaging::MAX_DIMENSION;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "img-rewrite.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Rewriter configuration loaded from `img-rewrite.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewriteConfig {
    /// Directory searched when resolving references.
    pub source: String,
    /// Root of the published site.
    pub output: String,
    pub images: ImagesConfig,
    pub icons: IconsConfig,
    pub processing: ProcessingConfig,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            source: "content".to_string(),
            output: "dist".to_string(),
            images: ImagesConfig::default(),
            icons: IconsConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl RewriteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.icons.sizes.is_empty() {
            return Err(ConfigError::Validation(
                "icons.sizes must not be empty".into(),
            ));
        }
        if self.icons.sizes.contains(&0) {
            return Err(ConfigError::Validation(
                "icons.sizes values must be non-zero".into(),
            ));
        }
        if self.icons.sizes.iter().any(|&size| size > MAX_DIMENSION) {
            return Err(ConfigError::Validation(format!(
                "icons.sizes values must be at most {MAX_DIMENSION}"
            )));
        }
        for (key, folder) in [
            ("images.folder", &self.images.folder),
            ("icons.folder", &self.icons.folder),
        ] {
            if folder.trim_matches('/').is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn source_root(&self) -> PathBuf {
        PathBuf::from(&self.source)
    }

    pub fn images_dir(&self) -> PathBuf {
        Path::new(&self.output).join(self.images.folder.trim_matches('/'))
    }

    pub fn icons_dir(&self) -> PathBuf {
        Path::new(&self.output).join(self.icons.folder.trim_matches('/'))
    }

    /// Text placed before an image file name in a rewritten value.
    pub fn images_prefix(&self) -> String {
        format!(
            "{}{}/",
            self.images.url_prefix,
            self.images.folder.trim_matches('/')
        )
    }

    /// Text placed before an icon file name in a rewritten value.
    ///
    /// Icons share the images `url_prefix`.
    pub fn icons_prefix(&self) -> String {
        format!(
            "{}{}/",
            self.images.url_prefix,
            self.icons.folder.trim_matches('/')
        )
    }
}

/// Transformed image settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Sub-folder of `output` that receives transformed images.
    pub folder: String,
    /// Prepended to every rewritten value (e.g. `"/"` or a CDN origin).
    pub url_prefix: String,
    /// JPEG encoding quality (1 = worst, 100 = best).
    pub quality: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            folder: "images".to_string(),
            url_prefix: String::new(),
            quality: 90,
        }
    }
}

/// Icon fan-out settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IconsConfig {
    pub folder: String,
    /// Square sizes generated for every icon link.
    pub sizes: Vec<u32>,
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self {
            folder: "icons".to_string(),
            sizes: vec![16, 32, 180, 192, 512],
        }
    }
}

/// What happens to the run when a page cannot be rewritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop and report the first failing page.
    #[default]
    Abort,
    /// Leave the failing page untouched and continue with the rest.
    SkipPage,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    pub on_error: FailurePolicy,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(RewriteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<RewriteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: RewriteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path`, falling back to stock defaults when it
/// does not exist.
pub fn load_config(path: &Path) -> Result<RewriteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `img-rewrite.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# img-rewrite Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# Directory searched when resolving image references. Bare names such as
# "logo" are found anywhere below it (breadth-first); names containing a
# slash such as "photos/cat" are taken relative to it.
source = "content"

# Root of the published site. Transformed images and icons are written to
# sub-folders of this directory.
output = "dist"

# ---------------------------------------------------------------------------
# Transformed images
# ---------------------------------------------------------------------------
[images]
# Sub-folder of `output` that receives transformed images.
folder = "images"

# Prepended to every rewritten value. Use "/" for root-relative URLs or a
# CDN origin such as "https://cdn.example.com/".
url_prefix = ""

# JPEG encoding quality (1 = worst, 100 = best).
quality = 90

# ---------------------------------------------------------------------------
# Icons
# ---------------------------------------------------------------------------
# Images referenced from <link rel="icon"> style links are cropped to a
# centered square and published at every size below. The link points at the
# size named by its `sizes` attribute, or the largest size.
[icons]
folder = "icons"
sizes = [16, 32, 180, 192, 512]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers. Omit for auto (= number of CPU cores).
# Values larger than the core count are clamped down.
# max_processes = 4

# What to do when a page references a missing image, has an invalid crop,
# or an image fails to process:
#   "abort"     - stop and report the error (nothing is written back)
#   "skip-page" - leave that page unchanged and continue with the others
on_error = "abort"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // =========================================================================
    // Defaults and parsing
    // =========================================================================

    #[test]
    fn default_config_values() {
        let config = RewriteConfig::default();
        assert_eq!(config.source, "content");
        assert_eq!(config.output, "dist");
        assert_eq!(config.images.folder, "images");
        assert_eq!(config.images.quality, 90);
        assert_eq!(config.icons.sizes, vec![16, 32, 180, 192, 512]);
        assert_eq!(config.processing.on_error, FailurePolicy::Abort);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[images]
url_prefix = "/"
"#;
        let config: RewriteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.images.url_prefix, "/");
        assert_eq!(config.images.folder, "images");
        assert_eq!(config.images.quality, 90);
    }

    #[test]
    fn parse_processing_config() {
        let toml = r#"
[processing]
max_processes = 4
on_error = "skip-page"
"#;
        let config: RewriteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.processing.max_processes, Some(4));
        assert_eq!(config.processing.on_error, FailurePolicy::SkipPage);
    }

    #[test]
    fn unknown_policy_rejected() {
        let toml = r#"
[processing]
on_error = "ignore"
"#;
        assert!(toml::from_str::<RewriteConfig>(toml).is_err());
    }

    #[test]
    fn unknown_key_rejected() {
        let toml_str = r#"
[images]
qualty = 90
"#;
        let result: Result<RewriteConfig, _> = toml::from_str(toml_str);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let toml_str = r#"
[imagez]
quality = 90
"#;
        assert!(toml::from_str::<RewriteConfig>(toml_str).is_err());
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let config: RewriteConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, RewriteConfig::default());
    }

    // =========================================================================
    // Derived paths
    // =========================================================================

    #[test]
    fn output_dirs_and_prefixes() {
        let mut config = RewriteConfig::default();
        assert_eq!(config.images_dir(), PathBuf::from("dist/images"));
        assert_eq!(config.icons_dir(), PathBuf::from("dist/icons"));
        assert_eq!(config.images_prefix(), "images/");
        assert_eq!(config.icons_prefix(), "icons/");

        config.images.url_prefix = "/".into();
        config.images.folder = "/assets/img/".into();
        assert_eq!(config.images_prefix(), "/assets/img/");
        assert_eq!(config.images_dir(), PathBuf::from("dist/assets/img"));
        assert_eq!(config.icons_prefix(), "/icons/");
    }

    // =========================================================================
    // effective_threads
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig::default();
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
            ..ProcessingConfig::default()
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
            ..ProcessingConfig::default()
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"quality = 90"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"quality = 70"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("quality").unwrap().as_integer(), Some(70));
    }

    #[test]
    fn merge_toml_preserves_base_keys() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[icons]
sizes = [64]
"#,
        )
        .unwrap();
        let config: RewriteConfig = merge_toml(base, overlay).try_into().unwrap();
        assert_eq!(config.icons.sizes, vec![64]);
        assert_eq!(config.icons.folder, "icons");
        assert_eq!(config.images.quality, 90);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(RewriteConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_quality_bounds() {
        let mut config = RewriteConfig::default();
        config.images.quality = 100;
        assert!(config.validate().is_ok());
        config.images.quality = 1;
        assert!(config.validate().is_ok());

        config.images.quality = 0;
        assert!(config.validate().is_err());
        config.images.quality = 101;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("quality"));
    }

    #[test]
    fn validate_icon_sizes() {
        let mut config = RewriteConfig::default();
        config.icons.sizes = vec![];
        assert!(config.validate().is_err());
        config.icons.sizes = vec![16, 0];
        assert!(config.validate().is_err());
        config.icons.sizes = vec![16, MAX_DIMENSION + 1];
        assert!(config.validate().is_err());
        config.icons.sizes = vec![MAX_DIMENSION];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_empty_folder() {
        let mut config = RewriteConfig::default();
        config.images.folder = "/".into();
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // load_config
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(config, RewriteConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(
            &path,
            r#"
source = "site"

[images]
quality = 75
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.source, "site");
        assert_eq!(config.images.quality, 75);
        assert_eq!(config.output, "dist");
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, "[images]\nquality = 200\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, "this is not toml [").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }
}
