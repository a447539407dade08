//! Parsing of image references embedded in markup values.
//!
//! A reference names a local image, optionally followed by transform
//! parameters after a `?`:
//!
//! ```text
//! sample-photo?w=200,crop=250,0,500,667
//! url("textures/paper.png?grayscale&blur=3")
//! ```
//!
//! ## Modes
//!
//! - **Direct**: the whole value is one reference (`<img src="...">`).
//! - **Embedded**: the value contains one or more `url(...)` tokens, quotes
//!   optional (`background: url(a.png), url("b?w=10")`). Each token is
//!   recorded with its byte range in the original value so the rewriter can
//!   splice replacements back in.
//!
//! ## Parameters
//!
//! Tokens are separated by `&` or `,` and are either `key` or `key=number`:
//!
//! | Key | Meaning |
//! |---|---|
//! | `w`, `width` | target width in pixels |
//! | `h`, `height` | target height in pixels |
//! | `crop=x1,y1,x2,y2` | pre-crop rectangle; consumes the next three tokens |
//! | `g`, `gray`, `grayscale` | convert to grayscale |
//! | `blur` | Gaussian blur radius |
//! | `hue`, `sat`, `light` | color adjustments (parsed, not yet applied) |
//!
//! Numbers that fail to parse become 0, and a zero size or blur means "not
//! set". So does a size above [`MAX_DIMENSION`] or a blur that is subnormal
//! or above [`MAX_BLUR_RADIUS`]. Unknown keys are ignored. The only hard failure is a malformed crop
//! rectangle.

use crate::imaging::{CropBox, MAX_BLUR_RADIUS, MAX_DIMENSION, TransformParams};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Recognized image extensions in resolution priority order.
pub const IMAGE_EXTENSIONS: [&str; 8] = [
    ".gif", ".png", ".jpg", ".jpeg", ".webp", ".avif", ".bmp", ".svg",
];

/// `url(<path>[?<params>])` with optional single or double quotes. The
/// `url` keyword is matched case-insensitively.
static EMBEDDED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i:url)\(\s*["']?([A-Za-z0-9._/\-]+(?:\?[^"'()\s]*)?)["']?\s*\)"#).unwrap()
});

/// A bare `<path>[?<params>]` filling the whole (trimmed) value.
static DIRECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._/\-]+(?:\?\S*)?$").unwrap());

static ABSOLUTE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*https?://").unwrap());

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Invalid crop rectangle in \"{0}\": expected crop=x1,y1,x2,y2 with x2 > x1 and y2 > y1")]
    InvalidCropRectangle(String),
}

/// How a value should be searched for references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Direct,
    Embedded,
}

/// One reference found in a value.
///
/// `start..end` is the byte range of `base_name[?params]` inside the
/// original value (the `url(` wrapper and quotes are outside it).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReference {
    pub base_name: String,
    /// Recognized extension already present on `base_name`, if any.
    pub extension: Option<&'static str>,
    pub start: usize,
    pub end: usize,
    pub params: TransformParams,
}

/// True for `http://` and `https://` URLs, which are never local references.
pub fn is_absolute_url(value: &str) -> bool {
    ABSOLUTE_URL_RE.is_match(value)
}

/// True if the value contains at least one `url(...)` token worth parsing.
pub fn has_embedded_token(value: &str) -> bool {
    EMBEDDED_RE.is_match(value)
}

/// Match a name against [`IMAGE_EXTENSIONS`] (ASCII case-insensitive).
pub fn match_extension(name: &str) -> Option<&'static str> {
    let lower = name.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| lower.ends_with(ext))
}

/// Parse a value in the given mode. References come back in left-to-right order.
pub fn parse(value: &str, mode: ParseMode) -> Result<Vec<ParsedReference>, ParseError> {
    match mode {
        ParseMode::Direct => Ok(parse_direct(value)?.into_iter().collect()),
        ParseMode::Embedded => parse_embedded(value),
    }
}

/// Treat the whole value as a single reference.
///
/// Returns `Ok(None)` when the value is not path-like (URIs with a scheme,
/// fragments, protocol-relative URLs, free text) or names a non-image file.
pub fn parse_direct(value: &str) -> Result<Option<ParsedReference>, ParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with("//") || !DIRECT_RE.is_match(trimmed) {
        return Ok(None);
    }
    let start = value.len() - value.trim_start().len();
    build_reference(trimmed, start)
}

/// Like [`parse`], but every reference succeeds or fails on its own, so a
/// malformed token does not hide the ones after it.
pub fn parse_each(value: &str, mode: ParseMode) -> Vec<Result<ParsedReference, ParseError>> {
    match mode {
        ParseMode::Direct => parse_direct(value).transpose().into_iter().collect(),
        ParseMode::Embedded => embedded_tokens(value).collect(),
    }
}

/// Find every `url(...)` token in the value.
pub fn parse_embedded(value: &str) -> Result<Vec<ParsedReference>, ParseError> {
    embedded_tokens(value).collect()
}

fn embedded_tokens(value: &str) -> impl Iterator<Item = Result<ParsedReference, ParseError>> + '_ {
    EMBEDDED_RE.captures_iter(value).filter_map(|caps| {
        let token = caps.get(1)?;
        build_reference(token.as_str(), token.start()).transpose()
    })
}

fn build_reference(token: &str, start: usize) -> Result<Option<ParsedReference>, ParseError> {
    let (base_name, param_string) = match token.split_once('?') {
        Some((base, params)) => (base, Some(params)),
        None => (token, None),
    };
    if !is_image_name(base_name) {
        return Ok(None);
    }
    let params = match param_string {
        Some(raw) => parse_params(raw)?,
        None => TransformParams::default(),
    };
    Ok(Some(ParsedReference {
        base_name: base_name.to_string(),
        extension: match_extension(base_name),
        start,
        end: start + token.len(),
        params,
    }))
}

/// A base name can refer to an image if its last segment is a real name
/// and either has an image extension or no extension at all.
fn is_image_name(base_name: &str) -> bool {
    let last = base_name.rsplit('/').next().unwrap_or(base_name);
    if last.is_empty() || last.chars().all(|c| c == '.') {
        return false;
    }
    match last.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < last.len() => match_extension(last).is_some(),
        _ => true,
    }
}

/// Parse a parameter string such as `w=200,crop=250,0,500,667`.
pub fn parse_params(raw: &str) -> Result<TransformParams, ParseError> {
    let tokens: Vec<&str> = raw
        .split(['&', ','])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let mut params = TransformParams::default();
    let mut i = 0;
    while i < tokens.len() {
        let (key, value) = match tokens[i].split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (tokens[i], None),
        };

        match key.to_ascii_lowercase().as_str() {
            "w" | "width" => params.width = pixels(number(value)),
            "h" | "height" => params.height = pixels(number(value)),
            "blur" => params.blur = blur_radius(number(value)),
            "hue" => params.hue = Some(number(value) as f32),
            "sat" => params.saturation = Some(number(value) as f32),
            "light" => params.lightness = Some(number(value) as f32),
            "g" | "gray" | "grayscale" => params.grayscale = flag(value),
            "crop" => {
                params.crop = Some(parse_crop(raw, value, &tokens[i + 1..])?);
                i += 3;
            }
            other => tracing::debug!(key = other, params = raw, "Ignoring unknown image parameter"),
        }
        i += 1;
    }
    Ok(params)
}

/// `crop=X1` followed by the three bare tokens `Y1,X2,Y2`.
fn parse_crop(raw: &str, first: Option<&str>, rest: &[&str]) -> Result<CropBox, ParseError> {
    let invalid = || ParseError::InvalidCropRectangle(raw.to_string());
    let x1 = first.ok_or_else(invalid)?;
    if rest.len() < 3 {
        return Err(invalid());
    }
    let crop = CropBox::new(
        coordinate(x1),
        coordinate(rest[0]),
        coordinate(rest[1]),
        coordinate(rest[2]),
    );
    if !crop.is_valid() {
        return Err(invalid());
    }
    Ok(crop)
}

/// Permissive number: anything unparseable is 0.
fn number(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

/// A pixel count, or `None` when the number rounds below 1 or above
/// [`MAX_DIMENSION`].
fn pixels(n: f64) -> Option<u32> {
    let px = n.round();
    (px >= 1.0 && px <= f64::from(MAX_DIMENSION)).then_some(px as u32)
}

/// A usable blur sigma, or `None` (no blur) for zero, subnormal, negative,
/// or oversized values.
fn blur_radius(n: f64) -> Option<f32> {
    let radius = n as f32;
    (radius.is_normal() && radius > 0.0 && radius <= MAX_BLUR_RADIUS).then_some(radius)
}

fn coordinate(token: &str) -> u32 {
    number(Some(token)).max(0.0).round().min(u32::MAX as f64) as u32
}

fn flag(value: Option<&str>) -> bool {
    !matches!(
        value.map(str::to_ascii_lowercase).as_deref(),
        Some("0" | "false" | "no" | "off")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Direct mode
    // =========================================================================

    #[test]
    fn direct_bare_name_without_params() {
        let parsed = parse_direct("logo").unwrap().unwrap();
        assert_eq!(parsed.base_name, "logo");
        assert_eq!(parsed.extension, None);
        assert_eq!((parsed.start, parsed.end), (0, 4));
        assert_eq!(parsed.params, TransformParams::default());
    }

    #[test]
    fn direct_with_crop_and_width() {
        let value = "sample-photo?w=200,crop=250,0,500,667";
        let parsed = parse_direct(value).unwrap().unwrap();
        assert_eq!(parsed.base_name, "sample-photo");
        assert_eq!(parsed.params.width, Some(200));
        assert_eq!(parsed.params.height, None);
        assert_eq!(parsed.params.crop, Some(CropBox::new(250, 0, 500, 667)));
        assert_eq!((parsed.start, parsed.end), (0, value.len()));
    }

    #[test]
    fn direct_offsets_skip_surrounding_whitespace() {
        let parsed = parse_direct("  photos/cat.JPG  ").unwrap().unwrap();
        assert_eq!(parsed.base_name, "photos/cat.JPG");
        assert_eq!(parsed.extension, Some(".jpg"));
        assert_eq!((parsed.start, parsed.end), (2, 16));
    }

    #[test]
    fn direct_rejects_non_path_values() {
        for value in [
            "",
            "   ",
            "#top",
            "data:image/png;base64,AAAA",
            "mailto:someone@example.com",
            "//cdn.example.com/a.png",
            "two words",
        ] {
            assert_eq!(parse_direct(value).unwrap(), None, "{value:?}");
        }
    }

    #[test]
    fn direct_rejects_non_image_extension() {
        assert_eq!(parse_direct("js/app.js").unwrap(), None);
        assert_eq!(parse_direct("page.html").unwrap(), None);
    }

    // =========================================================================
    // Embedded mode
    // =========================================================================

    #[test]
    fn embedded_offsets_match_substrings() {
        let value = r#"url("a.png"), url(b?w=10) no-repeat, url('dir/c.svg')"#;
        let refs = parse_embedded(value).unwrap();
        assert_eq!(refs.len(), 3);

        let names: Vec<&str> = refs.iter().map(|s| s.base_name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b", "dir/c.svg"]);

        assert_eq!(&value[refs[0].start..refs[0].end], "a.png");
        assert_eq!(&value[refs[1].start..refs[1].end], "b?w=10");
        assert_eq!(&value[refs[2].start..refs[2].end], "dir/c.svg");
        assert!(refs[0].end <= refs[1].start && refs[1].end <= refs[2].start);
    }

    #[test]
    fn embedded_skips_absolute_and_data_urls() {
        let value = "url(https://cdn.example.com/x.png), url(data:image/png;base64,AA), url(y.gif)";
        let refs = parse_embedded(value).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].base_name, "y.gif");
    }

    #[test]
    fn embedded_skips_fonts() {
        assert!(parse_embedded("url(fonts/inter.woff2)").unwrap().is_empty());
    }

    #[test]
    fn embedded_with_whitespace_inside_wrapper() {
        let value = "url(  \"hero?h=300\"  )";
        let refs = parse_embedded(value).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(&value[refs[0].start..refs[0].end], "hero?h=300");
        assert_eq!(refs[0].params.height, Some(300));
    }

    #[test]
    fn has_embedded_token_detection() {
        assert!(has_embedded_token("center / cover url(bg.jpg)"));
        assert!(!has_embedded_token("bg.jpg"));
        assert!(!has_embedded_token("url(https://x.org/a.png)"));
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    #[test]
    fn params_accept_long_and_short_keys() {
        let p = parse_params("width=120&height=80").unwrap();
        assert_eq!((p.width, p.height), (Some(120), Some(80)));
        let p = parse_params("w=120,h=80").unwrap();
        assert_eq!((p.width, p.height), (Some(120), Some(80)));
    }

    #[test]
    fn params_flags_and_color_adjustments() {
        let p = parse_params("grayscale,blur=2.5,hue=-30,sat=1.2,light=0.9").unwrap();
        assert!(p.grayscale);
        assert_eq!(p.blur, Some(2.5));
        assert_eq!(p.hue, Some(-30.0));
        assert_eq!(p.saturation, Some(1.2));
        assert_eq!(p.lightness, Some(0.9));
    }

    #[test]
    fn params_grayscale_can_be_disabled() {
        assert!(!parse_params("g=0").unwrap().grayscale);
        assert!(parse_params("g=1").unwrap().grayscale);
    }

    #[test]
    fn params_bad_numbers_default_to_zero() {
        let p = parse_params("w=abc,h=12px,blur=lots").unwrap();
        assert_eq!(p.width, None);
        assert_eq!(p.height, None);
        assert_eq!(p.blur, None);
    }

    #[test]
    fn params_out_of_range_blur_ignored() {
        for raw in ["blur=1e300", "blur=1e30", "blur=1e-40", "blur=-3", "blur=1001"] {
            assert_eq!(parse_params(raw).unwrap().blur, None, "{raw}");
        }
        assert_eq!(parse_params("blur=1000").unwrap().blur, Some(1000.0));
    }

    #[test]
    fn params_oversized_dimensions_ignored() {
        let p = parse_params("w=1e12,h=16385").unwrap();
        assert_eq!(p.width, None);
        assert_eq!(p.height, None);
        assert_eq!(parse_params("w=16384").unwrap().width, Some(MAX_DIMENSION));
    }

    #[test]
    fn params_unknown_keys_ignored() {
        let p = parse_params("format=webp,w=10").unwrap();
        assert_eq!(p.width, Some(10));
    }

    #[test]
    fn params_fractional_sizes_round() {
        assert_eq!(parse_params("w=99.6").unwrap().width, Some(100));
    }

    #[test]
    fn crop_backwards_is_invalid() {
        let err = parse_params("crop=10,10,5,5").unwrap_err();
        assert_eq!(err, ParseError::InvalidCropRectangle("crop=10,10,5,5".into()));
    }

    #[test]
    fn crop_zero_bottom_right_is_invalid() {
        assert!(parse_params("crop=0,0,0,10").is_err());
        assert!(parse_params("crop=0,0,10,0").is_err());
    }

    #[test]
    fn crop_missing_corners_is_invalid() {
        assert!(parse_params("crop=1,2,3").is_err());
        assert!(parse_params("crop").is_err());
    }

    #[test]
    fn crop_followed_by_more_params() {
        let p = parse_params("crop=0,0,100,50&w=20&grayscale").unwrap();
        assert_eq!(p.crop, Some(CropBox::new(0, 0, 100, 50)));
        assert_eq!(p.width, Some(20));
        assert!(p.grayscale);
    }

    #[test]
    fn embedded_url_keyword_is_case_insensitive() {
        let value = "URL(hero.png) no-repeat, Url('b?w=4')";
        let refs = parse_embedded(value).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(&value[refs[0].start..refs[0].end], "hero.png");
        assert_eq!(refs[1].params.width, Some(4));
        assert!(has_embedded_token("background: URL(bg.jpg)"));
    }

    #[test]
    fn parse_each_keeps_going_past_bad_crop() {
        let results = parse_each("url(a.png?crop=9,9,1,1), url(phantom.png)", ParseMode::Embedded);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(ParseError::InvalidCropRectangle(_))));
        assert_eq!(results[1].as_ref().unwrap().base_name, "phantom.png");

        assert!(parse_each("https://x.org/a.png", ParseMode::Direct).is_empty());
        assert_eq!(parse_each("logo?w=3", ParseMode::Direct).len(), 1);
    }

    #[test]
    fn crop_error_propagates_from_embedded() {
        let result = parse_embedded("url(a.png?crop=5,5,1,1)");
        assert!(matches!(result, Err(ParseError::InvalidCropRectangle(_))));
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn extension_priority_and_case() {
        assert_eq!(match_extension("a.PNG"), Some(".png"));
        assert_eq!(match_extension("a.jpeg"), Some(".jpeg"));
        assert_eq!(match_extension("a.tiff"), None);
        assert_eq!(match_extension("logo"), None);
    }

    #[test]
    fn absolute_url_detection() {
        assert!(is_absolute_url("https://example.com/a.png"));
        assert!(is_absolute_url("HTTP://example.com/a.png"));
        assert!(!is_absolute_url("images/a.png"));
        assert!(!is_absolute_url("httpsfoo.png"));
    }

    #[test]
    fn dotted_names_treated_as_extensionless_only_when_no_suffix() {
        assert!(parse_direct(".hidden").unwrap().is_some());
        assert!(parse_direct("archive.tar").unwrap().is_none());
        assert!(parse_direct("..").unwrap().is_none());
    }
}
