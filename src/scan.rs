//! Enumeration of the markup values that may hold image references.
//!
//! The scanner walks every element of every root in tree order and yields a
//! [`Candidate`] for each value worth parsing. A candidate borrows its value
//! mutably, so the rewriter can replace it in place once every reference in
//! it has been published.
//!
//! ## Attributes
//!
//! Which attributes are probed depends only on the element's
//! [`ElementKind`]:
//!
//! | Kind | Attributes |
//! |---|---|
//! | `img`, `source`, `embed`, `input`, `audio`, anything else | `src` |
//! | `video` | `src`, `poster` |
//! | `object` | `data` |
//! | `form` | `action`, only when it names a file with an image extension |
//! | `image` (SVG) | `href`, `xlink:href` |
//! | `link` with an `icon` rel | `href`, routed to the icon set |
//! | `script`, `iframe`, `style`, other `link` | none |
//!
//! Absolute `http(s)://` values are never candidates. A value containing a
//! `url(...)` token is parsed in embedded mode; any other attribute value is
//! parsed as a single direct reference.
//!
//! ## Style
//!
//! Inline declarations and the rules of a `<style>` element are probed for
//! the properties in [`STYLE_PROPERTIES`]. Only values containing a
//! `url(...)` token become candidates.

use crate::markup::{Attribute, Declaration, Element, StyleRule};
use crate::reference::{ParseMode, has_embedded_token, is_absolute_url, match_extension};

/// Style properties that can carry image references.
pub const STYLE_PROPERTIES: [&str; 12] = [
    "background",
    "background-image",
    "border-image",
    "border-image-source",
    "list-style",
    "list-style-image",
    "mask",
    "mask-image",
    "-webkit-mask-image",
    "content",
    "cursor",
    "shape-outside",
];

/// Element kinds with distinct image-bearing attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Img,
    Source,
    Video,
    Audio,
    Object,
    Form,
    Embed,
    Input,
    Link,
    SvgImage,
    Script,
    Iframe,
    Style,
    Other,
}

impl ElementKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "img" => Self::Img,
            "source" => Self::Source,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "object" => Self::Object,
            "form" => Self::Form,
            "embed" => Self::Embed,
            "input" => Self::Input,
            "link" => Self::Link,
            "image" | "svg:image" => Self::SvgImage,
            "script" => Self::Script,
            "iframe" => Self::Iframe,
            "style" => Self::Style,
            _ => Self::Other,
        }
    }

    /// Attributes probed for references on this kind of element.
    ///
    /// For [`ElementKind::Link`] the list applies only to icon links.
    pub fn image_attributes(self) -> &'static [&'static str] {
        match self {
            Self::Img | Self::Source | Self::Embed | Self::Input | Self::Audio | Self::Other => {
                &["src"]
            }
            Self::Video => &["src", "poster"],
            Self::Object => &["data"],
            Self::Form => &["action"],
            Self::SvgImage => &["href", "xlink:href"],
            Self::Link => &["href"],
            Self::Script | Self::Iframe | Self::Style => &[],
        }
    }
}

/// Where a candidate's references are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Image,
    /// Fanned out to every icon size; the value points at `preferred_size`
    /// when it was generated.
    Icon { preferred_size: Option<u32> },
}

/// One value to parse and rewrite.
#[derive(Debug)]
pub struct Candidate<'a> {
    pub value: &'a mut String,
    pub mode: ParseMode,
    pub route: Route,
    /// Human-readable origin such as `img[src]` or `style .hero{background}`.
    pub location: String,
}

/// Collect every candidate under `roots`, in tree order.
pub fn scan_elements(roots: &mut [Element]) -> Vec<Candidate<'_>> {
    let mut candidates = Vec::new();
    for root in roots.iter_mut() {
        collect(root, &mut candidates);
    }
    candidates
}

fn collect<'a>(element: &'a mut Element, out: &mut Vec<Candidate<'a>>) {
    let kind = ElementKind::from_tag(&element.tag);
    let (probed, route) = match kind {
        ElementKind::Link if is_icon_link(element) => (
            kind.image_attributes(),
            Route::Icon {
                preferred_size: element.attr("sizes").and_then(parse_icon_size),
            },
        ),
        ElementKind::Link => (&[][..], Route::Image),
        _ => (kind.image_attributes(), Route::Image),
    };

    let Element {
        tag,
        attributes,
        style,
        rules,
        children,
        ..
    } = element;

    for Attribute { name, value } in attributes.iter_mut() {
        if !probed.iter().any(|p| name.eq_ignore_ascii_case(p)) || is_absolute_url(value) {
            continue;
        }
        // a form action counts only when it names an image file
        if name.eq_ignore_ascii_case("action") && !names_image_file(value) {
            continue;
        }
        let mode = if has_embedded_token(value) {
            ParseMode::Embedded
        } else {
            ParseMode::Direct
        };
        out.push(Candidate {
            location: format!("{tag}[{name}]"),
            value,
            mode,
            route,
        });
    }

    collect_declarations(style, tag, out);
    for StyleRule {
        selector,
        declarations,
    } in rules.iter_mut()
    {
        collect_declarations(declarations, &format!("{tag} {selector}"), out);
    }

    for child in children.iter_mut() {
        collect(child, out);
    }
}

fn collect_declarations<'a>(
    declarations: &'a mut [Declaration],
    owner: &str,
    out: &mut Vec<Candidate<'a>>,
) {
    for Declaration { property, value } in declarations.iter_mut() {
        let allowed = STYLE_PROPERTIES
            .iter()
            .any(|p| property.eq_ignore_ascii_case(p));
        if !allowed || !has_embedded_token(value) {
            continue;
        }
        out.push(Candidate {
            location: format!("{owner}{{{property}}}"),
            value,
            mode: ParseMode::Embedded,
            route: Route::Image,
        });
    }
}

fn names_image_file(value: &str) -> bool {
    let path = value.split('?').next().unwrap_or(value).trim();
    match_extension(path).is_some()
}

fn is_icon_link(element: &Element) -> bool {
    element.attr("rel").is_some_and(|rel| {
        rel.split_ascii_whitespace()
            .any(|token| token.to_ascii_lowercase().contains("icon"))
    })
}

/// First square entry of a `sizes` attribute (`"32x32"`, `"16x16 32x32"`).
fn parse_icon_size(sizes: &str) -> Option<u32> {
    sizes.split_ascii_whitespace().find_map(|entry| {
        let entry = entry.to_ascii_lowercase();
        let (w, h) = entry.split_once('x')?;
        let w: u32 = w.parse().ok()?;
        let h: u32 = h.parse().ok()?;
        (w == h && w > 0).then_some(w)
    })
}
