//! The markup tree the rewriter works on.
//!
//! Pages arrive as JSON manifests produced by whatever front end renders the
//! site, are rewritten in place, and are written back out as JSON for the
//! serializer. Only the parts of an element that can carry image references
//! are modelled: attributes, inline style declarations, the rules of a
//! `<style>` element, and children. Text is carried through untouched.
//!
//! ```json
//! {
//!   "pages": [{
//!     "path": "index.html",
//!     "roots": [{
//!       "tag": "div",
//!       "style": [{ "property": "background-image", "value": "url(hero?w=800)" }],
//!       "children": [{ "tag": "img", "attributes": [{ "name": "src", "value": "logo" }] }]
//!     }]
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// One `property: value` pair, inline or inside a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

/// A nested rule of a `<style>` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRule {
    pub selector: String,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    /// Inline `style` declarations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub style: Vec<Declaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<StyleRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.push(Attribute {
            name: name.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn with_style(mut self, property: &str, value: &str) -> Self {
        self.style.push(Declaration {
            property: property.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn with_rule(mut self, selector: &str, declarations: &[(&str, &str)]) -> Self {
        self.rules.push(StyleRule {
            selector: selector.to_string(),
            declarations: declarations
                .iter()
                .map(|(property, value)| Declaration {
                    property: property.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        });
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Attribute value by name, ASCII case-insensitive.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }

    /// Inline style value by property name, ASCII case-insensitive.
    pub fn style_value(&self, property: &str) -> Option<&str> {
        self.style
            .iter()
            .find(|d| d.property.eq_ignore_ascii_case(property))
            .map(|d| d.value.as_str())
    }
}

/// One rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Output path of the page, used in progress output and errors.
    pub path: String,
    pub roots: Vec<Element>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageManifest {
    pub pages: Vec<Page>,
}

impl PageManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
