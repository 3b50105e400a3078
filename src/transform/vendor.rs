//! Vendor-specific markup handling: UI chrome removal and footer emphasis.
//!
//! Everything here is keyed to CSS selectors from the [`VendorProfile`],
//! never to free text, except the tax-label check on footer paragraphs.

use kuchikiki::{NodeRef, Selectors};
use serde::Deserialize;

use crate::error::{ConfigError, HtmlError};

/// Selectors and labels describing one vendor's invoice layout.
///
/// Defaults match Apple's German invoice mails.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VendorProfile {
    /// Call-to-action button container.
    pub action_button: String,
    /// Introductory paragraph for the button; only the first match is removed.
    pub intro_paragraph: String,
    /// Help/support information block.
    pub help_block: String,
    /// Trailing legal/privacy link bar.
    pub link_bar: String,
    /// Paragraphs of the footer copy block.
    pub footer_paragraphs: String,
    /// Label that marks the tax-identifier footer line.
    pub tax_label: String,
    /// Inline style applied to the tax-identifier line.
    pub emphasis_style: String,
    /// Label preceding the order identifier in the invoice text.
    pub order_marker: String,
}

impl Default for VendorProfile {
    fn default() -> Self {
        Self {
            action_button: ".action-button-cell".into(),
            intro_paragraph: "#footer_section > p".into(),
            help_block: "#footer_section > .custom-1sstyyn".into(),
            link_bar: ".inline-link-group".into(),
            footer_paragraphs: ".footer-copy p".into(),
            tax_label: "UID-Nr".into(),
            emphasis_style: "font-weight:600".into(),
            order_marker: "Bestellnummer:".into(),
        }
    }
}

impl VendorProfile {
    /// Check that every selector compiles and the marker is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, selector) in [
            ("vendor.action_button", &self.action_button),
            ("vendor.intro_paragraph", &self.intro_paragraph),
            ("vendor.help_block", &self.help_block),
            ("vendor.link_bar", &self.link_bar),
            ("vendor.footer_paragraphs", &self.footer_paragraphs),
        ] {
            if Selectors::compile(selector).is_err() {
                return Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: format!("invalid CSS selector: {selector}"),
                });
            }
        }
        if self.order_marker.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "vendor.order_marker".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Remove the vendor's UI chrome from `document`.
///
/// The intro paragraph is only removed together with an action button, so
/// a second pass over already-cleaned markup removes nothing.
pub fn strip_chrome(document: &NodeRef, profile: &VendorProfile) -> Result<(), HtmlError> {
    let buttons = detach_all(document, &profile.action_button)?;
    if buttons > 0 {
        let intro = select(document, &profile.intro_paragraph)?.next();
        if let Some(paragraph) = intro {
            paragraph.as_node().detach();
        }
    }
    detach_all(document, &profile.help_block)?;
    detach_all(document, &profile.link_bar)?;
    Ok(())
}

/// Apply the emphasis style to footer paragraphs mentioning the tax label.
pub fn emphasize_tax_line(document: &NodeRef, profile: &VendorProfile) -> Result<(), HtmlError> {
    for paragraph in select(document, &profile.footer_paragraphs)? {
        if paragraph.as_node().text_contents().contains(&profile.tax_label) {
            paragraph
                .attributes
                .borrow_mut()
                .insert("style", profile.emphasis_style.clone());
        }
    }
    Ok(())
}

/// Select elements, collected up front so callers may mutate the tree.
pub(crate) fn select(
    document: &NodeRef,
    selector: &str,
) -> Result<std::vec::IntoIter<kuchikiki::NodeDataRef<kuchikiki::ElementData>>, HtmlError> {
    let matches: Vec<_> = document
        .select(selector)
        .map_err(|()| HtmlError::Selector(selector.to_string()))?
        .collect();
    Ok(matches.into_iter())
}

fn detach_all(document: &NodeRef, selector: &str) -> Result<usize, HtmlError> {
    let mut removed = 0;
    for element in select(document, selector)? {
        element.as_node().detach();
        removed += 1;
    }
    Ok(removed)
}
