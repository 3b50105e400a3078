//! HTML transformation of invoice bodies.
//!
//! A transform runs in two phases. Remote image sources are collected and
//! fetched first; the document is then rebuilt in one synchronous step by
//! [`rewrite`], which takes the fetched data as plain input and returns new
//! markup. No parsed tree lives across an `.await`.

pub mod images;
pub mod order;
pub mod vendor;

pub use images::{FetchedImage, HttpImageFetcher, ImageFetcher};
pub use order::find_order_identifier;
pub use vendor::VendorProfile;

use std::collections::HashMap;

use kuchikiki::NodeRef;
use kuchikiki::traits::TendrilSink;

use crate::error::HtmlError;
use crate::events::{EventSink, PipelineEvent};
use crate::mailbox::RawInvoiceDocument;

/// A sanitized, self-contained invoice document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedDocument {
    pub html: String,
    pub order_identifier: Option<String>,
    pub source: RawInvoiceDocument,
}

/// Turns raw vendor markup into printable, self-contained documents.
pub struct HtmlTransformer<F> {
    fetcher: F,
    profile: VendorProfile,
}

impl<F: ImageFetcher> HtmlTransformer<F> {
    pub fn new(fetcher: F, profile: VendorProfile) -> Self {
        Self { fetcher, profile }
    }

    /// Transform one raw document.
    ///
    /// Image fetch failures are reported to `events` and leave the original
    /// reference in place.
    pub async fn transform(
        &self,
        source: RawInvoiceDocument,
        events: &dyn EventSink,
    ) -> Result<TransformedDocument, HtmlError> {
        let mut inlined = HashMap::new();
        for url in external_image_sources(&source.html)? {
            match self.fetcher.fetch(&url).await {
                Ok(image) => {
                    inlined.insert(url, image.to_data_uri());
                }
                Err(e) => events.emit(PipelineEvent::ImageSkipped {
                    url,
                    reason: e.to_string(),
                }),
            }
        }

        let (html, order_identifier) = rewrite(&source.html, &inlined, &self.profile)?;
        Ok(TransformedDocument {
            html,
            order_identifier,
            source,
        })
    }
}

/// Distinct external `img` sources, in document order.
pub fn external_image_sources(html: &str) -> Result<Vec<String>, HtmlError> {
    let document = parse(html);
    let mut sources: Vec<String> = Vec::new();
    for img in vendor::select(&document, "img[src]")? {
        let attributes = img.attributes.borrow();
        let Some(src) = attributes.get("src") else {
            continue;
        };
        if is_external(src) && !sources.iter().any(|s| s == src) {
            sources.push(src.to_string());
        }
    }
    Ok(sources)
}

/// Rebuild `html` with images inlined, chrome removed and the tax line
/// emphasized. Returns the new markup and the order identifier, if any.
///
/// `inlined` maps external sources to their `data:` URIs; sources without an
/// entry are left untouched.
pub fn rewrite(
    html: &str,
    inlined: &HashMap<String, String>,
    profile: &VendorProfile,
) -> Result<(String, Option<String>), HtmlError> {
    let document = parse(html);
    let order_identifier = find_order_identifier(&document, &profile.order_marker);

    for img in vendor::select(&document, "img[src]")? {
        let mut attributes = img.attributes.borrow_mut();
        let replacement = attributes.get("src").and_then(|src| inlined.get(src)).cloned();
        if let Some(data_uri) = replacement {
            attributes.insert("src", data_uri);
        }
    }
    vendor::strip_chrome(&document, profile)?;
    vendor::emphasize_tax_line(&document, profile)?;

    Ok((serialize(&document)?, order_identifier))
}

fn is_external(src: &str) -> bool {
    src.starts_with("http")
}

/// html5ever recovers from any input, so parsing cannot fail.
fn parse(html: &str) -> NodeRef {
    kuchikiki::parse_html().one(html)
}

fn serialize(document: &NodeRef) -> Result<String, HtmlError> {
    let mut out = Vec::new();
    document
        .serialize(&mut out)
        .map_err(|e| HtmlError::Serialize(e.to_string()))?;
    String::from_utf8(out).map_err(|e| HtmlError::Serialize(e.to_string()))
}
