//! Order identifier lookup.

use kuchikiki::NodeRef;
use kuchikiki::iter::NodeIterator;

/// Find the order identifier that follows `marker` in the document.
///
/// Elements are visited depth-first in document order; the first one whose
/// trimmed text begins with `marker` wins. The identifier is the remainder of
/// that text up to the first line break or tab. Blank identifiers count as
/// absent.
pub fn find_order_identifier(document: &NodeRef, marker: &str) -> Option<String> {
    for element in document.descendants().elements() {
        let text = element.as_node().text_contents();
        let Some(rest) = text.trim().strip_prefix(marker) else {
            continue;
        };
        let id = rest
            .trim()
            .split(['\n', '\r', '\t'])
            .next()
            .unwrap_or_default()
            .trim();
        return (!id.is_empty()).then(|| id.to_string());
    }
    None
}
