//! Attachment file names.

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde::Deserialize;

use crate::transform::TransformedDocument;

/// Runs of characters not allowed in generated file names.
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-Z0-9äöüÄÖÜß\-_ ]+").expect("filename pattern is valid")
});

/// Derives deterministic, filesystem-safe attachment names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NamingStrategy {
    /// Placed between the `MM_YYYY` date prefix and the order identifier.
    pub token: String,
    /// Used when sanitizing leaves nothing.
    pub default_name: String,
    /// Appended to every name, without the dot.
    pub extension: String,
}

impl Default for NamingStrategy {
    fn default() -> Self {
        Self {
            token: "_Rechnung_Apple_".into(),
            default_name: "invoice".into(),
            extension: "pdf".into(),
        }
    }
}

impl NamingStrategy {
    /// Name the `index`-th document of a run producing `total` documents.
    ///
    /// Documents with an order identifier are named after the month of the
    /// source message and the identifier. The rest fall back to their
    /// subject, suffixed with `_<index + 1>` when the run has more than one
    /// document.
    pub fn name(&self, doc: &TransformedDocument, index: usize, total: usize) -> String {
        let stem = match doc.order_identifier.as_deref() {
            Some(id) => {
                let received = doc.source.metadata.received;
                format!(
                    "{:02}_{:04}{}{}",
                    received.month(),
                    received.year(),
                    self.token,
                    self.sanitize(id)
                )
            }
            None => {
                let subject = self.sanitize(&doc.source.metadata.subject);
                if total > 1 {
                    format!("{subject}_{}", index + 1)
                } else {
                    subject
                }
            }
        };
        format!("{stem}.{}", self.extension)
    }

    /// Replace disallowed characters with `_` and trim. Input with no
    /// allowed character besides whitespace becomes the default name.
    pub fn sanitize(&self, input: &str) -> String {
        if DISALLOWED.replace_all(input, "").trim().is_empty() {
            return self.default_name.clone();
        }
        DISALLOWED.replace_all(input, "_").trim().to_string()
    }
}
