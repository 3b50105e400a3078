//! Mailbox access: filtering, two-pass scanning, and HTML extraction.
//!
//! The scanner talks to the remote store through [`MailStore`], a blocking
//! interface driven from `spawn_blocking`. Results stream back through a
//! bounded channel so filtering overlaps with network reads.

pub mod extract;
pub mod filter;
pub mod imap;
pub mod response;
pub mod scanner;
pub mod types;

pub use extract::extract_html;
pub use filter::{FilterRule, Recency, matches};
pub use imap::{ImapConfig, ImapSession};
pub use scanner::{MailboxScanner, Scan};
pub use types::{CandidateSet, FetchedBody, MessageMetadata, RawInvoiceDocument, SeqWindow};

use tokio::sync::mpsc;

use crate::error::TransportError;

/// Blocking access to a remote message store.
///
/// Implementations push results into `sink` as they arrive; delivery order
/// is unspecified and duplicates are tolerated by the caller. None of these
/// operations may change message flags.
pub trait MailStore: Send + 'static {
    /// Select the mailbox read-only and return the number of messages.
    fn message_count(&mut self) -> Result<u32, TransportError>;

    /// Fetch metadata (never bodies) for every position in `window`.
    fn fetch_metadata(
        &mut self,
        window: SeqWindow,
        sink: &mpsc::Sender<MessageMetadata>,
    ) -> Result<(), TransportError>;

    /// Fetch full raw bodies for `uids` without marking them seen.
    fn fetch_bodies(
        &mut self,
        uids: &[u32],
        sink: &mpsc::Sender<FetchedBody>,
    ) -> Result<(), TransportError>;

    /// End the session. Best effort.
    fn logout(&mut self) {}
}
