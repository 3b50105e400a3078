//! Mailbox data model: message metadata, candidate sets, raw invoice documents.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};

/// Lightweight per-message data fetched in the first scan pass.
///
/// Immutable once fetched. `sequence` is only meaningful within the session
/// that produced it; `uid` is the stable server-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMetadata {
    pub uid: u32,
    pub sequence: u32,
    pub subject: String,
    /// One entry per originating address, in header order.
    pub sender_domains: Vec<String>,
    /// Timestamp as localized by the store (header offset preserved).
    pub received: DateTime<FixedOffset>,
}

/// A full message body as returned by the second scan pass.
///
/// `raw` is `None` when the server answered for the UID without a body section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub uid: u32,
    pub raw: Option<Vec<u8>>,
}

/// Inclusive range of sequence positions to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqWindow {
    pub first: u32,
    pub last: u32,
}

impl SeqWindow {
    /// Compute the scan window for a mailbox of `total` messages.
    ///
    /// `limit == 0` scans the whole mailbox; otherwise the last
    /// `min(limit, total)` positions. Returns `None` for an empty mailbox.
    pub fn for_mailbox(total: u32, limit: usize) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let first = match u32::try_from(limit) {
            Ok(0) => 1,
            Ok(limit) if limit < total => total - limit + 1,
            _ => 1,
        };
        Some(Self { first, last: total })
    }

    /// Number of positions covered. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        (self.last - self.first + 1) as usize
    }

    /// IMAP sequence-set notation (`first:last`).
    pub fn to_sequence_set(&self) -> String {
        format!("{}:{}", self.first, self.last)
    }
}

/// Ordered, duplicate-free set of candidate UIDs.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    order: Vec<u32>,
    seen: HashSet<u32>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a UID. Returns `false` if it was already present.
    pub fn insert(&mut self, uid: u32) -> bool {
        if !self.seen.insert(uid) {
            return false;
        }
        self.order.push(uid);
        true
    }

    pub fn contains(&self, uid: u32) -> bool {
        self.seen.contains(&uid)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// UIDs in insertion order.
    pub fn uids(&self) -> &[u32] {
        &self.order
    }
}

/// A matched message whose HTML body was located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInvoiceDocument {
    pub metadata: MessageMetadata,
    pub html: String,
}

/// Extract the domain part of every address in a parsed address header.
///
/// Addresses without an `@` are skipped.
pub fn sender_domains(addr: Option<&mail_parser::Address>) -> Vec<String> {
    let Some(addr) = addr else {
        return Vec::new();
    };
    let domain = |a: &mail_parser::Addr| {
        a.address
            .as_ref()
            .and_then(|s| s.rsplit_once('@'))
            .map(|(_, host)| host.to_string())
    };
    match addr {
        mail_parser::Address::List(addrs) => addrs.iter().filter_map(domain).collect(),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter().filter_map(domain))
            .collect(),
    }
}
