//! Two-pass mailbox scan.
//!
//! Pass 1 fetches metadata for the scan window and filters it as it
//! streams in. Pass 2 fetches full bodies only for the candidates and
//! extracts their HTML. Only transport failures abort the scan; a candidate
//! whose body is missing or has no HTML part is reported and skipped.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;
use crate::events::{EventSink, PipelineEvent};
use crate::mailbox::extract::extract_html;
use crate::mailbox::filter::{FilterRule, matches};
use crate::mailbox::types::{CandidateSet, MessageMetadata, RawInvoiceDocument, SeqWindow};
use crate::mailbox::MailStore;

/// Capacity of the queue between the store reader and the consumer.
const QUEUE_DEPTH: usize = 32;

/// Result of a completed scan. Gives the store back for logout.
pub struct Scan<S> {
    pub store: S,
    pub documents: Vec<RawInvoiceDocument>,
    /// Metadata items received in pass 1.
    pub scanned: usize,
    /// Distinct candidates selected in pass 1.
    pub candidates: usize,
}

/// Runs the two-pass protocol against a [`MailStore`].
pub struct MailboxScanner<'a> {
    rule: &'a FilterRule,
    now: DateTime<Local>,
    events: &'a dyn EventSink,
}

impl<'a> MailboxScanner<'a> {
    pub fn new(rule: &'a FilterRule, now: DateTime<Local>, events: &'a dyn EventSink) -> Self {
        Self { rule, now, events }
    }

    /// Scan `store` and return the matching invoice documents.
    ///
    /// The mailbox size is observed once; messages arriving afterwards are
    /// not part of this run's window.
    pub async fn scan<S: MailStore>(&self, store: S) -> Result<Scan<S>, TransportError> {
        let (mut store, total) = run_blocking(store, |s| s.message_count()).await?;
        self.events.emit(PipelineEvent::MailboxOpened { total });

        let Some(window) = SeqWindow::for_mailbox(total, self.rule.window) else {
            return Ok(Scan {
                store,
                documents: Vec::new(),
                scanned: 0,
                candidates: 0,
            });
        };
        self.events.emit(PipelineEvent::WindowSelected {
            first: window.first,
            last: window.last,
        });

        let (returned, scanned, candidates, metadata) = self.select_candidates(store, window).await?;
        store = returned;
        if candidates.is_empty() {
            return Ok(Scan {
                store,
                documents: Vec::new(),
                scanned,
                candidates: 0,
            });
        }

        let candidate_count = candidates.len();
        let (store, documents) = self.fetch_documents(store, &candidates, metadata).await?;
        Ok(Scan {
            store,
            documents,
            scanned,
            candidates: candidate_count,
        })
    }

    /// Pass 1: stream metadata for `window` and keep the matches.
    async fn select_candidates<S: MailStore>(
        &self,
        store: S,
        window: SeqWindow,
    ) -> Result<(S, usize, CandidateSet, HashMap<u32, MessageMetadata>), TransportError> {
        let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);
        let producer = tokio::task::spawn_blocking(move || {
            let mut store = store;
            let result = store.fetch_metadata(window, &tx);
            (store, result)
        });

        let mut scanned = 0;
        let mut candidates = CandidateSet::new();
        let mut metadata = HashMap::new();
        while let Some(meta) = rx.recv().await {
            scanned += 1;
            if !matches(&meta, self.rule, &self.now) {
                continue;
            }
            if candidates.insert(meta.uid) {
                self.events.emit(PipelineEvent::CandidateFound {
                    uid: meta.uid,
                    subject: meta.subject.clone(),
                });
                metadata.insert(meta.uid, meta);
            } else {
                debug!(uid = meta.uid, "Duplicate metadata for candidate ignored");
            }
        }

        let (store, result) = producer
            .await
            .map_err(|e| TransportError::Worker(e.to_string()))?;
        result?;
        Ok((store, scanned, candidates, metadata))
    }

    /// Pass 2: fetch bodies for the candidates and extract their HTML.
    async fn fetch_documents<S: MailStore>(
        &self,
        store: S,
        candidates: &CandidateSet,
        mut metadata: HashMap<u32, MessageMetadata>,
    ) -> Result<(S, Vec<RawInvoiceDocument>), TransportError> {
        let uids = candidates.uids().to_vec();
        let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);
        let producer = tokio::task::spawn_blocking(move || {
            let mut store = store;
            let result = store.fetch_bodies(&uids, &tx);
            (store, result)
        });

        let mut pending: HashSet<u32> = candidates.uids().iter().copied().collect();
        let mut documents = Vec::new();
        while let Some(body) = rx.recv().await {
            if !pending.remove(&body.uid) {
                debug!(uid = body.uid, "Ignoring body for unknown or already handled UID");
                continue;
            }
            let Some(raw) = body.raw else {
                self.skip_body(body.uid, "no body returned");
                continue;
            };
            let html = match extract_html(&raw) {
                Ok(html) => html,
                Err(e) => {
                    self.skip_body(body.uid, &e.to_string());
                    continue;
                }
            };
            if let Some(meta) = metadata.remove(&body.uid) {
                documents.push(RawInvoiceDocument {
                    metadata: meta,
                    html,
                });
            }
        }

        let (store, result) = producer
            .await
            .map_err(|e| TransportError::Worker(e.to_string()))?;
        result?;

        let mut missing: Vec<u32> = pending.into_iter().collect();
        missing.sort_unstable();
        for uid in missing {
            self.skip_body(uid, "not returned by server");
        }
        Ok((store, documents))
    }

    fn skip_body(&self, uid: u32, reason: &str) {
        self.events.emit(PipelineEvent::BodySkipped {
            uid,
            reason: reason.to_string(),
        });
    }
}

/// Run a blocking store call on the blocking pool and hand the store back.
pub(crate) async fn run_blocking<S, T, F>(store: S, call: F) -> Result<(S, T), TransportError>
where
    S: MailStore,
    T: Send + 'static,
    F: FnOnce(&mut S) -> Result<T, TransportError> + Send + 'static,
{
    let (store, result) = tokio::task::spawn_blocking(move || {
        let mut store = store;
        let result = call(&mut store);
        (store, result)
    })
    .await
    .map_err(|e| TransportError::Worker(e.to_string()))?;
    Ok((store, result?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::FixedOffset;

    use crate::events::RecordingSink;
    use crate::mailbox::filter::Recency;
    use crate::mailbox::types::FetchedBody;

    /// In-memory store that records every request it serves.
    #[derive(Default)]
    struct MemoryStore {
        messages: Vec<MessageMetadata>,
        bodies: HashMap<u32, Option<Vec<u8>>>,
        duplicate_metadata: bool,
        fail_bodies: bool,
        metadata_served: usize,
        body_requests: Vec<Vec<u32>>,
    }

    impl MailStore for MemoryStore {
        fn message_count(&mut self) -> Result<u32, TransportError> {
            Ok(self.messages.len() as u32)
        }

        fn fetch_metadata(
            &mut self,
            window: SeqWindow,
            sink: &mpsc::Sender<MessageMetadata>,
        ) -> Result<(), TransportError> {
            for meta in &self.messages {
                if meta.sequence < window.first || meta.sequence > window.last {
                    continue;
                }
                self.metadata_served += 1;
                sink.blocking_send(meta.clone()).ok();
                if self.duplicate_metadata {
                    sink.blocking_send(meta.clone()).ok();
                }
            }
            Ok(())
        }

        fn fetch_bodies(
            &mut self,
            uids: &[u32],
            sink: &mpsc::Sender<FetchedBody>,
        ) -> Result<(), TransportError> {
            self.body_requests.push(uids.to_vec());
            if self.fail_bodies {
                return Err(TransportError::Closed);
            }
            // Answer in reverse order to exercise out-of-order arrival.
            for uid in uids.iter().rev() {
                if let Some(raw) = self.bodies.get(uid) {
                    sink.blocking_send(FetchedBody {
                        uid: *uid,
                        raw: raw.clone(),
                    })
                    .ok();
                }
            }
            Ok(())
        }
    }

    fn now() -> DateTime<Local> {
        Local::now()
    }

    fn this_month() -> DateTime<FixedOffset> {
        now().fixed_offset()
    }

    fn rule(window: usize) -> FilterRule {
        FilterRule {
            subject: "Deine Rechnung von Apple".into(),
            sender_domain: "apple.com".into(),
            recency: Recency::CurrentMonth,
            window,
        }
    }

    fn invoice(sequence: u32, subject: &str) -> MessageMetadata {
        MessageMetadata {
            uid: sequence + 100,
            sequence,
            subject: subject.into(),
            sender_domains: vec!["email.apple.com".into()],
            received: this_month(),
        }
    }

    fn html_body(text: &str) -> Option<Vec<u8>> {
        Some(
            format!("Subject: x\r\nContent-Type: text/html\r\n\r\n<p>{text}</p>\r\n").into_bytes(),
        )
    }

    #[tokio::test]
    async fn empty_mailbox_skips_both_passes() {
        let sink = RecordingSink::new();
        let r = rule(0);
        let scan = MailboxScanner::new(&r, now(), &sink)
            .scan(MemoryStore::default())
            .await
            .unwrap();
        assert!(scan.documents.is_empty());
        assert_eq!(scan.store.metadata_served, 0);
        assert!(scan.store.body_requests.is_empty());
    }

    #[tokio::test]
    async fn window_limits_metadata_volume_and_bodies_follow_matches() {
        let mut store = MemoryStore::default();
        store.messages = vec![
            invoice(1, "Deine Rechnung von Apple"),
            invoice(2, "Deine Rechnung von Apple"),
            invoice(3, "Newsletter"),
            invoice(4, "Deine Rechnung von Apple"),
            invoice(5, "Something else"),
            invoice(6, "Deine Rechnung von Apple"),
        ];
        for uid in [101, 102, 104, 106] {
            store.bodies.insert(uid, html_body("Rechnung"));
        }

        let sink = RecordingSink::new();
        let r = rule(5);
        let scan = MailboxScanner::new(&r, now(), &sink)
            .scan(store)
            .await
            .unwrap();

        assert_eq!(scan.scanned, 5);
        assert_eq!(scan.store.metadata_served, 5);
        assert_eq!(scan.candidates, 3);
        assert_eq!(scan.store.body_requests, vec![vec![102, 104, 106]]);
        let mut uids: Vec<u32> = scan.documents.iter().map(|d| d.metadata.uid).collect();
        uids.sort_unstable();
        assert_eq!(uids, vec![102, 104, 106]);
    }

    #[tokio::test]
    async fn duplicate_metadata_yields_unique_candidates() {
        let mut store = MemoryStore {
            duplicate_metadata: true,
            ..MemoryStore::default()
        };
        store.messages = vec![invoice(1, "Deine Rechnung von Apple")];
        store.bodies.insert(101, html_body("once"));

        let sink = RecordingSink::new();
        let r = rule(0);
        let scan = MailboxScanner::new(&r, now(), &sink)
            .scan(store)
            .await
            .unwrap();

        assert_eq!(scan.scanned, 2);
        assert_eq!(scan.candidates, 1);
        assert_eq!(scan.store.body_requests, vec![vec![101]]);
        assert_eq!(scan.documents.len(), 1);
    }

    #[tokio::test]
    async fn no_matches_never_fetches_bodies() {
        let mut store = MemoryStore::default();
        store.messages = vec![invoice(1, "Other"), invoice(2, "Other")];

        let sink = RecordingSink::new();
        let r = rule(0);
        let scan = MailboxScanner::new(&r, now(), &sink)
            .scan(store)
            .await
            .unwrap();

        assert!(scan.documents.is_empty());
        assert!(scan.store.body_requests.is_empty());
    }

    #[tokio::test]
    async fn unusable_candidates_are_skipped_not_fatal() {
        let mut store = MemoryStore::default();
        store.messages = vec![
            invoice(1, "Deine Rechnung von Apple"),
            invoice(2, "Deine Rechnung von Apple"),
            invoice(3, "Deine Rechnung von Apple"),
            invoice(4, "Deine Rechnung von Apple"),
        ];
        store.bodies.insert(101, html_body("good"));
        store.bodies.insert(102, None);
        store.bodies.insert(
            103,
            Some(b"Subject: x\r\nContent-Type: text/plain\r\n\r\nplain\r\n".to_vec()),
        );
        // 104 is never answered by the server.

        let sink = Arc::new(RecordingSink::new());
        let r = rule(0);
        let scan = MailboxScanner::new(&r, now(), sink.as_ref())
            .scan(store)
            .await
            .unwrap();

        assert_eq!(scan.documents.len(), 1);
        assert_eq!(scan.documents[0].metadata.uid, 101);
        let skipped: Vec<u32> = sink
            .warnings()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::BodySkipped { uid, .. } => Some(uid),
                _ => None,
            })
            .collect();
        assert_eq!(skipped.len(), 3);
        assert!(skipped.contains(&102));
        assert!(skipped.contains(&103));
        assert!(skipped.contains(&104));
    }

    #[tokio::test]
    async fn transport_failure_in_body_pass_aborts() {
        let mut store = MemoryStore {
            fail_bodies: true,
            ..MemoryStore::default()
        };
        store.messages = vec![invoice(1, "Deine Rechnung von Apple")];

        let sink = RecordingSink::new();
        let r = rule(0);
        let result = MailboxScanner::new(&r, now(), &sink).scan(store).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
