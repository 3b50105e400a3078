//! Run driver: scan, then transform, render and name each invoice, then
//! deliver everything in one message.
//!
//! Items are processed one at a time in scan order. A failure while
//! transforming or rendering moves the run to `PartialFailure` and drops
//! only that item. Transport and delivery failures end the run.

use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::delivery::{Deliverer, OutgoingMail};
use crate::error::Result;
use crate::events::{EventSink, PipelineEvent};
use crate::mailbox::scanner::run_blocking;
use crate::mailbox::{FilterRule, MailStore, MailboxScanner, RawInvoiceDocument, Scan};
use crate::naming::NamingStrategy;
use crate::pipeline::types::{FailureStage, ItemFailure, NamedArtifact, RunReport, RunState};
use crate::render::Renderer;
use crate::transform::{HtmlTransformer, ImageFetcher};

/// Per-run inputs that come from configuration.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub filter: FilterRule,
    pub naming: NamingStrategy,
    pub mail: OutgoingMail,
}

/// Composes the scan, transform, render and delivery stages.
pub struct Pipeline<F, R, D> {
    settings: RunSettings,
    transformer: HtmlTransformer<F>,
    renderer: R,
    deliverer: D,
    events: Arc<dyn EventSink>,
}

impl<F, R, D> Pipeline<F, R, D>
where
    F: ImageFetcher,
    R: Renderer,
    D: Deliverer,
{
    pub fn new(
        settings: RunSettings,
        transformer: HtmlTransformer<F>,
        renderer: R,
        deliverer: D,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            settings,
            transformer,
            renderer,
            deliverer,
            events,
        }
    }

    /// Execute one run against `store`, evaluating recency relative to `now`.
    ///
    /// Finding nothing, or losing every invoice to per-item failures, is a
    /// successful run with no delivery.
    pub async fn run<S: MailStore>(&self, store: S, now: DateTime<Local>) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.execute(store, now, RunReport::new(run_id))
            .instrument(span)
            .await
    }

    async fn execute<S: MailStore>(
        &self,
        store: S,
        now: DateTime<Local>,
        mut report: RunReport,
    ) -> Result<RunReport> {
        let mut state = RunState::Idle;
        self.advance(&mut state, RunState::Scanning);

        let scanner = MailboxScanner::new(&self.settings.filter, now, self.events.as_ref());
        let Scan {
            store,
            documents,
            scanned,
            candidates,
        } = scanner.scan(store).await?;
        report.scanned = scanned;
        report.candidates = candidates;
        report.documents = documents.len();
        logout(store).await;

        if documents.is_empty() {
            info!(scanned, candidates, "No invoices to process");
            self.advance(&mut state, RunState::Done);
            return Ok(report);
        }
        info!(count = documents.len(), "Processing invoices");

        let artifacts = self.process(&mut state, documents, &mut report).await;
        if artifacts.is_empty() {
            info!("No PDFs generated");
            self.advance(&mut state, RunState::Done);
            return Ok(report);
        }

        self.advance(&mut state, RunState::Delivering);
        self.deliverer
            .deliver(&self.settings.mail, &artifacts)
            .await?;
        report.delivered = true;
        self.events.emit(PipelineEvent::Delivered {
            attachments: artifacts.len(),
            to: self.settings.mail.to.clone(),
        });

        self.advance(&mut state, RunState::Done);
        Ok(report)
    }

    /// Transform, render and name every document, keeping the survivors.
    async fn process(
        &self,
        state: &mut RunState,
        documents: Vec<RawInvoiceDocument>,
        report: &mut RunReport,
    ) -> Vec<NamedArtifact> {
        let total = documents.len();
        let mut artifacts = Vec::with_capacity(total);

        for (index, document) in documents.into_iter().enumerate() {
            let uid = document.metadata.uid;
            self.advance(state, RunState::Transforming);
            let transformed = match self
                .transformer
                .transform(document, self.events.as_ref())
                .await
            {
                Ok(transformed) => transformed,
                Err(e) => {
                    self.fail(state, report, index, FailureStage::Transform, e.to_string());
                    continue;
                }
            };

            self.advance(state, RunState::Rendering);
            let payload = match self.renderer.render(&transformed.html).await {
                Ok(payload) => payload,
                Err(e) => {
                    self.fail(state, report, index, FailureStage::Render, e.to_string());
                    continue;
                }
            };

            let filename = self.settings.naming.name(&transformed, index, total);
            debug!(uid, filename = %filename, "Invoice named");
            self.events.emit(PipelineEvent::ArtifactReady {
                filename: filename.clone(),
                bytes: payload.len(),
            });
            report.artifacts.push(filename.clone());
            artifacts.push(NamedArtifact { filename, payload });
        }
        artifacts
    }

    fn advance(&self, state: &mut RunState, next: RunState) {
        if *state == next {
            return;
        }
        self.events.emit(PipelineEvent::StateChanged {
            from: *state,
            to: next,
        });
        *state = next;
    }

    fn fail(
        &self,
        state: &mut RunState,
        report: &mut RunReport,
        index: usize,
        stage: FailureStage,
        reason: String,
    ) {
        self.advance(state, RunState::PartialFailure);
        self.events.emit(PipelineEvent::ItemFailed {
            index,
            stage: stage.label(),
            reason: reason.clone(),
        });
        report.failures.push(ItemFailure {
            index,
            stage,
            reason,
        });
    }
}

/// End the mailbox session. Failures only matter for logging.
async fn logout<S: MailStore>(store: S) {
    let result = run_blocking(store, |s| {
        s.logout();
        Ok(())
    })
    .await;
    if let Err(e) = result {
        debug!(error = %e, "Mailbox logout failed");
    }
}
