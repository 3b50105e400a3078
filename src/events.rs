//! Run events and the sinks that observe them.
//!
//! Pipeline stages report what happened through an [`EventSink`] instead of
//! logging directly, so tests can assert on outcomes without capturing logs.

use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::pipeline::types::RunState;

/// Something observable that happened during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    StateChanged { from: RunState, to: RunState },
    MailboxOpened { total: u32 },
    WindowSelected { first: u32, last: u32 },
    CandidateFound { uid: u32, subject: String },
    BodySkipped { uid: u32, reason: String },
    ImageSkipped { url: String, reason: String },
    ItemFailed { index: usize, stage: &'static str, reason: String },
    ArtifactReady { filename: String, bytes: usize },
    Delivered { attachments: usize, to: String },
}

impl PipelineEvent {
    /// Whether this event reports degraded, skipped work.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::BodySkipped { .. }
                | Self::ImageSkipped { .. }
                | Self::ItemFailed { .. }
        )
    }
}

/// Receiver of pipeline events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::StateChanged { from, to } => {
                debug!(from = from.label(), to = to.label(), "Run state changed");
            }
            PipelineEvent::MailboxOpened { total } => {
                info!(total, "Mailbox opened read-only");
            }
            PipelineEvent::WindowSelected { first, last } => {
                info!(first, last, "Scanning message window");
            }
            PipelineEvent::CandidateFound { uid, subject } => {
                info!(uid, subject = %subject, "Found invoice");
            }
            PipelineEvent::BodySkipped { uid, reason } => {
                warn!(uid, reason = %reason, "Skipping invoice body");
            }
            PipelineEvent::ImageSkipped { url, reason } => {
                warn!(url = %url, reason = %reason, "Image left unembedded");
            }
            PipelineEvent::ItemFailed {
                index,
                stage,
                reason,
            } => {
                warn!(index, stage, reason = %reason, "Invoice excluded from run");
            }
            PipelineEvent::ArtifactReady { filename, bytes } => {
                info!(filename = %filename, bytes, "PDF generated");
            }
            PipelineEvent::Delivered { attachments, to } => {
                info!(attachments, to = %to, "Invoice email sent");
            }
        }
    }
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded events.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<PipelineEvent> {
        self.events().into_iter().filter(PipelineEvent::is_warning).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PipelineEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(PipelineEvent::MailboxOpened { total: 3 });
        sink.emit(PipelineEvent::BodySkipped {
            uid: 9,
            reason: "no body".into(),
        });
        assert_eq!(
            sink.events(),
            vec![
                PipelineEvent::MailboxOpened { total: 3 },
                PipelineEvent::BodySkipped {
                    uid: 9,
                    reason: "no body".into(),
                },
            ]
        );
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn tracing_sink_accepts_every_event() {
        let sink = TracingSink;
        sink.emit(PipelineEvent::StateChanged {
            from: RunState::Idle,
            to: RunState::Scanning,
        });
        sink.emit(PipelineEvent::ItemFailed {
            index: 0,
            stage: "render",
            reason: "boom".into(),
        });
    }
}
