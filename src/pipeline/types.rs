//! Shared types for a pipeline run.

use uuid::Uuid;

/// Stage of a run. Item processing alternates between `Transforming` and
/// `Rendering` once per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Scanning,
    Transforming,
    Rendering,
    /// An item was dropped; the run continues with the next one.
    PartialFailure,
    Delivering,
    Done,
}

impl RunState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Transforming => "transforming",
            Self::Rendering => "rendering",
            Self::PartialFailure => "partial_failure",
            Self::Delivering => "delivering",
            Self::Done => "done",
        }
    }
}

/// A rendered document with its attachment name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedArtifact {
    pub filename: String,
    pub payload: Vec<u8>,
}

/// Stage at which a single invoice was dropped from the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Transform,
    Render,
}

impl FailureStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Render => "render",
        }
    }
}

/// An invoice excluded from the run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Position of the document in the scanned set.
    pub index: usize,
    pub stage: FailureStage,
    pub reason: String,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Metadata items seen in the scan window.
    pub scanned: usize,
    /// Distinct messages that matched the filter.
    pub candidates: usize,
    /// Candidates whose HTML body was extracted.
    pub documents: usize,
    /// Attachment names, in processing order.
    pub artifacts: Vec<String>,
    pub failures: Vec<ItemFailure>,
    /// Whether the outbound message was sent.
    pub delivered: bool,
}

impl RunReport {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            scanned: 0,
            candidates: 0,
            documents: 0,
            artifacts: Vec::new(),
            failures: Vec::new(),
            delivered: false,
        }
    }
}
