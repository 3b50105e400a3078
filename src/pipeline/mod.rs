//! Invoice run pipeline.
//!
//! One run flows through:
//! 1. `MailboxScanner::scan()`: metadata pass, filter, body pass
//! 2. `HtmlTransformer::transform()`: inline images, strip chrome
//! 3. `Renderer::render()`: HTML to PDF
//! 4. `NamingStrategy::name()`: attachment file name
//! 5. `Deliverer::deliver()`: one message with every PDF attached

pub mod driver;
pub mod types;

pub use driver::{Pipeline, RunSettings};
pub use types::{FailureStage, ItemFailure, NamedArtifact, RunReport, RunState};
