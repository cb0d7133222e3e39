//! Markdown to PDF render pipeline.
//!
//! Content stages (`service`, `embed`, `assemble`) are pure and synchronous.
//! The driver owns everything with side effects: the job directory, the
//! browser session behind the [`RenderEngine`] seam and the registry entry
//! that makes a job cancellable.

mod assemble;
mod driver;
mod embed;
mod engine;
mod runtime;
mod service;
mod types;
mod wait;

pub use assemble::{AssetBase, DocumentOptions, assemble};
pub use driver::{DocumentSource, DriverConfig, PreparedDocument, RenderDriver, unix_millis};
pub use embed::{EmbedMode, EmbedStats, embed, missing_image_placeholder};
pub use engine::{
    EngineError, EngineHandle, EngineSession, LaunchOptions, PrintOptions, RenderEngine, Viewport,
};
pub use runtime::{AbortedJob, CancelOutcome, JobAborted, JobRegistry, JobTicket, MarkOutcome};
pub use service::{MarkdownTransformer, TransformOptions, Transformed, transformer};
pub use types::{JobPhase, PdfResult, RenderError};
pub use wait::{MEASURE_HEIGHT, TYPESET_MATH, WaitBudget, WaitCondition, WaitOutcome, wait};
