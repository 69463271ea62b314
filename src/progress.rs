//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its five stages. The CLI drives a
//! spinner from these; [`crate::worker`] forwards them into a channel so an
//! interactive caller can watch a run that executes on another task.
//!
//! # Example
//!
//! ```rust
//! use polyword::{PipelineConfig, PipelineProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: Stage, _artifact: Option<&polyword::DocumentRef>) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{stage} done ({done}/{})", Stage::ALL.len());
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::reference::{DocumentRef, PipelineResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Asynchronous OCR over the source document.
    Detect,
    /// Assembling the OCR shards into one text and storing it.
    Extract,
    /// Machine translation.
    Translate,
    /// LLM refinement into markdown.
    Refine,
    /// Markdown → PDF and upload.
    Render,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Detect,
        Stage::Extract,
        Stage::Translate,
        Stage::Refine,
        Stage::Render,
    ];

    /// 1-based position in the pipeline.
    pub fn position(self) -> usize {
        Stage::ALL.iter().position(|s| *s == self).unwrap_or(0) + 1
    }

    /// Stable machine name, the same one stage events serialise with.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Detect => "detect",
            Stage::Extract => "extract",
            Stage::Translate => "translate",
            Stage::Refine => "refine",
            Stage::Render => "render",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Detect => "Running OCR",
            Stage::Extract => "Extracting text",
            Stage::Translate => "Translating",
            Stage::Refine => "Refining",
            Stage::Render => "Rendering PDF",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called by the pipeline as it moves through each stage.
///
/// Implementations must be `Send + Sync`: a run may execute on a worker task
/// while events are consumed elsewhere. All methods default to no-ops.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called just before a stage issues its first remote call.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes. `artifact` is the object the stage wrote,
    /// if it wrote one (detect writes a prefix, not a single object).
    fn on_stage_complete(&self, stage: Stage, artifact: Option<&DocumentRef>) {
        let _ = (stage, artifact);
    }

    /// Called once after all four artifacts are stored.
    fn on_run_complete(&self, result: &PipelineResult) {
        let _ = result;
    }

    /// Called once when a stage fails and the run is aborted.
    fn on_run_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
