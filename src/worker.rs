//! Run a pipeline on a background task and watch it from the caller.
//!
//! [`spawn_run`] moves one pipeline run onto its own tokio task and returns
//! a [`RunHandle`]: stage events arrive on an unbounded channel while the
//! run proceeds, and the final result comes out of [`RunHandle::wait`]. The
//! CLI uses this to drive its spinner.

use crate::error::{PolywordError, Result};
use crate::processor::DocumentPipeline;
use crate::progress::{PipelineProgressCallback, ProgressCallback, Stage};
use crate::reference::{DocumentRef, PipelineResult};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Everything a run needs besides the pipeline itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub source: DocumentRef,
    pub bucket: String,
    pub output_prefix: String,
    pub target_language: String,
}

/// A progress event forwarded from the running pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    StageStarted {
        stage: Stage,
    },
    StageCompleted {
        stage: Stage,
        artifact: Option<String>,
    },
    Failed {
        stage: Stage,
        message: String,
    },
    Finished,
}

struct ChannelProgress {
    tx: mpsc::UnboundedSender<PipelineEvent>,
    inner: Option<ProgressCallback>,
}

impl PipelineProgressCallback for ChannelProgress {
    fn on_stage_start(&self, stage: Stage) {
        let _ = self.tx.send(PipelineEvent::StageStarted { stage });
        if let Some(cb) = &self.inner {
            cb.on_stage_start(stage);
        }
    }

    fn on_stage_complete(&self, stage: Stage, artifact: Option<&DocumentRef>) {
        let _ = self.tx.send(PipelineEvent::StageCompleted {
            stage,
            artifact: artifact.map(DocumentRef::uri),
        });
        if let Some(cb) = &self.inner {
            cb.on_stage_complete(stage, artifact);
        }
    }

    fn on_run_complete(&self, result: &PipelineResult) {
        let _ = self.tx.send(PipelineEvent::Finished);
        if let Some(cb) = &self.inner {
            cb.on_run_complete(result);
        }
    }

    fn on_run_error(&self, stage: Stage, error: &str) {
        let _ = self.tx.send(PipelineEvent::Failed {
            stage,
            message: error.to_string(),
        });
        if let Some(cb) = &self.inner {
            cb.on_run_error(stage, error);
        }
    }
}

/// Handle on a run executing in the background.
pub struct RunHandle {
    pub events: mpsc::UnboundedReceiver<PipelineEvent>,
    join: JoinHandle<Result<PipelineResult>>,
}

impl RunHandle {
    /// Next event, or `None` once the run has ended and the channel drained.
    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end.
    pub async fn wait(self) -> Result<PipelineResult> {
        self.join
            .await
            .map_err(|e| PolywordError::Internal(format!("pipeline task failed: {e}")))?
    }
}

/// Start `request` on a new task. Any progress callback already configured
/// on `pipeline` still receives every event.
pub fn spawn_run(pipeline: Arc<DocumentPipeline>, request: RunRequest) -> RunHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let inner = pipeline.config().progress_callback.clone();
    let pipeline = pipeline.with_progress_callback(Arc::new(ChannelProgress { tx, inner }));

    let join = tokio::spawn(async move {
        pipeline
            .run(
                &request.source,
                &request.bucket,
                &request.output_prefix,
                &request.target_language,
            )
            .await
    });

    RunHandle { events: rx, join }
}
