//! # polyword
//!
//! Translate scanned PDF documents with managed cloud services.
//!
//! A PDF stored in a bucket is OCR'd, the recovered text is machine
//! translated, an LLM rewrites the translation into clean markdown, and the
//! markdown is rendered back into a PDF. Every intermediate text is stored
//! next to the result, so a run leaves four artifacts behind.
//!
//! ## Pipeline Overview
//!
//! ```text
//! gs://bucket/uploads/scan.pdf
//!  │
//!  ├─ 1. Detect     asynchronous OCR (Cloud Vision), JSON shards under <prefix>/
//!  ├─ 2. Extract    shards → <prefix>/original_text.txt
//!  ├─ 3. Translate  Cloud Translation → <prefix>/translated_text_<lang>.txt
//!  ├─ 4. Refine     LLM chat (gpt-4o-mini, …) → <prefix>/refined_text_<lang>.txt
//!  └─ 5. Render     markdown → PDF → <prefix>/refined_text_<lang>.pdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use polyword::{Credentials, DocumentPipeline, DocumentRef, PipelineConfig, ServiceEndpoints};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Google credentials from GOOGLE_APPLICATION_CREDENTIALS, LLM key from OPENAI_API_KEY
//!     let pipeline = DocumentPipeline::connect(
//!         PipelineConfig::default(),
//!         &ServiceEndpoints::default(),
//!         &Credentials::from_env(),
//!     )
//!     .await?;
//!
//!     let source: DocumentRef = "gs://polyword-bucket/uploads/scan.pdf".parse()?;
//!     let result = pipeline.run(&source, "polyword-bucket", "results", "en").await?;
//!     println!("{}", result.refined_pdf);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `server` | on | HTTP API (axum + tower-http) |
//! | `cli`    | on | The `polyword` binary (clap + anyhow + tracing-subscriber) |
//! | `test-export-mocks` | on | Export the mockall `Mock*` client types |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod prompts;
pub mod reference;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;
pub mod worker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Credentials, PipelineConfig, PipelineConfigBuilder, ServiceEndpoints};
pub use error::{PolywordError, Result};
pub use processor::DocumentPipeline;
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
pub use reference::{DocumentRef, PipelineResult};
pub use storage::{GcsStore, MemoryStore, ObjectHandle, ObjectStore};
pub use worker::{spawn_run, PipelineEvent, RunHandle, RunRequest};
