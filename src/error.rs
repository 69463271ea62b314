//! Error types for the polyword library.
//!
//! A single fatal error type, [`PolywordError`], covers every stage of the
//! pipeline. A run either produces all four artifacts or fails with one of
//! these; there is no partial-success report. Variants are grouped by the
//! collaborator that failed so the HTTP layer can map the two classes it
//! cares about (validation, not-found) and surface everything else verbatim.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T, E = PolywordError> = std::result::Result<T, E>;

/// All fatal errors returned by the polyword library.
#[derive(Debug, Error)]
pub enum PolywordError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Uploaded or referenced file is not a PDF.
    #[error("Only PDF files are allowed (got '{filename}')")]
    NotAPdf { filename: String },

    /// A `gs://bucket/path` reference could not be parsed.
    #[error("Invalid document reference '{input}': expected gs://<bucket>/<path>")]
    InvalidReference { input: String },

    /// A required request field was missing or empty.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// The requested object does not exist in the bucket.
    #[error("File not found: gs://{bucket}/{path}")]
    NotFound { bucket: String, path: String },

    /// The object store rejected or failed a request.
    #[error("Storage {operation} failed for gs://{bucket}/{path}: {message}")]
    Storage {
        operation: &'static str,
        bucket: String,
        path: String,
        message: String,
    },

    /// A local file could not be read, written or removed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The OCR service rejected the request or the operation finished with an error.
    #[error("OCR request failed: {message}")]
    Ocr { message: String },

    /// The OCR operation did not finish within the wait bound.
    #[error("OCR operation '{operation}' did not finish within {secs}s")]
    OcrTimeout { operation: String, secs: u64 },

    /// An OCR result shard was not valid JSON of the expected shape.
    #[error("Malformed OCR result '{object}': {detail}")]
    MalformedOcrResult { object: String, detail: String },

    // ── Translation errors ────────────────────────────────────────────────
    /// The translation service returned an error or an unexpected payload.
    #[error("Translation to '{target}' failed: {message}")]
    Translation { target: String, message: String },

    // ── Refinement errors ─────────────────────────────────────────────────
    /// The configured LLM provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Render errors ─────────────────────────────────────────────────────
    /// Markdown could not be rendered to PDF.
    #[error("PDF rendering failed: {0}")]
    Render(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Google credentials could not be loaded or a token could not be minted.
    #[error("Google Cloud authentication failed: {0}")]
    Auth(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PolywordError {
    /// True for errors caused by the caller's input, rejected before any remote call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PolywordError::NotAPdf { .. }
                | PolywordError::InvalidReference { .. }
                | PolywordError::InvalidInput(_)
        )
    }

    /// True when a requested stored object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PolywordError::NotFound { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PolywordError::Io {
            path: path.into(),
            source,
        }
    }
}
