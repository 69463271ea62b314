//! Pipeline stages for PDF translation.
//!
//! Each submodule wraps exactly one external collaborator behind a narrow
//! trait so the orchestrator in [`crate::processor`] can be exercised with
//! mocks. None of them retries; a failure aborts the run.
//!
//! ## Data Flow
//!
//! ```text
//! source PDF ──▶ ocr::detect ──▶ ocr::extract_text ──▶ translate ──▶ refine ──▶ render
//!  (gs://)       (Vision LRO)     (JSON shards)        (Translate)  (LLM)      (printpdf)
//! ```
//!
//! 1. [`ocr`]: submit asynchronous OCR and wait for it, then assemble
//!    the per-page text from the JSON shards it wrote
//! 2. [`translate`]: one machine-translation request for the whole text
//! 3. [`refine`]: one chat completion that rewrites the translation as
//!    grammatical markdown
//! 4. [`render`]: markdown → PDF with bookmarks for the upper headings

pub mod ocr;
pub mod refine;
pub mod render;
pub mod translate;
