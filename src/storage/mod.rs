//! Object store gateway.
//!
//! Every stage hands its output to the next through the object store, so the
//! pipeline only ever talks to the [`ObjectStore`] trait. [`GcsStore`] is the
//! production backend; [`MemoryStore`] keeps objects in process for tests and
//! offline runs.

mod gcs;
mod memory;

pub use gcs::GcsStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::reference::DocumentRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Content type used for every text artifact.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Content type for uploaded sources and rendered output.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// One object as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub bucket: String,
    pub name: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

impl ObjectHandle {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            size: None,
            content_type: None,
        }
    }

    pub fn reference(&self) -> DocumentRef {
        DocumentRef::new(&self.bucket, &self.name)
    }
}

/// Blob storage as seen by the pipeline and the HTTP layer.
///
/// Provider failures are returned as-is, wrapped in
/// [`crate::PolywordError::Storage`]. Nothing here retries.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file to `bucket/dest_path`.
    async fn upload_file(
        &self,
        local_path: &Path,
        bucket: &str,
        dest_path: &str,
        content_type: &str,
    ) -> Result<DocumentRef>;

    /// Store `text` as a UTF-8 object at `bucket/dest_path`.
    async fn save_text(&self, bucket: &str, dest_path: &str, text: &str) -> Result<DocumentRef>;

    /// Every object whose name starts with `prefix`, across all listing pages.
    async fn list_by_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectHandle>>;

    /// Download an object and decode it as UTF-8.
    async fn download_text(&self, handle: &ObjectHandle) -> Result<String>;

    /// Raw object bytes. An absent object is [`crate::PolywordError::NotFound`].
    async fn download_bytes(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;
}
