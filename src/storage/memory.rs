//! In-process object store.

use super::{ObjectHandle, ObjectStore, TEXT_CONTENT_TYPE};
use crate::error::{PolywordError, Result};
use crate::reference::DocumentRef;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// [`ObjectStore`] holding objects in a map keyed by `(bucket, name)`.
///
/// Listing returns names in lexicographic order, like GCS does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly, bypassing the trait.
    pub fn insert(&self, bucket: &str, name: &str, bytes: impl Into<Vec<u8>>, content_type: &str) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(
                (bucket.to_string(), name.to_string()),
                StoredObject {
                    bytes: bytes.into(),
                    content_type: content_type.to_string(),
                },
            );
        }
    }

    /// Stored object bytes, if present.
    pub fn get(&self, bucket: &str, name: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .ok()?
            .get(&(bucket.to_string(), name.to_string()))
            .map(|o| o.bytes.clone())
    }

    /// All object names in `bucket`, sorted.
    pub fn names(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .map(|objects| {
                objects
                    .keys()
                    .filter(|(b, _)| b == bucket)
                    .map(|(_, n)| n.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn poisoned(operation: &'static str, bucket: &str, path: &str) -> PolywordError {
        PolywordError::Storage {
            operation,
            bucket: bucket.to_string(),
            path: path.to_string(),
            message: "store lock poisoned".to_string(),
        }
    }

    fn put(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<DocumentRef> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| Self::poisoned("upload", bucket, path))?;
        objects.insert(
            (bucket.to_string(), path.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(DocumentRef::new(bucket, path))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload_file(
        &self,
        local_path: &Path,
        bucket: &str,
        dest_path: &str,
        content_type: &str,
    ) -> Result<DocumentRef> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| PolywordError::io(local_path, e))?;
        self.put(bucket, dest_path, bytes, content_type)
    }

    async fn save_text(&self, bucket: &str, dest_path: &str, text: &str) -> Result<DocumentRef> {
        self.put(bucket, dest_path, text.as_bytes().to_vec(), TEXT_CONTENT_TYPE)
    }

    async fn list_by_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectHandle>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| Self::poisoned("list", bucket, prefix))?;
        Ok(objects
            .iter()
            .filter(|((b, name), _)| b == bucket && name.starts_with(prefix))
            .map(|((b, name), object)| ObjectHandle {
                bucket: b.clone(),
                name: name.clone(),
                size: Some(object.bytes.len() as u64),
                content_type: Some(object.content_type.clone()),
            })
            .collect())
    }

    async fn download_text(&self, handle: &ObjectHandle) -> Result<String> {
        let bytes = self.download_bytes(&handle.bucket, &handle.name).await?;
        String::from_utf8(bytes).map_err(|e| PolywordError::Storage {
            operation: "download",
            bucket: handle.bucket.clone(),
            path: handle.name.clone(),
            message: format!("not UTF-8: {e}"),
        })
    }

    async fn download_bytes(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        self.get(bucket, path).ok_or_else(|| PolywordError::NotFound {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn save_then_download_text() {
        let store = MemoryStore::new();
        let r = store.save_text("b", "results/original_text.txt", "héllo").await.unwrap();
        assert_eq!(r.uri(), "gs://b/results/original_text.txt");
        let text = store
            .download_text(&ObjectHandle::new("b", "results/original_text.txt"))
            .await
            .unwrap();
        assert_eq!(text, "héllo");
    }

    #[tokio::test]
    async fn listing_is_prefix_scoped_and_sorted() {
        let store = MemoryStore::new();
        store.insert("b", "ocr/output-2-to-2.json", "{}", "application/json");
        store.insert("b", "ocr/output-1-to-1.json", "{}", "application/json");
        store.insert("b", "other/x.json", "{}", "application/json");
        store.insert("c", "ocr/output-3-to-3.json", "{}", "application/json");

        let names: Vec<String> = store
            .list_by_prefix("b", "ocr/")
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, vec!["ocr/output-1-to-1.json", "ocr/output-2-to-2.json"]);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let err = MemoryStore::new().download_bytes("b", "nope.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn upload_file_reads_local_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.4").unwrap();
        let store = MemoryStore::new();
        store
            .upload_file(file.path(), "b", "uploads/a.pdf", super::super::PDF_CONTENT_TYPE)
            .await
            .unwrap();
        assert_eq!(store.get("b", "uploads/a.pdf").unwrap(), b"%PDF-1.4");
    }
}
