//! Text extraction: asynchronous document OCR and result assembly.
//!
//! OCR is a two-phase affair. [`TextExtractionGateway::detect`] submits one
//! batch job and waits (bounded) for the long-running operation to finish;
//! the service writes its results as JSON shards under a destination prefix.
//! [`extract_text`] then reads those shards back through the object store and
//! concatenates the per-page text.
//!
//! ## Page order
//!
//! The service names shards `output-<first>-to-<last>.json`. Listings come
//! back lexicographically, which puts `output-1001-to-1100.json` ahead of
//! `output-201-to-300.json`. Shards are therefore ordered by their first page
//! and responses inside a shard by `context.pageNumber`. Both sorts are
//! stable and only applied when every item carries an index; otherwise the
//! listing order stands.

use crate::auth::GoogleAuth;
use crate::config::PipelineConfig;
use crate::error::{PolywordError, Result};
use crate::reference::join_path;
use crate::storage::{ObjectHandle, ObjectStore, PDF_CONTENT_TYPE};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Vision feature requested for every job.
pub const DOCUMENT_TEXT_DETECTION: &str = "DOCUMENT_TEXT_DETECTION";

static SHARD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"output-(\d+)-to-(\d+)\.json$").unwrap());

// ── Client seam ──────────────────────────────────────────────────────────────

/// One asynchronous OCR job over a single document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrRequest {
    /// `gs://` URI of the source document.
    pub source_uri: String,
    /// `gs://` prefix the service writes its JSON shards under.
    pub destination_uri: String,
    pub mime_type: String,
    /// Pages per output shard.
    pub batch_size: u32,
}

/// State of a long-running OCR operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Done,
    Failed(String),
}

/// Submit and poll OCR jobs.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Start a job and return the operation name.
    async fn submit(&self, request: &OcrRequest) -> Result<String>;

    /// Current state of a previously submitted operation.
    async fn poll(&self, operation: &str) -> Result<OperationStatus>;
}

// ── Google Cloud Vision ──────────────────────────────────────────────────────

/// [`OcrClient`] over the Vision `files:asyncBatchAnnotate` REST endpoint.
#[derive(Clone)]
pub struct VisionClient {
    client: Client,
    endpoint: String,
    auth: GoogleAuth,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl VisionClient {
    pub fn new(endpoint: impl Into<String>, auth: GoogleAuth) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn request_body(request: &OcrRequest) -> serde_json::Value {
        json!({
            "requests": [{
                "inputConfig": {
                    "gcsSource": { "uri": request.source_uri },
                    "mimeType": request.mime_type,
                },
                "features": [{ "type": DOCUMENT_TEXT_DETECTION }],
                "outputConfig": {
                    "gcsDestination": { "uri": request.destination_uri },
                    "batchSize": request.batch_size,
                },
            }]
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Operation> {
        let request = self.auth.authorize(request).await?;
        let response = request.send().await.map_err(|e| PolywordError::Ocr {
            message: e.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PolywordError::Ocr {
                message: format!("HTTP {status}: {body}"),
            });
        }
        response.json().await.map_err(|e| PolywordError::Ocr {
            message: format!("unexpected operation payload: {e}"),
        })
    }
}

#[async_trait]
impl OcrClient for VisionClient {
    async fn submit(&self, request: &OcrRequest) -> Result<String> {
        let url = format!("{}/v1/files:asyncBatchAnnotate", self.endpoint);
        debug!("POST {url} for {}", request.source_uri);
        let operation = self
            .send(self.client.post(url).json(&Self::request_body(request)))
            .await?;
        operation.name.ok_or_else(|| PolywordError::Ocr {
            message: "service returned no operation name".to_string(),
        })
    }

    async fn poll(&self, operation: &str) -> Result<OperationStatus> {
        let url = format!("{}/v1/{}", self.endpoint, operation.trim_start_matches('/'));
        let op = self.send(self.client.get(url)).await?;
        Ok(match (op.done, op.error) {
            (_, Some(err)) => OperationStatus::Failed(format!("code {}: {}", err.code, err.message)),
            (true, None) => OperationStatus::Done,
            (false, None) => OperationStatus::Pending,
        })
    }
}

// ── Gateway ──────────────────────────────────────────────────────────────────

/// Submits OCR jobs and waits for them, bounded by the configured timeout.
#[derive(Clone)]
pub struct TextExtractionGateway {
    client: Arc<dyn OcrClient>,
    timeout: Duration,
    poll_interval: Duration,
    batch_size: u32,
}

impl TextExtractionGateway {
    pub fn new(client: Arc<dyn OcrClient>, config: &PipelineConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(config.ocr_timeout_secs),
            poll_interval: Duration::from_millis(config.ocr_poll_interval_ms),
            batch_size: config.ocr_batch_size,
        }
    }

    /// OCR `source_uri` and block until its JSON shards exist under
    /// `destination_uri`. Returns `destination_uri`; the results are not read.
    pub async fn detect(&self, source_uri: &str, destination_uri: &str) -> Result<String> {
        let request = OcrRequest {
            source_uri: source_uri.to_string(),
            destination_uri: destination_uri.to_string(),
            mime_type: PDF_CONTENT_TYPE.to_string(),
            batch_size: self.batch_size,
        };
        let operation = self.client.submit(&request).await?;
        info!("OCR operation {operation} started for {source_uri}");

        let waited = tokio::time::timeout(self.timeout, self.wait_for(&operation)).await;
        match waited {
            Ok(outcome) => outcome?,
            Err(_) => {
                return Err(PolywordError::OcrTimeout {
                    operation,
                    secs: self.timeout.as_secs(),
                })
            }
        }

        info!("OCR operation {operation} completed");
        Ok(destination_uri.to_string())
    }

    async fn wait_for(&self, operation: &str) -> Result<()> {
        loop {
            match self.client.poll(operation).await? {
                OperationStatus::Done => return Ok(()),
                OperationStatus::Failed(message) => return Err(PolywordError::Ocr { message }),
                OperationStatus::Pending => {
                    debug!("OCR operation {operation} still running");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

/// `gs://<bucket>/<prefix>/`, the destination handed to the OCR service.
pub fn destination_uri(bucket: &str, prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("gs://{bucket}/")
    } else {
        format!("gs://{bucket}/{prefix}/")
    }
}

// ── Result assembly ──────────────────────────────────────────────────────────

/// One OCR output shard as written by the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OcrResultDocument {
    #[serde(default)]
    pub responses: Vec<OcrPageResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrPageResponse {
    pub full_text_annotation: Option<FullTextAnnotation>,
    pub context: Option<PageContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FullTextAnnotation {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub uri: Option<String>,
    pub page_number: Option<u32>,
}

/// First page encoded in a shard name, if the name follows the service's scheme.
pub fn shard_start_page(name: &str) -> Option<u32> {
    SHARD_NAME
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Stable sort by an optional index, only when every item carries one.
fn sort_when_indexed<T>(items: &mut [T], key: impl Fn(&T) -> Option<u32>) -> bool {
    if items.iter().all(|i| key(i).is_some()) {
        items.sort_by_key(|i| key(i).unwrap_or(u32::MAX));
        true
    } else {
        false
    }
}

/// Read every `.json` shard directly inside the `prefix` folder and
/// concatenate the page texts, each followed by a blank line. Pages without
/// an annotation add nothing. Sibling prefixes and nested folders (other
/// runs) are not read.
pub async fn extract_text(store: &dyn ObjectStore, bucket: &str, prefix: &str) -> Result<String> {
    let folder = join_path(prefix, "");
    let mut shards: Vec<ObjectHandle> = store
        .list_by_prefix(bucket, &folder)
        .await?
        .into_iter()
        .filter(|h| {
            h.name
                .strip_prefix(&folder)
                .is_some_and(|rest| !rest.contains('/') && rest.ends_with(".json"))
        })
        .collect();

    if !sort_when_indexed(&mut shards, |h| shard_start_page(&h.name)) && shards.len() > 1 {
        warn!("OCR shards under gs://{bucket}/{prefix} carry no page range; using listing order");
    }
    debug!("Assembling {} OCR shards", shards.len());

    let mut text = String::new();
    for shard in &shards {
        let raw = store.download_text(shard).await?;
        let mut document: OcrResultDocument =
            serde_json::from_str(&raw).map_err(|e| PolywordError::MalformedOcrResult {
                object: format!("gs://{}/{}", shard.bucket, shard.name),
                detail: e.to_string(),
            })?;

        sort_when_indexed(&mut document.responses, |r| {
            r.context.as_ref().and_then(|c| c.page_number)
        });

        for annotation in document
            .responses
            .iter()
            .filter_map(|r| r.full_text_annotation.as_ref())
        {
            text.push_str(&annotation.text);
            text.push_str("\n\n");
        }
    }

    info!("Extracted {} chars from {} shards", text.len(), shards.len());
    Ok(text)
}
