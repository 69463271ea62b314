//! Google Cloud Storage backend over the JSON API.

use super::{ObjectHandle, ObjectStore, TEXT_CONTENT_TYPE};
use crate::auth::GoogleAuth;
use crate::error::{PolywordError, Result};
use crate::reference::DocumentRef;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// [`ObjectStore`] backed by `storage.googleapis.com` (or an emulator).
#[derive(Clone)]
pub struct GcsStore {
    client: Client,
    endpoint: String,
    auth: GoogleAuth,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    /// The JSON API reports sizes as decimal strings.
    size: Option<String>,
    content_type: Option<String>,
}

impl GcsStore {
    pub fn new(endpoint: impl Into<String>, auth: GoogleAuth) -> Self {
        Self::with_client(Client::new(), endpoint, auth)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>, auth: GoogleAuth) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn parse_base(&self, op: &'static str, bucket: &str, path: &str) -> Result<Url> {
        Url::parse(&self.endpoint)
            .map_err(|e| storage_error(op, bucket, path, format!("bad endpoint: {e}")))
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o[/{name}]`, with `name` encoded as
    /// a single path segment.
    fn metadata_url(&self, op: &'static str, bucket: &str, name: Option<&str>) -> Result<Url> {
        let mut url = self.parse_base(op, bucket, name.unwrap_or(""))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                storage_error(op, bucket, name.unwrap_or(""), "endpoint cannot be a base URL")
            })?;
            segments.pop_if_empty().extend(["storage", "v1", "b", bucket, "o"]);
            if let Some(name) = name {
                segments.push(name);
            }
        }
        Ok(url)
    }

    fn upload_url(&self, bucket: &str, dest_path: &str) -> Result<Url> {
        let mut url = self.parse_base("upload", bucket, dest_path)?;
        url.path_segments_mut()
            .map_err(|_| storage_error("upload", bucket, dest_path, "endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", bucket, "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", dest_path);
        Ok(url)
    }

    async fn put_object(
        &self,
        bucket: &str,
        dest_path: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<DocumentRef> {
        let url = self.upload_url(bucket, dest_path)?;
        debug!("POST {url} ({} bytes, {content_type})", body.len());
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        let request = self.auth.authorize(request).await?;
        let response = request
            .send()
            .await
            .map_err(|e| storage_error("upload", bucket, dest_path, e.to_string()))?;
        check_status(response, "upload", bucket, dest_path).await?;
        Ok(DocumentRef::new(bucket, dest_path))
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn upload_file(
        &self,
        local_path: &Path,
        bucket: &str,
        dest_path: &str,
        content_type: &str,
    ) -> Result<DocumentRef> {
        let body = tokio::fs::read(local_path)
            .await
            .map_err(|e| PolywordError::io(local_path, e))?;
        let reference = self.put_object(bucket, dest_path, body, content_type).await?;
        info!("Uploaded {} to {reference}", local_path.display());
        Ok(reference)
    }

    async fn save_text(&self, bucket: &str, dest_path: &str, text: &str) -> Result<DocumentRef> {
        let reference = self
            .put_object(bucket, dest_path, text.as_bytes().to_vec(), TEXT_CONTENT_TYPE)
            .await?;
        info!("Saved {} chars to {reference}", text.chars().count());
        Ok(reference)
    }

    async fn list_by_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectHandle>> {
        let base = self.metadata_url("list", bucket, None)?;
        let mut handles = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = base.clone();
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }
            let request = self.auth.authorize(self.client.get(url)).await?;
            let response = request
                .send()
                .await
                .map_err(|e| storage_error("list", bucket, prefix, e.to_string()))?;
            let response = check_status(response, "list", bucket, prefix).await?;
            let page: ListPage = response
                .json()
                .await
                .map_err(|e| storage_error("list", bucket, prefix, e.to_string()))?;

            handles.extend(page.items.into_iter().map(|item| ObjectHandle {
                bucket: bucket.to_string(),
                size: item.size.and_then(|s| s.parse().ok()),
                content_type: item.content_type,
                name: item.name,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} objects under gs://{bucket}/{prefix}", handles.len());
        Ok(handles)
    }

    async fn download_text(&self, handle: &ObjectHandle) -> Result<String> {
        let bytes = self.download_bytes(&handle.bucket, &handle.name).await?;
        String::from_utf8(bytes).map_err(|e| {
            storage_error("download", &handle.bucket, &handle.name, format!("not UTF-8: {e}"))
        })
    }

    async fn download_bytes(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let mut url = self.metadata_url("download", bucket, Some(path))?;
        url.query_pairs_mut().append_pair("alt", "media");
        let request = self.auth.authorize(self.client.get(url)).await?;
        let response = request
            .send()
            .await
            .map_err(|e| storage_error("download", bucket, path, e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PolywordError::NotFound {
                bucket: bucket.to_string(),
                path: path.to_string(),
            });
        }
        let response = check_status(response, "download", bucket, path).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| storage_error("download", bucket, path, e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

fn storage_error(
    operation: &'static str,
    bucket: &str,
    path: &str,
    message: impl Into<String>,
) -> PolywordError {
    PolywordError::Storage {
        operation,
        bucket: bucket.to_string(),
        path: path.to_string(),
        message: message.into(),
    }
}

async fn check_status(
    response: Response,
    operation: &'static str,
    bucket: &str,
    path: &str,
) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(storage_error(operation, bucket, path, format!("HTTP {status}: {body}")))
}
