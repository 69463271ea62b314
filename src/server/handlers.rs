//! API request handlers

use super::types::{ApiError, DownloadResponse, UploadResponse, WelcomeResponse, WELCOME_MESSAGE};
use super::AppState;
use crate::error::PolywordError;
use crate::reference::{join_path, DocumentRef};
use crate::storage::PDF_CONTENT_TYPE;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use std::io::Write;
use tempfile::NamedTempFile;
use tracing::info;
use uuid::Uuid;

/// Multipart field carrying the document.
pub const UPLOAD_FIELD: &str = "file";

/// `GET /`
pub async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: WELCOME_MESSAGE.to_string(),
    })
}

/// `POST /upload`: store the PDF, run the pipeline on it, return the four
/// result URIs.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let (filename, buffered) = receive_pdf(multipart).await?;
    let run_id = Uuid::new_v4();
    let settings = &state.settings;

    let object_name = join_path(&settings.upload_prefix, &format!("{run_id}_{filename}"));
    let source = state
        .store
        .upload_file(buffered.path(), &settings.bucket, &object_name, PDF_CONTENT_TYPE)
        .await?;
    info!("Received {filename}, stored as {source}");

    let output_prefix = join_path(&settings.output_prefix, &run_id.to_string());
    let result = state
        .pipeline
        .run(&source, &settings.bucket, &output_prefix, &settings.target_language)
        .await?;

    Ok(Json(result.into()))
}

/// `GET /download/{*path}`
pub async fn download(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let object = DocumentRef::new(&state.settings.bucket, path.trim_start_matches('/'));
    let bytes = state.store.download_bytes(&object.bucket, &object.path).await?;
    Ok(Json(DownloadResponse {
        content: String::from_utf8_lossy(&bytes).into_owned(),
        filename: object.file_name().to_string(),
    }))
}

/// Pull the `file` field out of the form into a temporary file. The name is
/// checked before a single byte is buffered.
async fn receive_pdf(mut multipart: Multipart) -> Result<(String, NamedTempFile), PolywordError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| PolywordError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(base_name)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| PolywordError::InvalidInput("uploaded file has no name".into()))?;
        if !filename.to_ascii_lowercase().ends_with(".pdf") {
            return Err(PolywordError::NotAPdf { filename });
        }

        let mut buffered = NamedTempFile::new().map_err(|e| PolywordError::io(std::env::temp_dir(), e))?;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| PolywordError::InvalidInput(format!("upload interrupted: {e}")))?
        {
            buffered
                .write_all(&chunk)
                .map_err(|e| PolywordError::io(buffered.path(), e))?;
        }
        buffered
            .flush()
            .map_err(|e| PolywordError::io(buffered.path(), e))?;
        return Ok((filename, buffered));
    }

    Err(PolywordError::InvalidInput(format!(
        "missing multipart field '{UPLOAD_FIELD}'"
    )))
}

/// Strip any client-side directory components.
fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\']).next().unwrap_or(name).trim().to_string()
}
