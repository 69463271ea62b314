//! API request and response types

use crate::error::PolywordError;
use crate::reference::PipelineResult;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

pub const WELCOME_MESSAGE: &str = "Welcome to PolyWord API";
pub const UPLOAD_SUCCESS_MESSAGE: &str = "File processed successfully";

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WelcomeResponse {
    pub message: String,
}

/// Body of a successful `POST /upload`. Every location is a `gs://` URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub message: String,
    pub original_text: String,
    pub translated_text: String,
    pub refined_text: String,
    pub refined_pdf: String,
}

impl From<PipelineResult> for UploadResponse {
    fn from(result: PipelineResult) -> Self {
        Self {
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            original_text: result.original_text.uri(),
            translated_text: result.translated_text.uri(),
            refined_text: result.refined_text.uri(),
            refined_pdf: result.refined_pdf.uri(),
        }
    }
}

/// Body of `GET /download/{path}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadResponse {
    /// Object contents decoded as UTF-8; invalid sequences are replaced.
    pub content: String,
    /// Final path segment of the object name.
    pub filename: String,
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub detail: String,
}

/// Maps library errors onto HTTP statuses: validation → 400, missing
/// object → 404, anything else → 500 with the raw message.
#[derive(Debug)]
pub struct ApiError(pub PolywordError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_validation() {
            StatusCode::BAD_REQUEST
        } else if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<PolywordError> for ApiError {
    fn from(err: PolywordError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected ({status}): {}", self.0);
        }
        let body = ErrorBody {
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
