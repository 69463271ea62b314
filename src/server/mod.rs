//! HTTP API over the document pipeline.
//!
//! - `GET /` returns a welcome payload
//! - `POST /upload` takes a multipart `file`, runs the pipeline on it and
//!   returns the four result URIs
//! - `GET /download/{*path}` returns a stored object's text and file name
//! - anything else is served from the static asset directory

mod handlers;
mod types;

use crate::processor::DocumentPipeline;
use crate::storage::ObjectStore;
use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use handlers::*;
pub use types::*;

/// Where uploads and results go, and how big an upload may be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bucket: String,
    /// Uploaded sources are stored as `<upload_prefix>/<uuid>_<filename>`.
    pub upload_prefix: String,
    /// Each run writes under `<output_prefix>/<uuid>/`.
    pub output_prefix: String,
    pub target_language: String,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bucket: "polyword-bucket".to_string(),
            upload_prefix: "uploads".to_string(),
            output_prefix: "results".to_string(),
            target_language: "en".to_string(),
            static_dir: PathBuf::from("static"),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

/// API server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DocumentPipeline>,
    pub store: Arc<dyn ObjectStore>,
    pub settings: Arc<ServerSettings>,
}

impl AppState {
    /// Serve `pipeline`, reading and writing through its own object store.
    pub fn new(pipeline: DocumentPipeline, settings: ServerSettings) -> Self {
        Self {
            store: pipeline.store(),
            pipeline: Arc::new(pipeline),
            settings: Arc::new(settings),
        }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: AppState) -> Router {
    let assets = ServeDir::new(&state.settings.static_dir);
    let body_limit = state.settings.max_upload_bytes;

    Router::new()
        .route("/", get(root))
        .route("/upload", post(upload))
        .route("/download/{*path}", get(download))
        .fallback_service(assets)
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: AppState) -> Result<(), std::io::Error> {
    tracing::info!("Starting PolyWord API on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}
