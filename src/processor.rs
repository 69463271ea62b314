//! The document pipeline: OCR → extract → translate → refine → render.
//!
//! [`DocumentPipeline::run`] is strictly sequential. Every stage persists its
//! output to the object store before the next stage starts, so a failed run
//! leaves whatever was already written in place and returns the error.

use crate::auth::GoogleAuth;
use crate::config::{Credentials, PipelineConfig, ServiceEndpoints};
use crate::error::{PolywordError, Result};
use crate::pipeline::ocr::{self, OcrClient, TextExtractionGateway, VisionClient};
use crate::pipeline::refine::{ChatCompletion, LlmChat, RefinementGateway};
use crate::pipeline::render::{MarkdownRenderer, PdfRenderer};
use crate::pipeline::translate::{GoogleTranslateClient, TranslationClient, TranslationGateway};
use crate::progress::{ProgressCallback, Stage};
use crate::reference::{self, DocumentRef, PipelineResult};
use crate::storage::{GcsStore, ObjectStore, PDF_CONTENT_TYPE};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Sequences the four gateways and the renderer.
#[derive(Clone)]
pub struct DocumentPipeline {
    store: Arc<dyn ObjectStore>,
    ocr: TextExtractionGateway,
    translation: TranslationGateway,
    refinement: RefinementGateway,
    renderer: Arc<dyn MarkdownRenderer>,
    config: PipelineConfig,
}

impl std::fmt::Debug for DocumentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DocumentPipeline {
    /// Build a pipeline from explicit clients.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ocr: Arc<dyn OcrClient>,
        translation: Arc<dyn TranslationClient>,
        chat: Arc<dyn ChatCompletion>,
        renderer: Arc<dyn MarkdownRenderer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ocr: TextExtractionGateway::new(ocr, &config),
            translation: TranslationGateway::new(translation),
            refinement: RefinementGateway::new(chat, &config),
            store,
            renderer,
            config,
        }
    }

    /// Build a pipeline against the Google REST APIs and the configured LLM.
    pub async fn connect(
        config: PipelineConfig,
        endpoints: &ServiceEndpoints,
        credentials: &Credentials,
    ) -> Result<Self> {
        let auth = GoogleAuth::from_credentials(credentials).await?;
        let chat = LlmChat::from_config(&config)?;
        info!(
            "Pipeline ready (model {}, OCR timeout {}s)",
            config.model_or_default(),
            config.ocr_timeout_secs
        );
        Ok(Self::new(
            Arc::new(GcsStore::new(&endpoints.storage, auth.clone())),
            Arc::new(VisionClient::new(&endpoints.vision, auth.clone())),
            Arc::new(GoogleTranslateClient::new(&endpoints.translation, auth)),
            Arc::new(chat),
            Arc::new(PdfRenderer::new(&config)),
            config,
        ))
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// A copy of this pipeline reporting to `callback` instead.
    pub fn with_progress_callback(&self, callback: ProgressCallback) -> Self {
        let mut pipeline = self.clone();
        pipeline.config.progress_callback = Some(callback);
        pipeline
    }

    /// Run every stage against `source`, writing artifacts under
    /// `bucket/output_prefix`.
    #[instrument(skip(self, source), fields(source = %source))]
    pub async fn run(
        &self,
        source: &DocumentRef,
        bucket: &str,
        output_prefix: &str,
        target_language: &str,
    ) -> Result<PipelineResult> {
        if bucket.is_empty() {
            return Err(PolywordError::InvalidInput("bucket must not be empty".into()));
        }
        if target_language.trim().is_empty() {
            return Err(PolywordError::InvalidInput(
                "target language must not be empty".into(),
            ));
        }

        let started = Instant::now();
        let outcome = self
            .run_stages(source, bucket, output_prefix, target_language)
            .await;

        match &outcome {
            Ok(result) => {
                info!(
                    "Pipeline finished in {}ms: {}",
                    started.elapsed().as_millis(),
                    result.refined_pdf
                );
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_run_complete(result);
                }
            }
            Err((stage, err)) => {
                tracing::error!("Pipeline failed during {stage}: {err}");
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_run_error(*stage, &err.to_string());
                }
            }
        }
        outcome.map_err(|(_, e)| e)
    }

    async fn run_stages(
        &self,
        source: &DocumentRef,
        bucket: &str,
        prefix: &str,
        lang: &str,
    ) -> std::result::Result<PipelineResult, (Stage, PolywordError)> {
        // ── Step 1: OCR ──────────────────────────────────────────────────
        self.begin(Stage::Detect);
        let destination = ocr::destination_uri(bucket, prefix);
        self.ocr
            .detect(&source.uri(), &destination)
            .await
            .map_err(|e| (Stage::Detect, e))?;
        self.end(Stage::Detect, None);

        // ── Step 2: Extract text ─────────────────────────────────────────
        self.begin(Stage::Extract);
        let (extracted, original_ref) = async {
            let text = ocr::extract_text(self.store.as_ref(), bucket, prefix).await?;
            let stored = self
                .store
                .save_text(bucket, &reference::original_text_path(prefix), &text)
                .await?;
            Ok::<_, PolywordError>((text, stored))
        }
        .await
        .map_err(|e| (Stage::Extract, e))?;
        self.end(Stage::Extract, Some(&original_ref));

        // ── Step 3: Translate ────────────────────────────────────────────
        self.begin(Stage::Translate);
        let (translated, translated_ref) = async {
            let text = self.translation.translate(&extracted, lang).await?;
            let stored = self
                .store
                .save_text(bucket, &reference::translated_text_path(prefix, lang), &text)
                .await?;
            Ok::<_, PolywordError>((text, stored))
        }
        .await
        .map_err(|e| (Stage::Translate, e))?;
        self.end(Stage::Translate, Some(&translated_ref));

        // ── Step 4: Refine ───────────────────────────────────────────────
        self.begin(Stage::Refine);
        let (refined, refined_ref) = async {
            let text = self.refinement.refine(&translated).await?;
            let stored = self
                .store
                .save_text(bucket, &reference::refined_text_path(prefix, lang), &text)
                .await?;
            Ok::<_, PolywordError>((text, stored))
        }
        .await
        .map_err(|e| (Stage::Refine, e))?;
        self.end(Stage::Refine, Some(&refined_ref));

        // ── Step 5: Render + upload ──────────────────────────────────────
        self.begin(Stage::Render);
        let pdf_ref = self
            .render_and_upload(&refined, bucket, &reference::refined_pdf_path(prefix, lang))
            .await
            .map_err(|e| (Stage::Render, e))?;
        self.end(Stage::Render, Some(&pdf_ref));

        Ok(PipelineResult {
            original_text: original_ref,
            translated_text: translated_ref,
            refined_text: refined_ref,
            refined_pdf: pdf_ref,
        })
    }

    /// Render into a temporary file and upload it. The file is removed when
    /// `tmp` drops, whichever way the upload goes.
    async fn render_and_upload(&self, markdown: &str, bucket: &str, dest: &str) -> Result<DocumentRef> {
        let tmp = tempfile::Builder::new()
            .prefix("polyword-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| PolywordError::io(std::env::temp_dir(), e))?;

        let renderer = Arc::clone(&self.renderer);
        let markdown = markdown.to_string();
        let path = tmp.path().to_path_buf();
        tokio::task::spawn_blocking(move || renderer.render_to_file(&markdown, &path))
            .await
            .map_err(|e| PolywordError::Internal(format!("render task panicked: {e}")))??;

        self.store
            .upload_file(tmp.path(), bucket, dest, PDF_CONTENT_TYPE)
            .await
    }

    fn begin(&self, stage: Stage) {
        info!("[{}/{}] {stage}", stage.position(), Stage::ALL.len());
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage_start(stage);
        }
    }

    fn end(&self, stage: Stage, artifact: Option<&DocumentRef>) {
        if let Some(r) = artifact {
            info!("{stage} stored at {r}");
        }
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage_complete(stage, artifact);
        }
    }
}
