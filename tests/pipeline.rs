//! Pipeline integration tests.
//!
//! Every remote collaborator is a mockall double; storage is the in-memory
//! store, so the assertions can look at exactly what a run leaves behind.

use mockall::Sequence;
use polyword::pipeline::ocr::{MockOcrClient, OcrRequest, OperationStatus};
use polyword::pipeline::refine::MockChatCompletion;
use polyword::pipeline::render::{MockMarkdownRenderer, PdfRenderer};
use polyword::pipeline::translate::MockTranslationClient;
use polyword::storage::{MemoryStore, MockObjectStore, ObjectHandle, ObjectStore};
use polyword::{
    DocumentPipeline, DocumentRef, PipelineConfig, PipelineProgressCallback, PipelineResult,
    PolywordError, Stage,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const BUCKET: &str = "polyword-bucket";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn source() -> DocumentRef {
    DocumentRef::new(BUCKET, "uploads/scan.pdf")
}

fn shard(pages: &[&str]) -> String {
    let responses: Vec<_> = pages
        .iter()
        .enumerate()
        .map(|(i, text)| {
            serde_json::json!({
                "fullTextAnnotation": { "text": text },
                "context": { "pageNumber": i + 1 }
            })
        })
        .collect();
    serde_json::json!({ "responses": responses }).to_string()
}

/// An OCR double that writes `pages` as one shard under the destination it
/// is handed, the way the real service does.
fn ocr_writing(store: Arc<MemoryStore>, pages: &'static [&'static str]) -> MockOcrClient {
    let mut ocr = MockOcrClient::new();
    ocr.expect_submit().times(1).returning(move |req: &OcrRequest| {
        let dest: DocumentRef = req.destination_uri.parse()?;
        let name = format!("{}output-1-to-{}.json", dest.path, pages.len());
        store.insert(&dest.bucket, &name, shard(pages), "application/json");
        Ok("operations/ocr-1".into())
    });
    ocr.expect_poll().returning(|_| Ok(OperationStatus::Done));
    ocr
}

fn writing_renderer() -> MockMarkdownRenderer {
    let mut renderer = MockMarkdownRenderer::new();
    renderer.expect_render_to_file().times(1).returning(|_, path| {
        std::fs::write(path, b"%PDF-1.7\n").map_err(|e| PolywordError::Render(e.to_string()))
    });
    renderer
}

async fn run(pipeline: &DocumentPipeline, lang: &str) -> polyword::Result<PipelineResult> {
    pipeline.run(&source(), BUCKET, "results", lang).await
}

#[tokio::test]
async fn stages_run_in_order_and_write_four_artifacts() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let mut seq = Sequence::new();

    let mut ocr = MockOcrClient::new();
    let shard_store = Arc::clone(&store);
    ocr.expect_submit()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|req: &OcrRequest| {
            req.source_uri == "gs://polyword-bucket/uploads/scan.pdf"
                && req.destination_uri == "gs://polyword-bucket/results/"
                && req.mime_type == "application/pdf"
        })
        .returning(move |_| {
            shard_store.insert(
                BUCKET,
                "results/output-1-to-2.json",
                shard(&["Bonjour", "le monde"]),
                "application/json",
            );
            Ok("operations/ocr-1".into())
        });
    ocr.expect_poll()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(OperationStatus::Pending));
    ocr.expect_poll()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(OperationStatus::Done));

    let mut translate = MockTranslationClient::new();
    translate
        .expect_translate()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|text: &str, lang: &str| text == "Bonjour\n\nle monde\n\n" && lang == "en")
        .returning(|_, _| Ok("Hello\n\nthe world\n\n".into()));

    let mut chat = MockChatCompletion::new();
    chat.expect_complete()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|_: &str, user: &str| user.contains("Hello") && user.contains("the world"))
        .returning(|_, _| Ok("\n# Hello\n\nThe world.\n".into()));

    let mut renderer = MockMarkdownRenderer::new();
    renderer
        .expect_render_to_file()
        .times(1)
        .in_sequence(&mut seq)
        .withf(|markdown: &str, _: &Path| markdown == "# Hello\n\nThe world.")
        .returning(|_, path| {
            std::fs::write(path, b"%PDF-1.7\n").map_err(|e| PolywordError::Render(e.to_string()))
        });

    let config = PipelineConfig::builder().ocr_poll_interval_ms(1).build().unwrap();
    let pipeline = DocumentPipeline::new(
        store.clone(),
        Arc::new(ocr),
        Arc::new(translate),
        Arc::new(chat),
        Arc::new(renderer),
        config,
    );

    let result = run(&pipeline, "en").await.unwrap();

    assert_eq!(result.original_text.uri(), "gs://polyword-bucket/results/original_text.txt");
    assert_eq!(result.translated_text.path, "results/translated_text_en.txt");
    assert_eq!(result.refined_text.path, "results/refined_text_en.txt");
    assert_eq!(result.refined_pdf.path, "results/refined_text_en.pdf");

    let text = |path: &str| String::from_utf8(store.get(BUCKET, path).unwrap()).unwrap();
    assert_eq!(text("results/original_text.txt"), "Bonjour\n\nle monde\n\n");
    assert_eq!(text("results/translated_text_en.txt"), "Hello\n\nthe world\n\n");
    assert_eq!(text("results/refined_text_en.txt"), "# Hello\n\nThe world.");
    assert!(store.get(BUCKET, "results/refined_text_en.pdf").unwrap().starts_with(b"%PDF"));
}

#[tokio::test]
async fn language_code_names_every_translated_artifact() {
    let store = Arc::new(MemoryStore::new());
    let mut translate = MockTranslationClient::new();
    translate.expect_translate().returning(|_, _| Ok("Hallo".into()));
    let mut chat = MockChatCompletion::new();
    chat.expect_complete().returning(|_, _| Ok("Hallo".into()));

    let pipeline = DocumentPipeline::new(
        store.clone(),
        Arc::new(ocr_writing(Arc::clone(&store), &["Hello"])),
        Arc::new(translate),
        Arc::new(chat),
        Arc::new(writing_renderer()),
        PipelineConfig::default(),
    );

    let result = run(&pipeline, "de").await.unwrap();
    let paths: Vec<&str> = result.entries().iter().map(|(_, r)| r.path.as_str()).collect();
    assert_eq!(
        paths,
        [
            "results/original_text.txt",
            "results/translated_text_de.txt",
            "results/refined_text_de.txt",
            "results/refined_text_de.pdf",
        ]
    );
}

#[tokio::test]
async fn failure_stops_later_stages() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    let mut translate = MockTranslationClient::new();
    translate.expect_translate().times(1).returning(|_, lang| {
        Err(PolywordError::Translation {
            target: lang.to_string(),
            message: "403 quota exceeded".into(),
        })
    });
    let mut chat = MockChatCompletion::new();
    chat.expect_complete().times(0);
    let mut renderer = MockMarkdownRenderer::new();
    renderer.expect_render_to_file().times(0);

    let pipeline = DocumentPipeline::new(
        store.clone(),
        Arc::new(ocr_writing(Arc::clone(&store), &["Bonjour"])),
        Arc::new(translate),
        Arc::new(chat),
        Arc::new(renderer),
        PipelineConfig::default(),
    );

    let err = run(&pipeline, "en").await.unwrap_err();
    assert!(matches!(err, PolywordError::Translation { .. }));
    assert!(err.to_string().contains("quota"));

    // The extract stage already persisted its output; nothing after it did.
    assert!(store.get(BUCKET, "results/original_text.txt").is_some());
    assert!(store.get(BUCKET, "results/translated_text_en.txt").is_none());
    assert!(store.get(BUCKET, "results/refined_text_en.pdf").is_none());
}

#[tokio::test]
async fn blank_document_skips_remote_text_services() {
    let store = Arc::new(MemoryStore::new());

    let mut translate = MockTranslationClient::new();
    translate.expect_translate().times(0);
    let mut chat = MockChatCompletion::new();
    chat.expect_complete().times(0);

    let pipeline = DocumentPipeline::new(
        store.clone(),
        Arc::new(ocr_writing(Arc::clone(&store), &[])),
        Arc::new(translate),
        Arc::new(chat),
        Arc::new(writing_renderer()),
        PipelineConfig::default(),
    );

    let result = run(&pipeline, "en").await.unwrap();
    assert_eq!(store.get(BUCKET, &result.translated_text.path).unwrap(), b"");
    assert_eq!(store.get(BUCKET, &result.refined_text.path).unwrap(), b"");
    assert!(store.get(BUCKET, &result.refined_pdf.path).is_some());
}

#[tokio::test]
async fn empty_target_language_is_rejected_before_any_call() {
    let mut ocr = MockOcrClient::new();
    ocr.expect_submit().times(0);

    let pipeline = DocumentPipeline::new(
        Arc::new(MemoryStore::new()),
        Arc::new(ocr),
        Arc::new(MockTranslationClient::new()),
        Arc::new(MockChatCompletion::new()),
        Arc::new(MockMarkdownRenderer::new()),
        PipelineConfig::default(),
    );

    let err = run(&pipeline, " ").await.unwrap_err();
    assert!(err.is_validation());
}

#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
}

impl PipelineProgressCallback for Recorder {
    fn on_stage_start(&self, stage: Stage) {
        self.log.lock().unwrap().push(format!("start {}", stage.as_str()));
    }
    fn on_stage_complete(&self, stage: Stage, artifact: Option<&DocumentRef>) {
        let stored = artifact.map(|r| r.path.clone()).unwrap_or_default();
        self.log.lock().unwrap().push(format!("done {} {stored}", stage.as_str()));
    }
    fn on_run_complete(&self, _result: &PipelineResult) {
        self.log.lock().unwrap().push("finished".into());
    }
    fn on_run_error(&self, stage: Stage, _error: &str) {
        self.log.lock().unwrap().push(format!("error {}", stage.as_str()));
    }
}

#[tokio::test]
async fn progress_callback_sees_every_stage() {
    let store = Arc::new(MemoryStore::new());
    let mut translate = MockTranslationClient::new();
    translate.expect_translate().returning(|_, _| Ok("Hello".into()));
    let mut chat = MockChatCompletion::new();
    chat.expect_complete().returning(|_, _| Ok("Hello".into()));

    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let pipeline = DocumentPipeline::new(
        store.clone(),
        Arc::new(ocr_writing(Arc::clone(&store), &["Bonjour"])),
        Arc::new(translate),
        Arc::new(chat),
        Arc::new(writing_renderer()),
        config,
    );

    run(&pipeline, "en").await.unwrap();

    let log = recorder.log.lock().unwrap();
    assert_eq!(log.first().map(String::as_str), Some("start detect"));
    assert!(log.contains(&"done extract results/original_text.txt".to_string()));
    assert!(log.contains(&"done render results/refined_text_en.pdf".to_string()));
    assert_eq!(log.last().map(String::as_str), Some("finished"));
}

#[tokio::test]
async fn real_renderer_produces_a_pdf() {
    let store = Arc::new(MemoryStore::new());
    let mut translate = MockTranslationClient::new();
    translate.expect_translate().returning(|_, _| Ok("Report".into()));
    let mut chat = MockChatCompletion::new();
    chat.expect_complete().returning(|_, _| {
        Ok("# Report\n\n## Summary\n\nAll systems nominal.\n\n- first\n- second\n".into())
    });

    let config = PipelineConfig::default();
    let pipeline = DocumentPipeline::new(
        store.clone(),
        Arc::new(ocr_writing(Arc::clone(&store), &["Rapport"])),
        Arc::new(translate),
        Arc::new(chat),
        Arc::new(PdfRenderer::new(&config)),
        config,
    );

    let result = run(&pipeline, "en").await.unwrap();
    let pdf = store.get(BUCKET, &result.refined_pdf.path).unwrap();
    assert!(pdf.starts_with(b"%PDF"));
    assert!(pdf.len() > 500);
    assert_eq!(
        store.download_text(&ObjectHandle::new(BUCKET, "results/refined_text_en.txt"))
            .await
            .unwrap(),
        "# Report\n\n## Summary\n\nAll systems nominal.\n\n- first\n- second"
    );
}

#[tokio::test]
async fn render_temp_file_is_removed_after_upload() {
    let store = Arc::new(MemoryStore::new());
    let mut translate = MockTranslationClient::new();
    translate.expect_translate().returning(|_, _| Ok("Hello".into()));
    let mut chat = MockChatCompletion::new();
    chat.expect_complete().returning(|_, _| Ok("# Hello".into()));

    let rendered_at: Arc<Mutex<Option<PathBuf>>> = Arc::default();
    let seen = Arc::clone(&rendered_at);
    let mut renderer = MockMarkdownRenderer::new();
    renderer.expect_render_to_file().times(1).returning(move |_, path| {
        *seen.lock().unwrap() = Some(path.to_path_buf());
        std::fs::write(path, b"%PDF-1.7\n").map_err(|e| PolywordError::Render(e.to_string()))
    });

    let pipeline = DocumentPipeline::new(
        store.clone(),
        Arc::new(ocr_writing(Arc::clone(&store), &["Bonjour"])),
        Arc::new(translate),
        Arc::new(chat),
        Arc::new(renderer),
        PipelineConfig::default(),
    );

    run(&pipeline, "en").await.unwrap();

    let path = rendered_at.lock().unwrap().clone().expect("renderer was not called");
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("pdf"));
    assert!(!path.exists(), "{} was left behind", path.display());
}

#[tokio::test]
async fn render_temp_file_is_removed_when_upload_fails() {
    let uploaded_from: Arc<Mutex<Option<PathBuf>>> = Arc::default();
    let seen = Arc::clone(&uploaded_from);

    let mut store = MockObjectStore::new();
    store
        .expect_list_by_prefix()
        .returning(|bucket, _| Ok(vec![ObjectHandle::new(bucket, "results/output-1-to-1.json")]));
    store
        .expect_download_text()
        .returning(|_| Ok(shard(&["Bonjour"])));
    store
        .expect_save_text()
        .returning(|bucket, path, _| Ok(DocumentRef::new(bucket, path)));
    store.expect_upload_file().times(1).returning(
        move |local: &Path, bucket: &str, dest: &str, _: &str| {
            assert!(local.exists(), "rendered PDF missing before upload");
            *seen.lock().unwrap() = Some(local.to_path_buf());
            Err(PolywordError::Storage {
                operation: "upload",
                bucket: bucket.to_string(),
                path: dest.to_string(),
                message: "503 backend unavailable".into(),
            })
        },
    );

    let mut ocr = MockOcrClient::new();
    ocr.expect_submit().returning(|_| Ok("operations/ocr-1".into()));
    ocr.expect_poll().returning(|_| Ok(OperationStatus::Done));
    let mut translate = MockTranslationClient::new();
    translate.expect_translate().returning(|_, _| Ok("Hello".into()));
    let mut chat = MockChatCompletion::new();
    chat.expect_complete().returning(|_, _| Ok("# Hello".into()));

    let pipeline = DocumentPipeline::new(
        Arc::new(store),
        Arc::new(ocr),
        Arc::new(translate),
        Arc::new(chat),
        Arc::new(writing_renderer()),
        PipelineConfig::default(),
    );

    let err = run(&pipeline, "en").await.unwrap_err();
    assert!(matches!(err, PolywordError::Storage { .. }), "got: {err}");

    let path = uploaded_from.lock().unwrap().clone().expect("upload was not attempted");
    assert!(!path.exists(), "{} was left behind", path.display());
}
