//! End-to-end tests against the live Google services and LLM provider.
//!
//! They need credentials, a bucket and a scanned PDF in `./test_cases/`, and
//! are gated behind `E2E_ENABLED` so they never run in CI by accident.
//!
//! Run with:
//!   E2E_ENABLED=1 POLYWORD_E2E_BUCKET=my-bucket cargo test --test e2e -- --nocapture

use polyword::reference::join_path;
use polyword::storage::PDF_CONTENT_TYPE;
use polyword::{Credentials, DocumentPipeline, PipelineConfig, ServiceEndpoints};
use std::path::PathBuf;

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip unless E2E_ENABLED and a bucket are set and the PDF exists.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let Ok(bucket) = std::env::var("POLYWORD_E2E_BUCKET") else {
            println!("SKIP: set POLYWORD_E2E_BUCKET to a writable bucket");
            return;
        };
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        (p, bucket)
    }};
}

async fn live_pipeline() -> DocumentPipeline {
    DocumentPipeline::connect(
        PipelineConfig::default(),
        &ServiceEndpoints::default(),
        &Credentials::from_env(),
    )
    .await
    .expect("pipeline should connect")
}

#[tokio::test]
async fn test_translate_scanned_letter() {
    let (path, bucket) = e2e_skip_unless_ready!(test_cases_dir().join("scanned_letter_fr.pdf"));
    let pipeline = live_pipeline().await;

    let run_id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis()
        .to_string();
    let source = pipeline
        .store()
        .upload_file(
            &path,
            &bucket,
            &join_path("e2e/uploads", &format!("{run_id}.pdf")),
            PDF_CONTENT_TYPE,
        )
        .await
        .expect("upload should succeed");

    let prefix = join_path("e2e/results", &run_id);
    let result = pipeline
        .run(&source, &bucket, &prefix, "en")
        .await
        .expect("pipeline should succeed");

    let store = pipeline.store();
    let original = store
        .download_bytes(&bucket, &result.original_text.path)
        .await
        .unwrap();
    assert!(!original.is_empty(), "OCR produced no text");

    let refined = String::from_utf8(
        store
            .download_bytes(&bucket, &result.refined_text.path)
            .await
            .unwrap(),
    )
    .unwrap();
    assert!(!refined.trim().is_empty(), "refined text is empty");
    assert!(
        !refined.starts_with("```"),
        "refined text must not be wrapped in a code fence"
    );

    let pdf = store
        .download_bytes(&bucket, &result.refined_pdf.path)
        .await
        .unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    println!("✓ {}", result.refined_pdf);
}

#[tokio::test]
async fn test_missing_source_fails_in_detect() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    let Ok(bucket) = std::env::var("POLYWORD_E2E_BUCKET") else {
        println!("SKIP");
        return;
    };

    let pipeline = live_pipeline().await;
    let source = polyword::DocumentRef::new(&bucket, "e2e/definitely-not-here.pdf");
    let result = pipeline.run(&source, &bucket, "e2e/results/missing", "en").await;
    assert!(result.is_err(), "a missing source must fail the run");
}
