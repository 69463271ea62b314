//! CLI binary for polyword.
//!
//! `polyword process` runs one document through the pipeline and prints the
//! four result URIs; `polyword serve` starts the HTTP API.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use polyword::reference::join_path;
use polyword::server::{start_server, AppState, ServerSettings};
use polyword::storage::PDF_CONTENT_TYPE;
use polyword::{
    spawn_run, Credentials, DocumentPipeline, DocumentRef, PipelineConfig, PipelineEvent,
    RunRequest, ServiceEndpoints,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate a PDF that is already in the bucket
  polyword process --source gs://polyword-bucket/uploads/scan.pdf --prefix results --lang en

  # Write straight into results/ instead of results/<run-id>/
  polyword process --source gs://polyword-bucket/uploads/scan.pdf --reuse-prefix

  # Upload a local PDF first, then translate it into German
  polyword process --file ./scan.pdf --bucket polyword-bucket --lang de

  # Machine-readable result
  polyword process --file ./scan.pdf --json > result.json

  # Start the HTTP API and web UI
  polyword serve --addr 127.0.0.1:8000 --open

ENVIRONMENT VARIABLES:
  GOOGLE_APPLICATION_CREDENTIALS  Service-account key for Storage, Vision and Translation
  OPENAI_API_KEY                  OpenAI API key (refinement)
  ANTHROPIC_API_KEY               Anthropic API key (refinement)
  EDGEQUAKE_LLM_PROVIDER          Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL                 Override model ID
  RUST_LOG                        Log filter, e.g. polyword=debug,tower_http=debug

A .env file in the working directory is loaded when present.
"#;

/// Translate scanned PDFs: OCR, machine translation, LLM refinement, PDF.
#[derive(Parser, Debug)]
#[command(
    name = "polyword",
    version,
    about = "Translate scanned PDFs with cloud OCR, machine translation and LLM refinement",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "POLYWORD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "POLYWORD_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one document through the pipeline.
    Process(ProcessArgs),
    /// Serve the HTTP API and the static web UI.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Source PDF already in storage (gs://bucket/path.pdf).
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    source: Option<String>,

    /// Local PDF to upload before processing.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Bucket for uploads and results.
    #[arg(long, env = "POLYWORD_BUCKET", default_value = "polyword-bucket")]
    bucket: String,

    /// Prefix for results. Each run writes into its own `<prefix>/<run-id>/`
    /// folder unless `--reuse-prefix` is given.
    #[arg(long, env = "POLYWORD_PREFIX", default_value = "results")]
    prefix: String,

    /// Write directly under `--prefix`. OCR shards left there by an earlier
    /// run of a longer document are read back into this one.
    #[arg(long, env = "POLYWORD_REUSE_PREFIX")]
    reuse_prefix: bool,

    /// Prefix for `--file` uploads.
    #[arg(long, env = "POLYWORD_UPLOAD_PREFIX", default_value = "uploads")]
    upload_prefix: String,

    /// Target language code (ISO-639-1).
    #[arg(long, env = "POLYWORD_LANG", default_value = "en")]
    lang: String,

    /// Print the result as JSON.
    #[arg(long, env = "POLYWORD_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "POLYWORD_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "POLYWORD_ADDR", default_value = "127.0.0.1:8000")]
    addr: String,

    /// Bucket for uploads and results.
    #[arg(long, env = "POLYWORD_BUCKET", default_value = "polyword-bucket")]
    bucket: String,

    /// Target language for uploads.
    #[arg(long, env = "POLYWORD_LANG", default_value = "en")]
    lang: String,

    /// Directory of static web assets.
    #[arg(long, env = "POLYWORD_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "POLYWORD_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// Print the web UI address once the server is listening.
    #[arg(long)]
    open: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// LLM model ID for refinement (default: gpt-4o-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Text file with a custom refinement instruction.
    #[arg(long, env = "POLYWORD_REFINE_PROMPT")]
    refine_prompt: Option<PathBuf>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "POLYWORD_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max LLM output tokens.
    #[arg(long, env = "POLYWORD_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Upper bound on the OCR operation, in seconds.
    #[arg(long, env = "POLYWORD_OCR_TIMEOUT", default_value_t = 420)]
    ocr_timeout: u64,

    /// Service-account key file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Cloud Storage base URL.
    #[arg(long, env = "POLYWORD_STORAGE_ENDPOINT")]
    storage_endpoint: Option<String>,

    /// Cloud Vision base URL.
    #[arg(long, env = "POLYWORD_VISION_ENDPOINT")]
    vision_endpoint: Option<String>,

    /// Cloud Translation base URL.
    #[arg(long, env = "POLYWORD_TRANSLATION_ENDPOINT")]
    translation_endpoint: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs for `process`; `serve` logs requests.
    let spinner = match &cli.command {
        Command::Process(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner {
        "error"
    } else {
        "polyword=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Process(args) => process(args, spinner, cli.quiet).await,
        Command::Serve(args) => serve(args, cli.quiet).await,
    }
}

async fn process(args: ProcessArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let pipeline = Arc::new(connect(&args.pipeline).await?);

    let source = match (&args.source, &args.file) {
        (Some(uri), _) => uri.parse::<DocumentRef>().context("Invalid --source")?,
        (None, Some(path)) => upload_local(&pipeline, path, &args.bucket, &args.upload_prefix).await?,
        (None, None) => bail!("either --source or --file is required"),
    };

    let started = Instant::now();
    let mut handle = spawn_run(
        Arc::clone(&pipeline),
        RunRequest {
            source: source.clone(),
            bucket: args.bucket.clone(),
            output_prefix: run_prefix(&args.prefix, args.reuse_prefix, &uuid::Uuid::new_v4().to_string()),
            target_language: args.lang.clone(),
        },
    );

    let bar = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Starting");
        bar.set_message(source.uri());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    while let Some(event) = handle.next_event().await {
        let Some(bar) = &bar else { continue };
        match event {
            PipelineEvent::StageStarted { stage } => {
                bar.set_prefix(format!("[{}/5] {stage}", stage.position()));
            }
            PipelineEvent::StageCompleted { stage, artifact } => {
                let stored = artifact.map(|a| dim(&a)).unwrap_or_default();
                bar.println(format!("  {} {:<14} {stored}", green("✓"), stage.to_string()));
            }
            PipelineEvent::Failed { stage, message } => {
                bar.println(format!("  {} {:<14} {}", red("✗"), stage.to_string(), red(&message)));
            }
            PipelineEvent::Finished => {}
        }
    }
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let result = handle.wait().await.context("Pipeline failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        );
    } else {
        for (key, reference) in result.entries() {
            println!("{key:<20} {reference}");
        }
        if !quiet {
            eprintln!(
                "{} {} in {:.1}s",
                green("✔"),
                bold("Translated"),
                started.elapsed().as_secs_f64()
            );
        }
    }
    Ok(())
}

async fn serve(args: ServeArgs, quiet: bool) -> Result<()> {
    let pipeline = connect(&args.pipeline).await?;
    let settings = ServerSettings {
        bucket: args.bucket,
        target_language: args.lang,
        static_dir: args.static_dir,
        max_upload_bytes: args.max_upload_mb * 1024 * 1024,
        ..ServerSettings::default()
    };
    if args.open && !quiet {
        eprintln!(
            "{} Web UI: {}",
            green("◆"),
            bold(&format!("http://{}/index.html", args.addr))
        );
    }

    start_server(&args.addr, AppState::new(pipeline, settings))
        .await
        .with_context(|| format!("Server on {} failed", args.addr))
}

/// Map CLI args to a connected pipeline.
async fn connect(args: &PipelineArgs) -> Result<DocumentPipeline> {
    let mut builder = PipelineConfig::builder().ocr_timeout_secs(args.ocr_timeout);
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = args.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(ref path) = args.refine_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read refine prompt from {:?}", path))?;
        builder = builder.refine_prompt(prompt);
    }
    let config = builder.build().context("Invalid configuration")?;

    let mut endpoints = ServiceEndpoints::default();
    if let Some(ref url) = args.storage_endpoint {
        endpoints.storage = url.clone();
    }
    if let Some(ref url) = args.vision_endpoint {
        endpoints.vision = url.clone();
    }
    if let Some(ref url) = args.translation_endpoint {
        endpoints.translation = url.clone();
    }
    let credentials = Credentials {
        credentials_path: args.credentials.clone(),
    };

    DocumentPipeline::connect(config, &endpoints, &credentials)
        .await
        .context("Failed to initialise pipeline")
}

/// Output folder for one run.
fn run_prefix(prefix: &str, reuse: bool, run_id: &str) -> String {
    if reuse {
        prefix.to_string()
    } else {
        join_path(prefix, run_id)
    }
}

/// Upload a local PDF as `<upload_prefix>/<uuid>_<name>`.
async fn upload_local(
    pipeline: &DocumentPipeline,
    path: &Path,
    bucket: &str,
    upload_prefix: &str,
) -> Result<DocumentRef> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("--file has no file name")?;
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        bail!("Only PDF files are allowed (got '{name}')");
    }
    let dest = join_path(upload_prefix, &format!("{}_{name}", uuid::Uuid::new_v4()));
    let source = pipeline
        .store()
        .upload_file(path, bucket, &dest, PDF_CONTENT_TYPE)
        .await
        .with_context(|| format!("Failed to upload {}", path.display()))?;
    eprintln!("{} Uploaded {}", green("↑"), dim(&source.uri()));
    Ok(source)
}
