//! Configuration types for a translation pipeline run.
//!
//! Behaviour knobs live in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Where the services live ([`ServiceEndpoints`])
//! and how we authenticate to them ([`Credentials`]) are kept separate so
//! tests can point the clients at a local emulator without touching pipeline
//! behaviour.

use crate::error::PolywordError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable naming the Google service-account credential file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Default LLM used for refinement.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for the document pipeline.
///
/// # Example
/// ```rust
/// use polyword::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .ocr_timeout_secs(600)
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// assert_eq!(config.toc_depth, 2);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Upper bound on the OCR long-running operation, in seconds. Default: 420.
    pub ocr_timeout_secs: u64,

    /// Delay between OCR operation status polls, in milliseconds. Default: 5000.
    pub ocr_poll_interval_ms: u64,

    /// Pages per OCR output shard. Default: 100.
    pub ocr_batch_size: u32,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Editorial instruction for refinement. If None, uses
    /// [`crate::prompts::DEFAULT_REFINE_PROMPT`].
    pub refine_prompt: Option<String>,

    /// Maximum tokens the LLM may generate. None leaves it to the provider.
    pub max_tokens: Option<usize>,

    /// Sampling temperature. None leaves it to the provider.
    pub temperature: Option<f32>,

    /// Title written into the rendered PDF metadata. Default: "Refined Document".
    pub pdf_title: String,

    /// Author written into the rendered PDF metadata. Default: "PolyWord".
    pub pdf_author: String,

    /// Deepest heading level that gets a PDF bookmark. Default: 2.
    pub toc_depth: u8,

    /// Stage progress events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_timeout_secs: 420,
            ocr_poll_interval_ms: 5000,
            ocr_batch_size: 100,
            model: None,
            provider_name: None,
            provider: None,
            refine_prompt: None,
            max_tokens: None,
            temperature: None,
            pdf_title: "Refined Document".to_string(),
            pdf_author: "PolyWord".to_string(),
            toc_depth: 2,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("ocr_poll_interval_ms", &self.ocr_poll_interval_ms)
            .field("ocr_batch_size", &self.ocr_batch_size)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("refine_prompt", &self.refine_prompt.as_ref().map(|p| p.len()))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("pdf_title", &self.pdf_title)
            .field("pdf_author", &self.pdf_author)
            .field("toc_depth", &self.toc_depth)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request from the provider.
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn ocr_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.ocr_poll_interval_ms = ms;
        self
    }

    pub fn ocr_batch_size(mut self, n: u32) -> Self {
        self.config.ocr_batch_size = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn refine_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.refine_prompt = Some(prompt.into());
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn pdf_title(mut self, title: impl Into<String>) -> Self {
        self.config.pdf_title = title.into();
        self
    }

    pub fn pdf_author(mut self, author: impl Into<String>) -> Self {
        self.config.pdf_author = author.into();
        self
    }

    pub fn toc_depth(mut self, depth: u8) -> Self {
        self.config.toc_depth = depth;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PolywordError> {
        let c = &self.config;
        if c.ocr_timeout_secs == 0 {
            return Err(PolywordError::InvalidConfig(
                "OCR timeout must be ≥ 1 second".into(),
            ));
        }
        if c.ocr_poll_interval_ms == 0 {
            return Err(PolywordError::InvalidConfig(
                "OCR poll interval must be ≥ 1 ms".into(),
            ));
        }
        if !(1..=100).contains(&c.ocr_batch_size) {
            return Err(PolywordError::InvalidConfig(format!(
                "OCR batch size must be 1–100, got {}",
                c.ocr_batch_size
            )));
        }
        if !(1..=6).contains(&c.toc_depth) {
            return Err(PolywordError::InvalidConfig(format!(
                "TOC depth must be 1–6, got {}",
                c.toc_depth
            )));
        }
        Ok(self.config)
    }
}

// ── Service locations and credentials ────────────────────────────────────────

/// Base URLs of the Google REST APIs the clients talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    /// Cloud Storage JSON API, e.g. `https://storage.googleapis.com`.
    pub storage: String,
    /// Cloud Vision API, e.g. `https://vision.googleapis.com`.
    pub vision: String,
    /// Cloud Translation API, e.g. `https://translation.googleapis.com`.
    pub translation: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            storage: "https://storage.googleapis.com".to_string(),
            vision: "https://vision.googleapis.com".to_string(),
            translation: "https://translation.googleapis.com".to_string(),
        }
    }
}

/// Where Google credentials come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Path to a service-account JSON key. None falls back to the ambient
    /// credential chain (metadata server, gcloud user credentials).
    pub credentials_path: Option<PathBuf>,
}

impl Credentials {
    /// Read [`CREDENTIALS_ENV`] from the process environment.
    pub fn from_env() -> Self {
        let credentials_path = std::env::var_os(CREDENTIALS_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        Self { credentials_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.ocr_timeout_secs, 420);
        assert_eq!(c.ocr_batch_size, 100);
        assert_eq!(c.toc_depth, 2);
        assert_eq!(c.pdf_title, "Refined Document");
        assert_eq!(c.pdf_author, "PolyWord");
        assert_eq!(c.model_or_default(), "gpt-4o-mini");
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = PipelineConfig::builder().ocr_timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, PolywordError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_oversized_batch() {
        assert!(PipelineConfig::builder().ocr_batch_size(101).build().is_err());
        assert!(PipelineConfig::builder().ocr_batch_size(0).build().is_err());
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = PipelineConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, Some(2.0));
    }

    #[test]
    fn debug_hides_provider_and_prompt() {
        let c = PipelineConfig::builder()
            .refine_prompt("secret editorial house rules")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret"), "got: {dbg}");
    }
}
