//! LLM refinement: turn a raw machine translation into clean markdown.
//!
//! The stage is one chat request. The system turn carries the editorial
//! instruction ([`crate::prompts::DEFAULT_REFINE_PROMPT`] unless overridden),
//! the user turn carries the translated text, and the reply is trimmed and
//! returned. There is no retry: a failed call aborts the run.

use crate::config::PipelineConfig;
use crate::error::{PolywordError, Result};
use crate::prompts::DEFAULT_REFINE_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::{debug, info};

/// A single system + user chat completion.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// [`ChatCompletion`] over any `edgequake-llm` provider.
#[derive(Clone)]
pub struct LlmChat {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmChat {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve the provider from `config` and the environment.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

#[async_trait]
impl ChatCompletion for LlmChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| PolywordError::LlmApiError {
                message: e.to_string(),
            })?;
        debug!(
            "LLM usage: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PolywordError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Pick the LLM provider, most specific first:
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` with the configured model.
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set.
/// 4. OpenAI when `OPENAI_API_KEY` is set.
/// 5. Whatever `ProviderFactory::from_env` detects.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default());
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return create_provider("openai", config.model_or_default());
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PolywordError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {e}"
            ),
        })?;
    Ok(llm_provider)
}

/// Refinement stage.
#[derive(Clone)]
pub struct RefinementGateway {
    chat: Arc<dyn ChatCompletion>,
    instruction: String,
}

impl RefinementGateway {
    pub fn new(chat: Arc<dyn ChatCompletion>, config: &PipelineConfig) -> Self {
        Self {
            chat,
            instruction: config
                .refine_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_REFINE_PROMPT.to_string()),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Rewrite `text` as grammatical markdown. Empty input returns `""`
    /// without calling the model.
    pub async fn refine(&self, text: &str) -> Result<String> {
        if text.is_empty() {
            debug!("Nothing to refine");
            return Ok(String::new());
        }
        let reply = self.chat.complete(&self.instruction, text).await?;
        let refined = reply.trim().to_string();
        info!("Refined {} chars into {} chars of markdown", text.len(), refined.len());
        Ok(refined)
    }
}
