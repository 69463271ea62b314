//! Machine translation of the extracted text.

use crate::auth::GoogleAuth;
use crate::error::{PolywordError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Translate a whole text in one request.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
#[async_trait]
pub trait TranslationClient: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String>;
}

/// [`TranslationClient`] over Cloud Translation v2 REST.
#[derive(Clone)]
pub struct GoogleTranslateClient {
    client: Client,
    endpoint: String,
    auth: GoogleAuth,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
    detected_source_language: Option<String>,
}

impl GoogleTranslateClient {
    pub fn new(endpoint: impl Into<String>, auth: GoogleAuth) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth,
        }
    }
}

#[async_trait]
impl TranslationClient for GoogleTranslateClient {
    async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        let failed = |message: String| PolywordError::Translation {
            target: target_language.to_string(),
            message,
        };

        let url = format!("{}/language/translate/v2", self.endpoint);
        // format=text keeps the service from HTML-escaping quotes and ampersands.
        let body = TranslateRequest {
            q: text,
            target: target_language,
            format: "text",
        };
        let request = self.auth.authorize(self.client.post(&url).json(&body)).await?;
        let response = request.send().await.map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {status}: {detail}")));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("unexpected payload: {e}")))?;
        let first = parsed
            .data
            .translations
            .into_iter()
            .next()
            .ok_or_else(|| failed("service returned no translations".to_string()))?;
        if let Some(source) = &first.detected_source_language {
            debug!("Detected source language: {source}");
        }
        Ok(first.translated_text)
    }
}

/// Translation stage: skips the remote call for empty input.
#[derive(Clone)]
pub struct TranslationGateway {
    client: Arc<dyn TranslationClient>,
}

impl TranslationGateway {
    pub fn new(client: Arc<dyn TranslationClient>) -> Self {
        Self { client }
    }

    pub async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        if text.is_empty() {
            debug!("Nothing to translate");
            return Ok(String::new());
        }
        if target_language.trim().is_empty() {
            return Err(PolywordError::InvalidInput(
                "target language must not be empty".to_string(),
            ));
        }
        let translated = self.client.translate(text, target_language).await?;
        info!(
            "Translated {} chars into '{target_language}' ({} chars)",
            text.len(),
            translated.len()
        );
        Ok(translated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_text_skips_the_service() {
        let mut client = MockTranslationClient::new();
        client.expect_translate().times(0);
        let gateway = TranslationGateway::new(Arc::new(client));
        assert_eq!(gateway.translate("", "en").await.unwrap(), "");
    }

    #[tokio::test]
    async fn forwards_whole_text_once() {
        let mut client = MockTranslationClient::new();
        client
            .expect_translate()
            .withf(|text: &str, lang: &str| text == "Bonjour\n\nle monde\n\n" && lang == "en")
            .times(1)
            .returning(|_, _| Ok("Hello\n\nworld\n\n".to_string()));
        let gateway = TranslationGateway::new(Arc::new(client));
        let out = gateway.translate("Bonjour\n\nle monde\n\n", "en").await.unwrap();
        assert_eq!(out, "Hello\n\nworld\n\n");
    }

    #[tokio::test]
    async fn service_errors_propagate() {
        let mut client = MockTranslationClient::new();
        client.expect_translate().returning(|_, lang| {
            Err(PolywordError::Translation {
                target: lang.to_string(),
                message: "HTTP 403 Forbidden".to_string(),
            })
        });
        let gateway = TranslationGateway::new(Arc::new(client));
        let err = gateway.translate("Hola", "en").await.unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn response_payload_parses() {
        let parsed: TranslateResponse = serde_json::from_str(
            r#"{"data":{"translations":[{"translatedText":"Hello","detectedSourceLanguage":"fr"}]}}"#,
        )
        .unwrap();
        assert_eq!(parsed.data.translations[0].translated_text, "Hello");
    }

    #[test]
    fn request_asks_for_plain_text() {
        let body = serde_json::to_value(TranslateRequest {
            q: "a & b",
            target: "de",
            format: "text",
        })
        .unwrap();
        assert_eq!(body["format"], "text");
        assert_eq!(body["target"], "de");
    }
}
