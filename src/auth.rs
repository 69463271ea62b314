//! Google Cloud bearer tokens for the REST clients.
//!
//! All three Google clients share one [`GoogleAuth`]. Tokens are minted by
//! `gcp_auth`, which caches and refreshes them internally, so every request
//! simply asks for a token again.

use crate::config::Credentials;
use crate::error::PolywordError;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::RequestBuilder;
use std::sync::Arc;
use tracing::{debug, info};

/// OAuth scope that covers Storage, Vision and Translation.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Attaches `Authorization: Bearer …` to outgoing requests.
#[derive(Clone)]
pub struct GoogleAuth {
    provider: Option<Arc<dyn TokenProvider>>,
}

impl GoogleAuth {
    /// Load a service-account key from `credentials.credentials_path`, or fall
    /// back to the ambient credential chain when no path is configured.
    pub async fn from_credentials(credentials: &Credentials) -> Result<Self, PolywordError> {
        let provider: Arc<dyn TokenProvider> = match &credentials.credentials_path {
            Some(path) => {
                info!("Loading Google credentials from {}", path.display());
                let account = CustomServiceAccount::from_file(path).map_err(|e| {
                    PolywordError::Auth(format!(
                        "cannot load service account '{}': {e}",
                        path.display()
                    ))
                })?;
                Arc::new(account)
            }
            None => {
                info!("No credential file configured; using ambient Google credentials");
                gcp_auth::provider()
                    .await
                    .map_err(|e| PolywordError::Auth(e.to_string()))?
            }
        };
        Ok(Self {
            provider: Some(provider),
        })
    }

    /// No `Authorization` header at all. For local emulators.
    pub fn anonymous() -> Self {
        Self { provider: None }
    }

    pub fn is_anonymous(&self) -> bool {
        self.provider.is_none()
    }

    /// Attach a bearer token to `request` (no-op when anonymous).
    pub async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, PolywordError> {
        match &self.provider {
            Some(provider) => {
                let token = provider
                    .token(&[CLOUD_PLATFORM_SCOPE])
                    .await
                    .map_err(|e| PolywordError::Auth(e.to_string()))?;
                debug!("Attached Google bearer token");
                Ok(request.bearer_auth(token.as_str()))
            }
            None => Ok(request),
        }
    }
}
