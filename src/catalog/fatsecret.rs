//! FatSecret platform adapter for catalog search.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::credentials::{ClientCredentialsProvider, CredentialProvider};
use super::{CatalogError, CatalogResponse, CatalogSearch};

const DEFAULT_BASE_URL: &str = "https://platform.fatsecret.com/rest";

/// The search endpoint rejects larger pages.
const MAX_PAGE_SIZE: usize = 50;

#[derive(Clone)]
pub struct FatSecretAdapter {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for FatSecretAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FatSecretAdapter")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl FatSecretAdapter {
    /// Reads client credentials from the environment, plus optional
    /// `FATSECRET_BASE_URL` and `FATSECRET_TIMEOUT_SECONDS`.
    pub fn from_env() -> Result<Self, CatalogError> {
        let credentials = Arc::new(ClientCredentialsProvider::from_env()?);
        let base_url =
            std::env::var("FATSECRET_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let timeout = std::env::var("FATSECRET_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));
        Self::with_config(base_url, timeout, credentials)
    }

    pub fn with_config(
        base_url: impl Into<String>,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| CatalogError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            credentials,
        })
    }

    fn search_url(&self) -> String {
        format!("{}/foods/search/v1", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    foods: Option<CatalogResponse>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl CatalogSearch for FatSecretAdapter {
    async fn search(&self, text: &str, max_results: usize) -> Result<CatalogResponse, CatalogError> {
        let token = self.credentials.bearer_token().await?;
        let max_results = max_results.clamp(1, MAX_PAGE_SIZE).to_string();

        let response = self
            .client
            .get(self.search_url())
            .bearer_auth(token)
            .query(&[
                ("search_expression", text),
                ("max_results", max_results.as_str()),
                ("format", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED {
            self.credentials.invalidate().await;
        }
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                message: body.chars().take(512).collect(),
            });
        }

        let envelope: SearchEnvelope =
            serde_json::from_str(&body).map_err(|e| CatalogError::Parse(e.to_string()))?;

        // Application errors arrive with HTTP 200.
        if let Some(err) = envelope.error {
            return Err(CatalogError::Api {
                code: err.code,
                message: err.message,
            });
        }

        let foods = envelope.foods.unwrap_or_default();
        debug!(query = text, entries = foods.entries().len(), "catalog search");
        Ok(foods)
    }
}
