//! Bearer tokens for the catalog service.
//!
//! Tokens are owned by an injected provider instead of process-wide state, so
//! each resolver (and each test) carries its own credentials.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::CatalogError;

const DEFAULT_TOKEN_URL: &str = "https://oauth.fatsecret.com/connect/token";

/// Tokens are refreshed this long before the server says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, CatalogError>;

    /// Drop any cached token after the service rejected it.
    async fn invalidate(&self) {}
}

/// A fixed token, for tests and pre-provisioned deployments.
#[derive(Debug, Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn bearer_token(&self) -> Result<String, CatalogError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// OAuth2 client-credentials grant with an in-memory token cache.
#[derive(Debug)]
pub struct ClientCredentialsProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

impl ClientCredentialsProvider {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: "basic".to_string(),
            cached: Mutex::new(None),
        })
    }

    /// Reads `FATSECRET_CLIENT_ID`, `FATSECRET_CLIENT_SECRET` and optionally
    /// `FATSECRET_TOKEN_URL`, `FATSECRET_SCOPE` and `FATSECRET_TIMEOUT_SECONDS`.
    pub fn from_env() -> Result<Self, CatalogError> {
        let client_id = std::env::var("FATSECRET_CLIENT_ID")
            .map_err(|_| CatalogError::Config("FATSECRET_CLIENT_ID not set".to_string()))?;
        let client_secret = std::env::var("FATSECRET_CLIENT_SECRET")
            .map_err(|_| CatalogError::Config("FATSECRET_CLIENT_SECRET not set".to_string()))?;
        let token_url =
            std::env::var("FATSECRET_TOKEN_URL").unwrap_or_else(|_| DEFAULT_TOKEN_URL.into());
        let timeout = std::env::var("FATSECRET_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));
        let provider = Self::new(client_id, client_secret, token_url, timeout)?;
        Ok(match std::env::var("FATSECRET_SCOPE") {
            Ok(scope) if !scope.trim().is_empty() => provider.with_scope(scope.trim()),
            _ => provider,
        })
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    async fn fetch(&self) -> Result<CachedToken, CatalogError> {
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", self.scope.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| CatalogError::Credentials(format!("invalid token response: {e}")))?;

        if !status.is_success() {
            return Err(CatalogError::Credentials(format!(
                "token endpoint returned HTTP {}: {}",
                status.as_u16(),
                parsed.error.unwrap_or_default()
            )));
        }

        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CatalogError::Credentials("token response without access_token".into()))?;
        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(3_600));

        debug!(expires_in_secs = lifetime.as_secs(), "fetched catalog token");
        Ok(CachedToken {
            token,
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

#[async_trait]
impl CredentialProvider for ClientCredentialsProvider {
    async fn bearer_token(&self) -> Result<String, CatalogError> {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.token.clone());
            }
        }
        let fresh = self.fetch().await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
