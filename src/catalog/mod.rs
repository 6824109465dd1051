//! Catalog search service: the structured food database the resolver queries.
//!
//! The resolver only depends on the [`CatalogSearch`] trait. The HTTP adapter
//! in [`fatsecret`] is one implementation; tests use in-process fakes.

pub mod credentials;
pub mod fatsecret;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

pub use credentials::{ClientCredentialsProvider, CredentialProvider, StaticCredential};
pub use fatsecret::FatSecretAdapter;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("catalog api error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("invalid catalog response: {0}")]
    Parse(String),
    #[error("credential error: {0}")]
    Credentials(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl CatalogError {
    /// Short error code for logs and traces.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_error",
            Self::Status { .. } => "http_status",
            Self::Api { .. } => "api_error",
            Self::Parse(_) => "parse_error",
            Self::Credentials(_) => "credentials",
            Self::Config(_) => "config_error",
        }
    }
}

#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Up to `max_results` entries in catalog relevance order.
    async fn search(&self, text: &str, max_results: usize) -> Result<CatalogResponse, CatalogError>;
}

/// A JSON field that holds either a single object or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item),
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub food: Option<OneOrMany<CatalogEntry>>,
}

impl CatalogResponse {
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self {
            food: Some(OneOrMany::Many(entries)),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        self.food.as_ref().map(OneOrMany::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub food_id: String,
    pub food_name: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub food_description: String,
}

impl CatalogEntry {
    pub fn new(
        food_id: impl Into<String>,
        food_name: impl Into<String>,
        brand_name: Option<&str>,
        food_description: impl Into<String>,
    ) -> Self {
        Self {
            food_id: food_id.into(),
            food_name: food_name.into(),
            brand_name: brand_name.map(str::to_string),
            food_description: food_description.into(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
