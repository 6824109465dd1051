//! Gateway to the generative estimation service (OpenRouter chat completions).

pub mod error;
pub mod openrouter;
pub mod pricing;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::sleep;
use tracing::debug;

pub use error::{FailureDetail, ProviderError};
pub use openrouter::OpenRouterAdapter;
pub use pricing::chat_cost;
pub use types::{Attribution, ChatRequest, ChatResponse, Message, Role};
pub use usage::{CallRecord, NoopUsageSink, StderrUsageSink, UsageSink};

/// Seam between the resolver and any chat backend.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Transport-level retries for a single call.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Adds bounded retry and usage recording around a single-attempt backend.
pub struct ProviderGateway<G: ChatGateway = OpenRouterAdapter> {
    inner: G,
    usage_sink: Arc<dyn UsageSink>,
    config: GatewayConfig,
}

impl ProviderGateway<OpenRouterAdapter> {
    pub fn from_env(usage_sink: Arc<dyn UsageSink>) -> Result<Self, ProviderError> {
        Ok(Self::with_config(
            OpenRouterAdapter::from_env()?,
            usage_sink,
            GatewayConfig::default(),
        ))
    }
}

impl<G: ChatGateway> ProviderGateway<G> {
    pub fn with_config(inner: G, usage_sink: Arc<dyn UsageSink>, config: GatewayConfig) -> Self {
        Self {
            inner,
            usage_sink,
            config,
        }
    }

    async fn record(
        &self,
        req: &ChatRequest,
        attempt: u32,
        started: Instant,
        outcome: Result<&ChatResponse, &ProviderError>,
    ) {
        let (input_tokens, output_tokens, cost_nanodollars) = match outcome {
            Ok(resp) => (resp.input_tokens, resp.output_tokens, resp.cost_nanodollars),
            Err(_) => (0, 0, 0),
        };
        let record = CallRecord {
            ts: Utc::now(),
            model: req.model.clone(),
            caller: req.attribution.caller,
            request_id: req.attribution.request_id,
            attempt,
            input_tokens,
            output_tokens,
            cost_nanodollars,
            latency_ms: started.elapsed().as_millis() as u64,
            error_code: outcome.err().map(ProviderError::code),
            provider_request_id: outcome
                .err()
                .and_then(|e| e.request_id())
                .map(str::to_string),
        };
        self.usage_sink.record(record).await;
    }
}

#[async_trait::async_trait]
impl<G: ChatGateway> ChatGateway for ProviderGateway<G> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            let started = Instant::now();
            let result = self.inner.chat(req.clone()).await;
            self.record(&req, attempt, started, result.as_ref()).await;

            match result {
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = match &err {
                        ProviderError::RateLimited { retry_after, .. } => {
                            (*retry_after).min(backoff_delay(self.config.retry_base_delay, 5))
                        }
                        _ => backoff_delay(self.config.retry_base_delay, attempt),
                    };
                    debug!(
                        caller = req.attribution.caller,
                        attempt,
                        error = %err,
                        ?delay,
                        "retrying generative call"
                    );
                    attempt += 1;
                    sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base * 2u32.pow(attempt.min(5))
}
