//! Per-attempt spend records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

/// One attempt against the estimation service, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub ts: DateTime<Utc>,
    pub model: String,
    pub caller: &'static str,
    pub request_id: Option<Uuid>,
    /// Zero-based transport attempt.
    pub attempt: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_nanodollars: i64,
    pub latency_ms: u64,
    /// `None` on success.
    pub error_code: Option<&'static str>,
    /// Service-side request id of a failed attempt.
    pub provider_request_id: Option<String>,
}

/// Recording is fire-and-forget; sinks log their own failures.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: CallRecord);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: CallRecord) {}
}

/// One JSON line per attempt on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrUsageSink;

#[async_trait]
impl UsageSink for StderrUsageSink {
    async fn record(&self, record: CallRecord) {
        match serde_json::to_string(&record) {
            Ok(line) => eprintln!("{line}"),
            Err(err) => warn!(error = %err, "usage record not serializable"),
        }
    }
}
