use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// What the service reported about a failed HTTP exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureDetail {
    pub status: u16,
    /// Service error code, e.g. "rate_limit_exceeded".
    pub code: Option<String>,
    /// `x-request-id` response header.
    pub request_id: Option<String>,
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(code) = &self.code {
            write!(f, ", code {code}")?;
        }
        if let Some(id) = &self.request_id {
            write!(f, ", request {id}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited ({detail}), retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        detail: FailureDetail,
    },

    /// Non-success status other than 429. Retryable when the status is 5xx.
    #[error("service error ({detail}): {message}")]
    Status {
        message: String,
        detail: FailureDetail,
    },

    #[error("refused: {0}")]
    Refused(String),

    /// A success status whose body could not be used.
    #[error("unusable response: {0}")]
    BadResponse(String),

    #[error("prompt too large: {0} chars")]
    PromptTooLarge(usize),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Status { detail, .. } => detail.status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Refused(_) | Self::BadResponse(_) | Self::PromptTooLarge(_) | Self::Config(_) => {
                false
            }
        }
    }

    /// Short error code for logs and usage records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Status { .. } => "service_error",
            Self::Refused(_) => "refused",
            Self::BadResponse(_) => "bad_response",
            Self::PromptTooLarge(_) => "prompt_too_large",
            Self::Http(e) if e.is_timeout() => "timeout",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    pub fn detail(&self) -> Option<&FailureDetail> {
        match self {
            Self::RateLimited { detail, .. } | Self::Status { detail, .. } => Some(detail),
            _ => None,
        }
    }

    /// Service-side request id, for matching a failure against provider logs.
    pub fn request_id(&self) -> Option<&str> {
        self.detail().and_then(|d| d.request_id.as_deref())
    }
}
