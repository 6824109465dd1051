//! Single-attempt OpenRouter chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{FailureDetail, ProviderError};
use super::pricing::chat_cost;
use super::types::{ChatRequest, ChatResponse, Message};
use super::ChatGateway;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolver prompts are a few hundred tokens.
const MAX_PROMPT_CHARS: usize = 64_000;

/// Resolver answers are small JSON objects.
const MAX_BODY_BYTES: usize = 256 * 1_024;

/// Fallback wait when a 429 carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

const REFUSAL_OPENERS: &[&str] = &[
    "i cannot",
    "i can't",
    "i won't",
    "i am unable to",
    "i'm unable to",
    "unable to assist",
    "unable to help",
];

#[derive(Debug, Clone)]
pub struct OpenRouterAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl OpenRouterAdapter {
    /// Reads `OPENROUTER_API_KEY`, with optional `OPENROUTER_BASE_URL` and
    /// `OPENROUTER_TIMEOUT_SECONDS`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ProviderError::Config("OPENROUTER_API_KEY not set".to_string()))?;
        let base_url =
            std::env::var("OPENROUTER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout = std::env::var("OPENROUTER_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        Self::with_config(&api_key, &base_url, timeout)
    }

    pub fn with_config(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ProviderError::Config("API key is not a valid header value".to_string()))?;
        bearer.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: Option<ToolFunction>,
}

#[derive(Deserialize)]
struct ToolFunction {
    arguments: Option<String>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<Value>,
}

impl ChoiceMessage {
    /// Message text, or the first non-empty tool-call arguments when a model
    /// answers JSON mode through a tool call.
    fn into_text(self) -> String {
        match self.content {
            Some(text) if !text.trim().is_empty() => text,
            _ => self
                .tool_calls
                .into_iter()
                .filter_map(|call| call.function.and_then(|f| f.arguments))
                .find(|args| !args.trim().is_empty())
                .unwrap_or_default(),
        }
    }
}

fn is_refusal(text: &str) -> bool {
    let first_line = text.trim_start().lines().next().unwrap_or("").to_lowercase();
    REFUSAL_OPENERS.iter().any(|p| first_line.starts_with(p))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Map a non-success exchange to an error, keeping whatever the body says.
fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> ProviderError {
    let api_error = serde_json::from_str::<Completion>(body)
        .ok()
        .and_then(|c| c.error);
    let (message, code) = match api_error {
        Some(e) => (
            e.message.unwrap_or_default(),
            e.code.map(|c| match c {
                Value::String(s) => s,
                other => other.to_string(),
            }),
        ),
        None => (String::new(), None),
    };
    let detail = FailureDetail {
        status: status.as_u16(),
        code,
        request_id: header_str(headers, "x-request-id"),
    };

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = header_str(headers, "retry-after")
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER);
        return ProviderError::RateLimited {
            retry_after,
            detail,
        };
    }
    ProviderError::Status { message, detail }
}

#[async_trait]
impl ChatGateway for OpenRouterAdapter {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let chars = req.input_chars();
        if chars > MAX_PROMPT_CHARS {
            return Err(ProviderError::PromptTooLarge(chars));
        }

        let body = CompletionBody {
            model: &req.model,
            messages: &req.messages,
            temperature: 0.0,
            max_tokens: req.max_tokens,
            response_format: req
                .json_mode
                .then(|| serde_json::json!({ "type": "json_object" })),
        };
        let mut response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > MAX_BODY_BYTES {
                return Err(ProviderError::BadResponse(format!(
                    "body exceeds {MAX_BODY_BYTES} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        let text = String::from_utf8_lossy(&bytes);

        if !status.is_success() {
            return Err(status_error(status, &headers, &text));
        }

        let completion: Completion = serde_json::from_str(&text)
            .map_err(|e| ProviderError::BadResponse(format!("invalid JSON: {e}")))?;
        if let Some(error) = completion.error {
            let message = error.message.unwrap_or_default();
            return Err(if is_refusal(&message) {
                ProviderError::Refused(message)
            } else {
                ProviderError::BadResponse(message)
            });
        }

        let content = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::BadResponse("no choices".to_string()))?
            .message
            .map(ChoiceMessage::into_text)
            .unwrap_or_default();
        if is_refusal(&content) {
            return Err(ProviderError::Refused(content));
        }

        let usage = completion.usage.unwrap_or_default();
        Ok(ChatResponse {
            content,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cost_nanodollars: chat_cost(&req.model, usage.prompt_tokens, usage.completion_tokens),
        })
    }
}
