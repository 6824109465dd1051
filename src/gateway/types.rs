//! Request and response shapes shared by every chat backend.

use serde::Serialize;
use uuid::Uuid;

/// Ties a call to the resolution and stage that made it.
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    pub request_id: Option<Uuid>,
    /// Resolver stage, e.g. "resolver::select".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            request_id: None,
        }
    }

    pub fn with_request(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A deterministic (temperature 0) completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// OpenRouter model id, e.g. "openai/gpt-4o-mini".
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    /// Ask the service for a bare JSON object.
    pub json_mode: bool,
    pub attribution: Attribution,
}

impl ChatRequest {
    /// JSON-mode request, which is what every resolver stage sends.
    pub fn json(
        model: impl Into<String>,
        messages: Vec<Message>,
        max_tokens: u32,
        attribution: Attribution,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens,
            json_mode: true,
            attribution,
        }
    }

    pub fn input_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Nanodollars (1e-9 USD) at list price.
    pub cost_nanodollars: i64,
}

impl ChatResponse {
    /// Content with no usage attached, as in-process gateways produce.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost_nanodollars: 0,
        }
    }
}
