//! Request shapes accepted by [`ChatClient`](crate::ChatClient).
//!
//! These are already in the provider-agnostic "common" shape; provider
//! adapters translate them into their native wire format.

use crate::model::ModelRef;

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of the conversation sent upstream.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Optional sampling parameters, forwarded as-is.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// A chat completion request in the common shape.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatRequest {
    pub model: ModelRef,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub params: GenerationParams,
    /// Set by the client on the streaming path.
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    /// Creates a request with default generation parameters.
    pub fn new(model: ModelRef) -> Self {
        Self {
            model,
            messages: Vec::new(),
            params: GenerationParams::default(),
            stream: false,
        }
    }

    /// Appends a message.
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Sets the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = Some(temperature);
        self
    }

    /// Caps the number of generated tokens.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = Some(max_tokens);
        self
    }
}

/// Fill-in-the-middle request (prefix/suffix completion).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FimRequest {
    pub model: ModelRef,
    pub prompt: String,
    pub suffix: Option<String>,
}

/// Re-ranking request: order `documents` by relevance to `query`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RerankRequest {
    pub model: ModelRef,
    pub query: String,
    pub documents: Vec<String>,
}

/// One scored document of a re-ranking result.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub relevance_score: f64,
}
