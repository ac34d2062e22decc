/// Kind discriminator carried by every normalized chat chunk.
pub const CHAT_CHUNK_KIND: &str = "chat";

/// Role assigned to a delta when the upstream omits it.
pub const DEFAULT_ROLE: &str = "assistant";

/// Token accounting reported by a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Delta fields of one upstream choice. Every field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// One choice of an upstream partial-completion event.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: RawDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// A partial-completion event as received from the upstream provider.
///
/// Matches the OpenAI-compatible `chat.completion.chunk` object; unknown
/// fields are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<RawChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl RawEvent {
    /// Builds a single-choice event carrying `content`.
    pub fn text(id: impl Into<String>, created: i64, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created,
            model: None,
            choices: vec![RawChoice {
                index: 0,
                delta: RawDelta {
                    role: None,
                    content: Some(content.into()),
                },
                finish_reason: None,
            }],
            usage: None,
        }
    }
}

/// Normalized delta: role and content are always present.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatDelta {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub delta: ChatDelta,
    /// Always `None` on streamed chunks.
    pub finish_reason: Option<String>,
}

/// Provider-agnostic streamed chunk released by [`ChatStream`](crate::ChatStream).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatChunk {
    pub id: String,
    /// Kind discriminator, always [`CHAT_CHUNK_KIND`].
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    /// Always `None` mid-stream.
    pub usage: Option<Usage>,
}

impl ChatChunk {
    /// Concatenated content of all choices.
    pub fn text(&self) -> String {
        self.choices
            .iter()
            .map(|choice| choice.delta.content.as_str())
            .collect()
    }

    /// Number of content characters this chunk releases.
    pub fn content_len(&self) -> usize {
        self.choices
            .iter()
            .map(|choice| choice.delta.content.chars().count())
            .sum()
    }
}
