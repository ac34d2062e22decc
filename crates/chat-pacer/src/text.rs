//! Legacy "text completion" view over a paced chat stream.

use crate::chunk::{ChatChunk, Usage};
use crate::errors::ClientError;
use crate::stream::{AbortHandle, ChatStream};

/// Kind discriminator carried by every text chunk.
pub const TEXT_CHUNK_KIND: &str = "text_completion";

/// Finish reason stamped on every text chunk, intermediate ones included.
pub const TEXT_FINISH_REASON: &str = "stop";

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextChoice {
    pub index: u32,
    pub text: String,
    pub finish_reason: String,
}

/// Flat text delta for callers that predate the chat shape.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<TextChoice>,
    pub usage: Usage,
}

impl TextChunk {
    /// Concatenated text of all choices.
    pub fn text(&self) -> String {
        self.choices.iter().map(|c| c.text.as_str()).collect()
    }
}

/// Maps one chat chunk to its text-completion view.
pub fn to_text_chunk(chunk: &ChatChunk) -> TextChunk {
    TextChunk {
        id: chunk.id.clone(),
        object: TEXT_CHUNK_KIND.to_string(),
        created: chunk.created,
        model: chunk.model.clone(),
        choices: chunk
            .choices
            .iter()
            .map(|choice| TextChoice {
                index: choice.index,
                text: choice.delta.content.clone(),
                finish_reason: TEXT_FINISH_REASON.to_string(),
            })
            .collect(),
        usage: chunk.usage.unwrap_or_default(),
    }
}

/// [`ChatStream`] re-shaped as text chunks. Adds no delay of its own.
pub struct TextStream {
    inner: ChatStream,
}

impl TextStream {
    pub fn new(inner: ChatStream) -> Self {
        Self { inner }
    }

    pub fn stream_id(&self) -> uuid::Uuid {
        self.inner.stream_id()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.inner.abort_handle()
    }

    /// Waits for the next paced chunk and maps it.
    pub async fn next_chunk(&mut self) -> Option<Result<TextChunk, ClientError>> {
        self.inner
            .next_chunk()
            .await
            .map(|item| item.map(|chunk| to_text_chunk(&chunk)))
    }

    /// Converts into a `futures::Stream` of text chunks.
    pub fn into_stream(self) -> impl futures::Stream<Item = Result<TextChunk, ClientError>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let item = stream.next_chunk().await?;
            Some((item, stream))
        })
    }
}

impl From<ChatStream> for TextStream {
    fn from(inner: ChatStream) -> Self {
        Self::new(inner)
    }
}
