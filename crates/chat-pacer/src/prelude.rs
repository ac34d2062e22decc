//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, ChatChunk, ChatClient, ChatMessage, ChatRequest, ChatStream, ClientError,
    ModelRef, PacingConfig, ProviderId, TextChunk, TextStream,
};
