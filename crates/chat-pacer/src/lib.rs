//! Streaming response pacing and normalization for LLM chat completions.
//!
//! Upstream partial-completion events arrive in irregular bursts. A drain
//! task normalizes each one into a provider-agnostic [`ChatChunk`] and queues
//! it in a backlog; the pacing loop behind [`ChatStream::next_chunk`] releases
//! chunks at a cadence driven by backlog depth. Order and count are preserved
//! end to end. [`TextStream`] re-shapes the same sequence for legacy
//! text-completion callers.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chat_pacer::prelude::*;
//! use chat_pacer::vendors::openai_compat::{OPENAI_COMPAT_PROVIDER, OpenAiCompatProvider};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = ChatClient::builder()
//!     .register_provider(Arc::new(OpenAiCompatProvider::from_env()?))
//!     .pacing(PacingConfig::from_env()?)
//!     .build()?;
//!
//! let mut stream = client
//!     .stream_chat(
//!         ChatRequest::new(ModelRef::new(OPENAI_COMPAT_PROVIDER, "gpt-4o-mini"))
//!             .message(ChatMessage::user("Say hello")),
//!     )
//!     .await?;
//!
//! while let Some(chunk) = stream.next_chunk().await {
//!     print!("{}", chunk?.text());
//! }
//! # Ok(())
//! # }
//! ```

mod backlog;
/// Raw upstream events and normalized chunk shapes.
pub mod chunk;
/// Client facade, provider registry and unsupported-capability stubs.
pub mod client;
/// Public error types.
pub mod errors;
/// Provider and model identifiers.
pub mod model;
/// Pure event-to-chunk normalization.
pub mod normalize;
/// Tracing subscriber setup.
pub mod observability;
/// Pacing thresholds and per-stream counters.
pub mod pacing;
/// Common imports for typical usage.
pub mod prelude;
/// Upstream provider contract.
pub mod provider;
/// Request shapes in the common format.
pub mod request;
/// Paced chat stream and cancellation handle.
pub mod stream;
/// Legacy text-completion adapter.
pub mod text;
/// Vendor-specific upstream integrations.
pub mod vendors;

pub use chunk::{ChatChoice, ChatChunk, ChatDelta, RawChoice, RawDelta, RawEvent, Usage};
pub use client::{ChatClient, ChatClientBuilder};
pub use errors::{Capability, ClientError, ProviderError};
pub use model::{ModelRef, ProviderId};
pub use normalize::normalize_event;
pub use observability::init_observability;
pub use pacing::{PacingConfig, PacingState};
pub use provider::{ProviderAdapter, ProviderStreamHandle, RawEventStream};
pub use request::{
    ChatMessage, ChatRequest, FimRequest, GenerationParams, RerankRequest, RerankScore, Role,
};
pub use stream::{AbortHandle, ChatStream};
pub use text::{TextChoice, TextChunk, TextStream, to_text_chunk};
