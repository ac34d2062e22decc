//! OpenAI-compatible chat completions upstream.
//!
//! Any endpoint speaking the `/v1/chat/completions` streaming dialect
//! (OpenAI, Mistral, vLLM, gateways) can feed the pacing engine through
//! `OpenAiCompatProvider`.
mod adapter;
mod config;
pub(crate) mod transport;

pub use adapter::{OPENAI_COMPAT_PROVIDER, OpenAiCompatProvider};
pub use config::OpenAiCompatConfig;
