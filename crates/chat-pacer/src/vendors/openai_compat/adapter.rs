use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::chunk::RawEvent;
use crate::errors::{ClientError, ProviderError};
use crate::model::ProviderId;
use crate::provider::{ProviderAdapter, ProviderStreamHandle};
use crate::request::ChatRequest;

use super::config::OpenAiCompatConfig;
use super::transport::{SseDecoder, decode_chunk_frame};

/// Id this adapter registers under; use it as `ModelRef::provider`.
pub const OPENAI_COMPAT_PROVIDER: &str = "openai-compat";

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// Provider adapter for OpenAI-compatible `/v1/chat/completions` streaming.
pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatProvider {
    /// Creates a provider from explicit client configuration.
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, ClientError> {
        if config.api_key.trim().is_empty() {
            return Err(ClientError::Config(
                "OpenAI-compatible config api_key must not be empty".into(),
            ));
        }
        if config.base_url.trim().is_empty() {
            return Err(ClientError::Config(
                "OpenAI-compatible config base_url must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a provider from `CHAT_PACER_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(OpenAiCompatConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiCompatProvider {
    fn id(&self) -> ProviderId {
        ProviderId::new(OPENAI_COMPAT_PROVIDER)
    }

    async fn start_stream(&self, req: ChatRequest) -> Result<ProviderStreamHandle, ProviderError> {
        let provider_id = self.id();
        let body = build_request_body(&req);
        debug!(
            model = %req.model.model,
            messages = req.messages.len(),
            "starting chat completions stream"
        );

        let response = self
            .client
            .post(self.config.chat_completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ProviderError::transport(provider_id.clone(), format!("request failed: {e}"))
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::provider(
                provider_id,
                format!("chat completions request failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(ProviderStreamHandle {
            stream: Box::pin(raw_event_stream(provider_id, bytes_stream)),
            request_id,
        })
    }
}

/// Translates the common request shape into the chat completions body.
pub(crate) fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": req.model.model,
        "messages": req.messages,
        "stream": req.stream,
    });
    let params = &req.params;
    if let Some(temperature) = params.temperature {
        body["temperature"] = serde_json::json!(temperature);
    }
    if let Some(top_p) = params.top_p {
        body["top_p"] = serde_json::json!(top_p);
    }
    if let Some(max_tokens) = params.max_tokens {
        body["max_tokens"] = serde_json::json!(max_tokens);
    }
    if !params.stop.is_empty() {
        body["stop"] = serde_json::json!(params.stop);
    }
    body
}

fn raw_event_stream(
    provider_id: ProviderId,
    bytes_stream: ByteStream,
) -> impl futures::Stream<Item = Result<RawEvent, ProviderError>> + Send {
    struct State {
        provider_id: ProviderId,
        bytes_stream: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<RawEvent>,
        done: bool,
    }

    stream::try_unfold(
        State {
            provider_id,
            bytes_stream,
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                let frames = match state.bytes_stream.next().await {
                    Some(Ok(chunk)) => state.decoder.push_chunk(&chunk),
                    Some(Err(e)) => {
                        return Err(ProviderError::transport(
                            state.provider_id,
                            format!("streaming read failed: {e}"),
                        ));
                    }
                    None => {
                        state.done = true;
                        state.decoder.finish().into_iter().collect()
                    }
                };
                for frame in frames {
                    if let Some(event) = decode_chunk_frame(&state.provider_id, &frame)? {
                        state.pending.push_back(event);
                    }
                }
            }
        },
    )
}
