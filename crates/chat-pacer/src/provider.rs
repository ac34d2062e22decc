use std::pin::Pin;

use crate::chunk::RawEvent;
use crate::errors::ProviderError;
use crate::model::ProviderId;
use crate::request::ChatRequest;

/// Ordered, finite sequence of upstream partial-completion events.
///
/// End of stream means the upstream is exhausted; an `Err` item is fatal.
pub type RawEventStream =
    Pin<Box<dyn futures::Stream<Item = Result<RawEvent, ProviderError>> + Send + 'static>>;

/// Upstream stream returned by a provider once the remote call is accepted.
pub struct ProviderStreamHandle {
    pub stream: RawEventStream,
    /// Provider-assigned request id, when the response exposes one.
    pub request_id: Option<String>,
}

impl ProviderStreamHandle {
    pub fn new(stream: RawEventStream) -> Self {
        Self {
            stream,
            request_id: None,
        }
    }
}

/// Contract implemented by each upstream integration.
///
/// Adapters own request translation, authentication and wire decoding; the
/// pacing layer only consumes the resulting [`RawEventStream`].
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable id the client registers this adapter under.
    fn id(&self) -> ProviderId;

    /// Starts a streaming completion for `req`.
    async fn start_stream(&self, req: ChatRequest) -> Result<ProviderStreamHandle, ProviderError>;
}
