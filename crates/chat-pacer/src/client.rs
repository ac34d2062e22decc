use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{Capability, ClientError};
use crate::model::{ModelRef, ProviderId};
use crate::pacing::PacingConfig;
use crate::provider::ProviderAdapter;
use crate::request::{ChatRequest, FimRequest, RerankRequest, RerankScore};
use crate::stream::ChatStream;
use crate::text::{TextChunk, TextStream};

/// Entry point for starting paced streams against registered providers.
#[derive(Clone)]
pub struct ChatClient {
    providers: Arc<HashMap<ProviderId, Arc<dyn ProviderAdapter>>>,
    pacing: PacingConfig,
}

impl ChatClient {
    /// Starts a builder for registering providers and pacing settings.
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::default()
    }

    /// Returns the pacing configuration applied to every stream.
    pub fn pacing(&self) -> &PacingConfig {
        &self.pacing
    }

    /// Starts the upstream call and returns the paced chat-shaped stream.
    ///
    /// Errors raised before the first upstream event (unknown provider,
    /// rejected request) are returned here; later failures arrive through the
    /// stream itself.
    pub async fn stream_chat(&self, mut request: ChatRequest) -> Result<ChatStream, ClientError> {
        if request.model.model.trim().is_empty() {
            return Err(ClientError::Validation("model must not be empty".into()));
        }
        let provider = self.provider(&request.model.provider)?;
        request.stream = true;
        let model = request.model.model.clone();

        let handle = provider.start_stream(request).await?;
        debug!(
            provider = %provider.id(),
            model = %model,
            request_id = ?handle.request_id,
            "upstream stream accepted"
        );
        Ok(ChatStream::from_upstream(
            model,
            handle.stream,
            self.pacing.clone(),
        ))
    }

    /// Same as [`stream_chat`](Self::stream_chat), re-shaped as legacy text chunks.
    pub async fn stream_text(&self, request: ChatRequest) -> Result<TextStream, ClientError> {
        Ok(TextStream::new(self.stream_chat(request).await?))
    }

    /// Streams to completion and returns the concatenated content.
    pub async fn collect_text(&self, request: ChatRequest) -> Result<String, ClientError> {
        self.stream_chat(request).await?.collect_text().await
    }

    /// Fill-in-the-middle completion. Not offered by chat-completions providers.
    pub fn fim_completion(&self, request: FimRequest) -> Result<TextChunk, ClientError> {
        unsupported(Capability::FillInTheMiddle, &request.model)
    }

    /// Document re-ranking. Not offered by chat-completions providers.
    pub fn rerank(&self, request: RerankRequest) -> Result<Vec<RerankScore>, ClientError> {
        unsupported(Capability::Rerank, &request.model)
    }

    /// Model listing. Not offered by chat-completions providers.
    pub fn list_models(&self) -> Result<Vec<ModelRef>, ClientError> {
        debug!(capability = %Capability::ListModels, "unsupported capability requested");
        Err(ClientError::unsupported(Capability::ListModels))
    }

    fn provider(&self, id: &ProviderId) -> Result<Arc<dyn ProviderAdapter>, ClientError> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::ProviderNotFound {
                provider: id.clone(),
            })
    }
}

fn unsupported<T>(capability: Capability, model: &ModelRef) -> Result<T, ClientError> {
    debug!(%capability, model = %model, "unsupported capability requested");
    Err(ClientError::unsupported(capability))
}

/// Builder used to register provider adapters before creating a `ChatClient`.
#[derive(Default)]
pub struct ChatClientBuilder {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    pacing: Option<PacingConfig>,
}

impl ChatClientBuilder {
    /// Registers a provider adapter. One adapter per provider id.
    pub fn register_provider(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Overrides the default pacing configuration.
    pub fn pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Builds the client, rejecting duplicate provider ids and unusable pacing.
    pub fn build(self) -> Result<ChatClient, ClientError> {
        let pacing = self.pacing.unwrap_or_default();
        pacing.validate()?;

        let mut providers: HashMap<ProviderId, Arc<dyn ProviderAdapter>> = HashMap::new();
        for provider in self.providers {
            let id = provider.id();
            if providers.contains_key(&id) {
                return Err(ClientError::Config(format!(
                    "duplicate provider registration: {id}"
                )));
            }
            providers.insert(id, provider);
        }
        Ok(ChatClient {
            providers: Arc::new(providers),
            pacing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::RawEvent;
    use crate::errors::ProviderError;
    use crate::provider::ProviderStreamHandle;
    use crate::request::ChatMessage;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProvider {
        calls: Arc<AtomicUsize>,
        behavior: FakeBehavior,
    }

    enum FakeBehavior {
        Reject(ProviderError),
        Events(Vec<Result<RawEvent, ProviderError>>),
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for FakeProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new("fake")
        }

        async fn start_stream(
            &self,
            req: ChatRequest,
        ) -> Result<ProviderStreamHandle, ProviderError> {
            assert!(req.stream, "streaming path must set the stream flag");
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                FakeBehavior::Reject(err) => Err(err.clone()),
                FakeBehavior::Events(events) => Ok(ProviderStreamHandle::new(Box::pin(
                    stream::iter(events.clone()),
                ))),
            }
        }
    }

    fn client_with(behavior: FakeBehavior) -> (ChatClient, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = ChatClient::builder()
            .register_provider(Arc::new(FakeProvider {
                calls: calls.clone(),
                behavior,
            }))
            .build()
            .expect("build client");
        (client, calls)
    }

    fn request() -> ChatRequest {
        ChatRequest::new(ModelRef::new("fake", "model-a")).message(ChatMessage::user("hi"))
    }

    fn events(texts: &[&str]) -> Vec<Result<RawEvent, ProviderError>> {
        texts
            .iter()
            .map(|t| Ok(RawEvent::text(format!("evt-{t}"), 0, *t)))
            .collect()
    }

    #[test]
    fn build_rejects_duplicate_provider_ids() {
        let result = ChatClient::builder()
            .register_provider(Arc::new(FakeProvider {
                calls: Arc::default(),
                behavior: FakeBehavior::Events(vec![]),
            }))
            .register_provider(Arc::new(FakeProvider {
                calls: Arc::default(),
                behavior: FakeBehavior::Events(vec![]),
            }))
            .build();
        assert!(matches!(
            result,
            Err(ClientError::Config(message)) if message.contains("duplicate provider")
        ));
    }

    #[test]
    fn build_rejects_inverted_watermarks() {
        let result = ChatClient::builder()
            .pacing(PacingConfig::default().watermarks(30, 10))
            .build();
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stream_chat_stamps_request_model_on_every_chunk() {
        let (client, calls) = client_with(FakeBehavior::Events(events(&["a", "b", "c"])));
        let mut stream = client.stream_chat(request()).await.expect("start");

        let mut models = Vec::new();
        while let Some(chunk) = stream.next_chunk().await {
            models.push(chunk.expect("chunk").model);
        }
        assert_eq!(models, ["model-a", "model-a", "model-a"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_text_and_collect_text_share_the_paced_sequence() {
        let (client, _) = client_with(FakeBehavior::Events(events(&["he", "y"])));
        let mut text = client.stream_text(request()).await.expect("start");
        let first = text.next_chunk().await.expect("first").expect("ok");
        assert_eq!(first.text(), "he");
        assert_eq!(first.choices[0].finish_reason, "stop");

        assert_eq!(client.collect_text(request()).await.expect("text"), "hey");
    }

    #[tokio::test]
    async fn start_failure_is_returned_before_any_stream() {
        let (client, _) = client_with(FakeBehavior::Reject(ProviderError::provider(
            "fake",
            "unauthorized",
            Some(401),
        )));
        let err = client.stream_chat(request()).await.err().expect("should fail");
        assert!(matches!(
            err,
            ClientError::Provider(ProviderError::Provider { status_code: Some(401), .. })
        ));
    }

    #[tokio::test]
    async fn unknown_provider_and_empty_model_fail_fast() {
        let (client, calls) = client_with(FakeBehavior::Events(vec![]));
        let err = client
            .stream_chat(ChatRequest::new(ModelRef::new("missing", "m")))
            .await
            .err()
            .expect("missing provider");
        assert!(matches!(err, ClientError::ProviderNotFound { .. }));

        let err = client
            .stream_chat(ChatRequest::new(ModelRef::new("fake", " ")))
            .await
            .err()
            .expect("empty model");
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn capability_stubs_always_fail_without_touching_providers() {
        let (client, calls) = client_with(FakeBehavior::Events(vec![]));
        let model = ModelRef::new("fake", "model-a");

        let fim = client.fim_completion(FimRequest {
            model: model.clone(),
            prompt: "fn main() {".into(),
            suffix: Some("}".into()),
        });
        assert!(matches!(
            fim,
            Err(ClientError::Unsupported { capability: Capability::FillInTheMiddle })
        ));

        let rerank = client.rerank(RerankRequest {
            model,
            query: "q".into(),
            documents: vec!["d".into()],
        });
        assert!(matches!(
            rerank,
            Err(ClientError::Unsupported { capability: Capability::Rerank })
        ));

        assert!(matches!(
            client.list_models(),
            Err(ClientError::Unsupported { capability: Capability::ListModels })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
