use std::fmt;

use crate::model::ProviderId;

/// Errors raised by an upstream provider before they reach the paced stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Provider returned an application-level failure (HTTP status, auth, etc.).
    #[error("provider error ({provider}): {message}")]
    Provider {
        provider: ProviderId,
        message: String,
        status_code: Option<u16>,
    },
    /// Transport or stream I/O failed.
    #[error("transport error ({provider}): {message}")]
    Transport {
        provider: ProviderId,
        message: String,
    },
    /// Provider response shape or event sequencing was invalid.
    #[error("protocol error ({provider}): {message}")]
    Protocol {
        provider: ProviderId,
        message: String,
    },
}

impl ProviderError {
    /// Creates a provider-level error.
    pub fn provider(
        provider: impl Into<ProviderId>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Creates a transport-level error.
    pub fn transport(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol-level error.
    pub fn protocol(provider: impl Into<ProviderId>, message: impl Into<String>) -> Self {
        Self::Protocol {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Returns the provider associated with this error.
    pub fn provider_id(&self) -> &ProviderId {
        match self {
            Self::Provider { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Protocol { provider, .. } => provider,
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Provider { message, .. }
            | Self::Transport { message, .. }
            | Self::Protocol { message, .. } => message,
        }
    }
}

/// Operations some providers do not offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Fill-in-the-middle (prefix + suffix) completion.
    FillInTheMiddle,
    /// Relevance re-ranking of candidate documents.
    Rerank,
    /// Listing the models a provider exposes.
    ListModels,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FillInTheMiddle => "fill-in-the-middle completion",
            Self::Rerank => "rerank",
            Self::ListModels => "model listing",
        })
    }
}

/// Top-level error type for the public client API and paced streams.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Missing or invalid connection/pacing configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Requested provider is not registered with the client.
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: ProviderId },
    /// Upstream failure, either at stream start or mid-stream.
    #[error(transparent)]
    Provider(ProviderError),
    /// The provider cannot perform the requested operation.
    #[error("{capability} is not supported by this provider")]
    Unsupported { capability: Capability },
    /// The stream was cancelled through its `AbortHandle`.
    #[error("stream cancelled")]
    Cancelled,
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub(crate) fn unsupported(capability: Capability) -> Self {
        Self::Unsupported { capability }
    }
}

impl From<ProviderError> for ClientError {
    fn from(value: ProviderError) -> Self {
        ClientError::Provider(value)
    }
}
