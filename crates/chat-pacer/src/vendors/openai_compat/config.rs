use std::time::Duration;

use crate::errors::ClientError;

const ENV_API_KEY: &str = "CHAT_PACER_API_KEY";
const ENV_BASE_URL: &str = "CHAT_PACER_BASE_URL";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiCompatConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL of the endpoint (without `/v1/...`).
    pub base_url: String,
    /// Default HTTP timeout for requests.
    pub timeout: Duration,
}

impl OpenAiCompatConfig {
    /// Creates a config with default endpoint and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Builds a config from `CHAT_PACER_API_KEY` and, when set,
    /// `CHAT_PACER_BASE_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        let api_key = std::env::var(ENV_API_KEY).unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(ClientError::Config(format!(
                "missing {ENV_API_KEY} for OpenAI-compatible provider"
            )));
        }
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var(ENV_BASE_URL)
            && !base_url.trim().is_empty()
        {
            config.base_url = base_url;
        }
        Ok(config)
    }

    /// Overrides the API base URL (for proxies, gateways or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the default HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_completions_url_trims_trailing_slash() {
        let config = OpenAiCompatConfig::new("k").base_url("http://localhost:8080/");
        assert_eq!(
            config.chat_completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }
}
