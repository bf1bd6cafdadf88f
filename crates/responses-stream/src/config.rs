use std::time::Duration;

use crate::errors::StreamError;
use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Connection settings for a [`crate::Responder`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL of the Responses-compatible endpoint.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Per-request HTTP timeout. Applies to the whole streamed body too, so
    /// keep it above the longest expected generation.
    pub timeout: Duration,
    /// Retry behavior for opening requests.
    pub retry_policy: RetryPolicy,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
            retry_policy: RetryPolicy::defaults(),
        }
    }

    /// Reads `OPENAI_API_KEY` (required), `RESPONSES_BASE_URL` and
    /// `RESPONSES_MAX_RETRIES`.
    pub fn from_env() -> Result<Self, StreamError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StreamError> {
        let api_key = lookup("OPENAI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(StreamError::Config("missing OPENAI_API_KEY".into()));
        }
        let mut config = Self::new(api_key);
        if let Some(base_url) = lookup("RESPONSES_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = base_url.trim().to_string();
        }
        if let Some(raw) = lookup("RESPONSES_MAX_RETRIES") {
            let max_retries = raw.trim().parse::<u32>().map_err(|e| {
                StreamError::Config(format!("invalid RESPONSES_MAX_RETRIES '{raw}': {e}"))
            })?;
            config.retry_policy = RetryPolicy::builder().max_retries(max_retries).build()?;
        }
        Ok(config)
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn responses_url(&self) -> String {
        format!("{}/v1/responses", self.base_url.trim_end_matches('/'))
    }

    pub(crate) fn validate(&self) -> Result<(), StreamError> {
        if self.api_key.trim().is_empty() {
            return Err(StreamError::Config("api_key must not be empty".into()));
        }
        if self.base_url.trim().is_empty() {
            return Err(StreamError::Config("base_url must not be empty".into()));
        }
        Ok(())
    }
}
