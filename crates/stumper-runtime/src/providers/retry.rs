//! Retry with exponential backoff for chat providers.
//!
//! Wraps any [`LlmProvider`] and retries transient failures (rate limits,
//! timeouts, connection errors, 5xx). Authentication errors, unknown models,
//! bad requests and budget exhaustion are returned immediately. When retries
//! run out, the last error is returned unchanged.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};
use crate::config::humantime_duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: usize,

    /// Delay before the first retry
    #[serde(with = "humantime_duration")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "humantime_duration")]
    pub max_delay: Duration,

    /// Randomize delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.initial_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// A provider wrapper that retries transient failures.
pub struct RetryProvider {
    inner: Arc<dyn LlmProvider>,
    config: RetryConfig,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn LlmProvider>) -> Self {
        Self::with_config(inner, RetryConfig::default())
    }

    pub fn with_config(inner: Arc<dyn LlmProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmProvider for RetryProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        if self.config.max_retries == 0 {
            return self.inner.complete(messages, config).await;
        }

        let inner = &self.inner;
        let attempt = || {
            let messages = messages.clone();
            async move { inner.complete(messages, config).await }
        };

        attempt
            .retry(self.config.backoff())
            .sleep(tokio::time::sleep)
            .when(|e: &ProviderError| e.is_transient())
            .notify(|e: &ProviderError, delay: Duration| {
                warn!(
                    provider = self.inner.name(),
                    model = %config.model,
                    error = %e,
                    delay = ?delay,
                    "Transient provider error, retrying"
                );
            })
            .await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn estimate_tokens(&self, text: &str) -> u32 {
        self.inner.estimate_tokens(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedProvider;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_transient_error_retried() {
        let inner = ScriptedProvider::new()
            .fail(ProviderError::RateLimited { retry_after: None })
            .reply("VERDICT: CORRECT")
            .shared();
        let provider = RetryProvider::with_config(inner.clone(), fast());

        let response = provider
            .complete(vec![ChatMessage::user("q")], &CompletionConfig::default())
            .await
            .unwrap();
        assert_eq!(response.content, "VERDICT: CORRECT");
        assert_eq!(inner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let inner = ScriptedProvider::new()
            .fail(ProviderError::AuthError)
            .reply("never reached")
            .shared();
        let provider = RetryProvider::with_config(inner.clone(), fast());

        let err = provider
            .complete(vec![ChatMessage::user("q")], &CompletionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::AuthError));
        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error() {
        let inner = ScriptedProvider::new()
            .fail(ProviderError::Timeout(Duration::from_secs(1)))
            .fail(ProviderError::Timeout(Duration::from_secs(1)))
            .fail(ProviderError::ApiError { status: 502, message: "bad gateway".into() })
            .reply("too late")
            .shared();
        let provider = RetryProvider::with_config(inner.clone(), fast());

        let err = provider
            .complete(vec![ChatMessage::user("q")], &CompletionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status: 502, .. }));
        assert_eq!(inner.call_count(), 3);
    }

    #[tokio::test]
    async fn test_disabled_makes_one_attempt() {
        let inner = ScriptedProvider::new()
            .fail(ProviderError::HttpError("reset".into()))
            .shared();
        let provider = RetryProvider::with_config(inner.clone(), RetryConfig::disabled());

        assert!(provider
            .complete(vec![], &CompletionConfig::default())
            .await
            .is_err());
        assert_eq!(inner.call_count(), 1);
    }

    #[test]
    fn test_config_from_yaml() {
        let config: RetryConfig = serde_yaml::from_str("max_retries: 4\ninitial_delay: 500ms\n").unwrap();
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(20));
    }
}
