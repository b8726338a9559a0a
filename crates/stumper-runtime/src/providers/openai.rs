//! OpenAI-compatible chat-completions provider.
//!
//! Works against any endpoint exposing `POST {base_url}/chat/completions`:
//! OpenRouter, OpenAI, Ollama and self-hosted gateways. The endpoint kind is
//! detected from the base URL and only changes a few request details.
//!
//! Calls log model, latency and token usage. The API key and full payloads
//! are never logged.

use super::{
    factory::ProviderFactory, secrets::ApiCredential, ChatMessage, CompletionConfig,
    CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Default endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default Ollama context window.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 32768;

const APP_TITLE: &str = "LLM Quiz Challenge";
const APP_REFERER: &str = "https://github.com/stumper-quiz/stumper";

/// Kind of OpenAI-compatible endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    OpenRouter,
    OpenAi,
    Ollama,
    Custom,
}

impl EndpointKind {
    /// Detect the endpoint kind from a base URL.
    pub fn detect(base_url: &str) -> Self {
        let url = base_url.to_lowercase();
        if url.contains("openrouter.ai") {
            EndpointKind::OpenRouter
        } else if url.contains("api.openai.com") {
            EndpointKind::OpenAi
        } else if url.contains(":11434") || url.contains("ollama") {
            EndpointKind::Ollama
        } else {
            EndpointKind::Custom
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::OpenRouter => "openrouter",
            EndpointKind::OpenAi => "openai",
            EndpointKind::Ollama => "ollama",
            EndpointKind::Custom => "custom",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider for OpenAI-compatible endpoints.
pub struct OpenAiCompatProvider {
    credential: Option<ApiCredential>,
    base_url: String,
    kind: EndpointKind,
    context_window: u32,
    client: reqwest::Client,
}

impl fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("kind", &self.kind)
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// Create a provider for `base_url`.
    ///
    /// A missing credential is accepted for Ollama and custom endpoints.
    pub fn new(
        base_url: impl Into<String>,
        credential: Option<ApiCredential>,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }

        let kind = EndpointKind::detect(&base_url);
        if credential.is_none() && matches!(kind, EndpointKind::OpenRouter | EndpointKind::OpenAi) {
            return Err(ProviderError::NotConfigured(format!(
                "{} requires an API key",
                kind
            )));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        info!(endpoint = %kind, base_url = %base_url, "Initialized chat-completions provider");

        Ok(Self {
            credential,
            base_url,
            kind,
            context_window: DEFAULT_CONTEXT_WINDOW,
            client,
        })
    }

    /// Create from JSON configuration with environment fallback for the key.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let base_url = config["base_url"].as_str().unwrap_or(DEFAULT_BASE_URL);
        let mut provider = Self::new(base_url, ApiCredential::from_config(config))?;

        if let Some(window) = config["context_window_size"].as_u64() {
            provider.context_window = u32::try_from(window).unwrap_or(u32::MAX);
        }
        Ok(provider)
    }

    /// Set the context window sent to Ollama as `options.num_ctx`.
    pub fn with_context_window(mut self, tokens: u32) -> Self {
        self.context_window = tokens;
        self
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, messages: Vec<ChatMessage>, config: &CompletionConfig) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: config.model.clone(),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: false,
            response_format: config.response_format.clone(),
            options: match self.kind {
                EndpointKind::Ollama => Some(OllamaOptions {
                    num_ctx: self.context_window,
                }),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_ctx: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u32,
}

/// Pull `error.message` (or a string `error`) out of an error body.
fn extract_error_message(body: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(body).ok()?;
    match &value["error"] {
        JsonValue::Object(obj) => obj.get("message").and_then(|m| m.as_str()).map(String::from),
        JsonValue::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Map a non-success status to a provider error.
fn map_status(status: u16, body: &str, model: &str, retry_after: Option<Duration>) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthError,
        404 => ProviderError::ModelNotFound(format!(
            "'{}' not found or endpoint not available",
            model
        )),
        429 => ProviderError::RateLimited { retry_after },
        _ => {
            let mut message = extract_error_message(body).unwrap_or_else(|| body.to_string());
            if message.len() > 300 {
                let cut = (0..=300).rev().find(|i| message.is_char_boundary(*i)).unwrap_or(0);
                message.truncate(cut);
            }
            ProviderError::ApiError { status, message }
        }
    }
}

fn parse_body(body: ChatCompletionResponse, requested_model: &str) -> Result<CompletionResponse, ProviderError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ParseError("No choices in API response".to_string()))?;

    let content = choice
        .message
        .content
        .ok_or_else(|| ProviderError::ParseError("Response message has no content".to_string()))?
        .trim()
        .to_string();

    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            cached_tokens: u.prompt_tokens_details.map(|d| d.cached_tokens).unwrap_or(0),
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content,
        usage,
        model: body.model.unwrap_or_else(|| requested_model.to_string()),
        stop_reason: choice.finish_reason,
    })
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    #[instrument(level = "debug", skip(self, messages, config), fields(model = %config.model, endpoint = %self.kind))]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(messages, config);
        let start = Instant::now();

        let mut builder = self
            .client
            .post(&url)
            .header(USER_AGENT, concat!("stumper/", env!("CARGO_PKG_VERSION")))
            .header(CONTENT_TYPE, "application/json")
            .timeout(config.timeout)
            .json(&request);

        // Only expose the credential here, at the point of use
        if let Some(credential) = &self.credential {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", credential.expose()));
        }

        if self.kind == EndpointKind::OpenRouter {
            builder = builder
                .header("HTTP-Referer", APP_REFERER)
                .header("X-Title", APP_TITLE);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(config.timeout)
            } else {
                ProviderError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            let error = map_status(status.as_u16(), &body, &config.model, retry_after);
            warn!(status = status.as_u16(), error = %error, elapsed = ?start.elapsed(), "Chat completion failed");
            return Err(error);
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(config.timeout)
            } else {
                ProviderError::ParseError(e.to_string())
            }
        })?;

        let completion = parse_body(body, &config.model)?;
        info!(
            model = %completion.model,
            elapsed = ?start.elapsed(),
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            response_chars = completion.content.len(),
            "Chat completion received"
        );
        debug!(stop_reason = ?completion.stop_reason, "Chat completion finished");

        Ok(completion)
    }

    async fn health_check(&self) -> bool {
        match self.kind {
            EndpointKind::OpenRouter | EndpointKind::OpenAi => self
                .credential
                .as_ref()
                .is_some_and(|c| !c.is_empty()),
            EndpointKind::Ollama | EndpointKind::Custom => true,
        }
    }

    fn name(&self) -> &str {
        self.kind.as_str()
    }
}

/// Factory for OpenAI-compatible providers.
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "sk-...",                        // Optional, falls back to env
///   "base_url": "https://openrouter.ai/api/v1", // Optional
///   "context_window_size": 32768                // Optional, Ollama only
/// }
/// ```
pub struct OpenAiCompatProviderFactory;

impl ProviderFactory for OpenAiCompatProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai-compatible"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let provider = OpenAiCompatProvider::from_config(config)?;
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        let base_url = config["base_url"].as_str().unwrap_or(DEFAULT_BASE_URL);
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ProviderError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }

        let kind = EndpointKind::detect(base_url);
        if matches!(kind, EndpointKind::OpenRouter | EndpointKind::OpenAi)
            && !ApiCredential::is_available(config)
        {
            return Err(ProviderError::NotConfigured(format!(
                "{} requires an API key: set 'api_key' in config or STUMPER_API_KEY",
                kind
            )));
        }

        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({
            "base_url": DEFAULT_BASE_URL,
            "context_window_size": DEFAULT_CONTEXT_WINDOW
        })
    }

    fn description(&self) -> &'static str {
        "OpenAI-compatible chat completions (OpenRouter, OpenAI, Ollama)"
    }
}
