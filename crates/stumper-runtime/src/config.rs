//! Challenge configuration.
//!
//! One immutable [`ChallengeConfig`] is built at startup and shared by every
//! component through an `Arc`. It can be loaded from YAML; every field has a
//! default, so an empty file is a valid configuration.
//!
//! ```yaml
//! endpoint:
//!   base_url: https://openrouter.ai/api/v1
//!   timeout: 30s
//! quiz_model:
//!   model: gpt-4o-mini
//! evaluator_model:
//!   model: gpt-4o
//!   max_tokens: 400
//! response_mode: structured
//! issue_taxonomy: module
//! module: "Module 3: Graph algorithms"
//! retry:
//!   max_retries: 2
//! budget:
//!   max_total_tokens: 200000
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use stumper_core::{IssueTaxonomy, ResponseMode};

use crate::providers::{CompletionConfig, RetryConfig};

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for human-readable durations ("30s", "2m 30s").
pub mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

/// Where the chat-completions endpoint lives.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,

    /// Per-request timeout
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,

    /// Context window sent to Ollama endpoints
    pub context_window_size: u32,

    /// API key; prefer the STUMPER_API_KEY environment variable
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            timeout: Duration::from_secs(30),
            context_window_size: 32768,
            api_key: None,
        }
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("context_window_size", &self.context_window_size)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Sampling settings for one model role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    500
}

impl ModelSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Request settings for this model.
    pub fn completion_config(&self, timeout: Duration) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout,
            response_format: None,
        }
    }
}

/// Optional global token budget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Stop calling models once this many tokens were used
    pub max_total_tokens: Option<u64>,
}

/// Validation cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    pub max_entries: u64,

    #[serde(with = "humantime_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Everything a challenge run needs to know.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    pub endpoint: EndpointConfig,

    /// The model under test
    pub quiz_model: ModelSettings,

    /// Judge model, also used for validation and extraction
    pub evaluator_model: ModelSettings,

    /// Reply format requested from validator and evaluator
    pub response_mode: ResponseMode,

    /// Issue kinds the validator may report
    pub issue_taxonomy: IssueTaxonomy,

    /// Selected course module (required by the module taxonomy)
    pub module: Option<String>,

    /// Treat a validator reply without a verdict as a rejection
    pub fail_closed: bool,

    /// How much of the context the validator sees
    pub context_excerpt_chars: usize,

    pub retry: RetryConfig,

    pub budget: BudgetConfig,

    pub cache: CacheConfig,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            quiz_model: ModelSettings::new("gpt-4o-mini"),
            evaluator_model: ModelSettings::new("gpt-4o").with_max_tokens(400),
            response_mode: ResponseMode::default(),
            issue_taxonomy: IssueTaxonomy::default(),
            module: None,
            fail_closed: true,
            context_excerpt_chars: 1000,
            retry: RetryConfig::default(),
            budget: BudgetConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ChallengeConfig {
    /// Parse from a YAML string and validate.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: ChallengeConfig = if yaml.trim().is_empty() {
            ChallengeConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file and validate.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = &self.endpoint.base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "endpoint.base_url must start with http:// or https://, got '{}'",
                url
            )));
        }

        if self.endpoint.timeout.is_zero() {
            return Err(ConfigError::Invalid("endpoint.timeout must be positive".to_string()));
        }

        for (role, settings) in [("quiz_model", &self.quiz_model), ("evaluator_model", &self.evaluator_model)] {
            if settings.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{}.model must not be empty", role)));
            }
            if !(0.0..=2.0).contains(&settings.temperature) {
                return Err(ConfigError::Invalid(format!(
                    "{}.temperature must be between 0 and 2",
                    role
                )));
            }
            if settings.max_tokens == 0 {
                return Err(ConfigError::Invalid(format!("{}.max_tokens must be positive", role)));
            }
        }

        if self.issue_taxonomy == IssueTaxonomy::Module && self.module_label().is_none() {
            return Err(ConfigError::Invalid(
                "issue_taxonomy 'module' requires a module label".to_string(),
            ));
        }

        if self.context_excerpt_chars == 0 {
            return Err(ConfigError::Invalid(
                "context_excerpt_chars must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// The module label, if set and non-blank.
    pub fn module_label(&self) -> Option<&str> {
        self.module.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }

    /// Request settings for the model under test.
    pub fn quiz_completion(&self) -> CompletionConfig {
        self.quiz_model.completion_config(self.endpoint.timeout)
    }

    /// Request settings for the judge.
    pub fn evaluator_completion(&self) -> CompletionConfig {
        self.evaluator_model.completion_config(self.endpoint.timeout)
    }
}
