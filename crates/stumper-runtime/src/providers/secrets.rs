//! Credential handling for chat-completion endpoints.
//!
//! API keys are wrapped in [`secrecy::SecretString`] as soon as they are
//! read, so they never show up in `Debug`/`Display` output or logs.
//!
//! ## Resolution order
//!
//! 1. An explicit key (config file or CLI flag)
//! 2. `STUMPER_API_KEY`
//! 3. `CHAT_API` (legacy name)
//!
//! Local endpoints such as Ollama accept requests without a key, so a
//! missing credential is only an error where a caller requires one.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Environment variables checked for an API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["STUMPER_API_KEY", "CHAT_API"];

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from configuration file/JSON
    Config,
    /// Loaded from environment variable
    Environment,
    /// Provided programmatically (CLI flag, tests)
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API key.
///
/// `Debug` and `Display` show `[REDACTED]`; the value is only reachable
/// through [`expose`](ApiCredential::expose).
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
}

impl ApiCredential {
    /// Wrap a key.
    pub fn new(value: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
        }
    }

    /// First non-empty value among `env_vars`.
    pub fn from_env_chain(env_vars: &[&str]) -> Option<Self> {
        env_vars.iter().find_map(|var| {
            std::env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| Self::new(v.trim(), CredentialSource::Environment))
        })
    }

    /// Resolve a key: explicit value first, then the standard env vars.
    pub fn resolve(explicit: Option<&str>) -> Option<Self> {
        match explicit.map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => Some(Self::new(value, CredentialSource::Config)),
            None => Self::from_env_chain(&API_KEY_ENV_VARS),
        }
    }

    /// Load from a JSON provider config (`api_key`), falling back to env.
    pub fn from_config(config: &JsonValue) -> Option<Self> {
        Self::resolve(config["api_key"].as_str())
    }

    /// Like [`from_config`](Self::from_config), but a missing key is an error.
    pub fn require_from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        Self::from_config(config).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "API key required: set 'api_key' in config or one of {} environment variables",
                API_KEY_ENV_VARS.join(", ")
            ))
        })
    }

    /// Check if a credential is available without loading it.
    pub fn is_available(config: &JsonValue) -> bool {
        config["api_key"].as_str().is_some_and(|v| !v.trim().is_empty())
            || API_KEY_ENV_VARS
                .iter()
                .any(|var| std::env::var(var).is_ok_and(|v| !v.trim().is_empty()))
    }

    /// Expose the key at the point of use (an HTTP header). Never store it.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API key from {} [REDACTED]", self.source)
    }
}
