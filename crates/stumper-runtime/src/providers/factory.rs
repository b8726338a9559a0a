//! Chat providers created by type name.
//!
//! The CLI and the orchestrator builder never name a concrete transport. They
//! ask a [`ProviderRegistry`] for a provider type ("openai-compatible") and
//! hand it a JSON object describing the endpoint.
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let provider = registry.create(
//!     "openai-compatible",
//!     &json!({"base_url": "http://localhost:11434/v1"}),
//! )?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};

/// Provider type used when the configuration does not name one.
pub const DEFAULT_PROVIDER_TYPE: &str = "openai-compatible";

/// Builds chat providers of one type from JSON configuration.
pub trait ProviderFactory: Send + Sync {
    /// Type name the factory is registered under.
    fn provider_type(&self) -> &'static str;

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Check configuration without building a client.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    fn default_config(&self) -> JsonValue {
        serde_json::json!({})
    }

    fn description(&self) -> &'static str {
        "Chat completion provider"
    }
}

/// Factories keyed by provider type.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any factory of the same type.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    /// Build a provider of `provider_type`.
    pub fn create(
        &self,
        provider_type: &str,
        config: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.factory(provider_type)?.create(config)
    }

    /// Validate configuration for `provider_type`.
    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.factory(provider_type)?.validate_config(config)
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    pub fn default_config(&self, provider_type: &str) -> Option<JsonValue> {
        self.factories.get(provider_type).map(|f| f.default_config())
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ProviderError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    /// Registry with the transports compiled into this build.
    #[cfg(feature = "openai")]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::OpenAiCompatProviderFactory));
        registry
    }

    /// Registry with the transports compiled into this build (none).
    #[cfg(not(feature = "openai"))]
    pub fn with_defaults() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::ScriptedProvider;

    struct ScriptedFactory;

    impl ProviderFactory for ScriptedFactory {
        fn provider_type(&self) -> &'static str {
            "scripted"
        }

        fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
            self.validate_config(config)?;
            let reply = config["reply"].as_str().unwrap_or("VERDICT: CORRECT");
            Ok(ScriptedProvider::new().reply(reply).shared())
        }

        fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
            match config.get("reply") {
                Some(value) if !value.is_string() => Err(ProviderError::NotConfigured(
                    "reply must be a string".to_string(),
                )),
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(ScriptedFactory));

        assert!(registry.has_provider("scripted"));
        assert!(!registry.has_provider(DEFAULT_PROVIDER_TYPE));
        assert_eq!(registry.available_types(), vec!["scripted"]);

        let provider = registry
            .create("scripted", &serde_json::json!({"reply": "VALIDATION: PASS"}))
            .unwrap();
        assert_eq!(provider.name(), "scripted");
    }

    #[test]
    fn test_unknown_type_is_not_configured() {
        let registry = ProviderRegistry::new();
        match registry.create("carrier-pigeon", &serde_json::json!({})) {
            Err(ProviderError::NotConfigured(msg)) => {
                assert!(msg.contains("Unknown provider type: 'carrier-pigeon'"))
            }
            _ => panic!("expected NotConfigured"),
        }
    }

    #[test]
    fn test_validate_delegates_to_factory() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(ScriptedFactory));

        assert!(registry.validate("scripted", &serde_json::json!({})).is_ok());
        assert!(registry.validate("scripted", &serde_json::json!({"reply": 3})).is_err());
        assert!(registry.validate("unknown", &serde_json::json!({})).is_err());
        assert_eq!(registry.default_config("scripted"), Some(serde_json::json!({})));
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_defaults_include_openai_compatible() {
        let registry = ProviderRegistry::with_defaults();
        assert!(registry.has_provider(DEFAULT_PROVIDER_TYPE));
    }
}
