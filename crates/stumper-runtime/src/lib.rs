//! # stumper-runtime
//!
//! The model-facing half of Stumper: every chat call a challenge makes.
//!
//! `stumper-core` owns the result types, reply parsing and the pass/fail
//! policy and never touches the network. This crate supplies the rest:
//!
//! - [`providers`]: the [`LlmProvider`] seam, the OpenAI-compatible transport
//!   (feature `openai`), credentials and retry
//! - [`agents`]: Validator, Answerer, Evaluator and question Extractor
//! - [`ChallengeOrchestrator`]: the per-question state machine
//! - [`config`], [`context`], [`cache`], [`resilience`] and [`prompts`]
//!
//! ## Failure Handling
//!
//! A failed model call never escapes an agent as an error. The validator
//! turns it into an invalid question, the answerer into a system error and
//! the evaluator into a low-confidence INCORRECT.
//!
//! ## Example
//!
//! ```rust,ignore
//! use stumper_runtime::{provider_from_config, ChallengeConfig, ChallengeOrchestrator};
//! use stumper_core::Quiz;
//!
//! let config = ChallengeConfig::from_yaml_file("stumper.yaml")?;
//! let provider = provider_from_config(&config)?;
//! let orchestrator = ChallengeOrchestrator::builder(config).provider(provider).build()?;
//!
//! let results = orchestrator.run(&Quiz::from_file("quiz.toml")?).await;
//! println!("{}", results.marker());
//! ```

pub mod agents;
pub mod cache;
pub mod config;
pub mod context;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;

pub use agents::{Answerer, Evaluator, Extractor, Validator};
pub use cache::{ValidationCache, ValidationKey};
pub use config::{BudgetConfig, CacheConfig, ChallengeConfig, ConfigError, EndpointConfig, ModelSettings};
pub use context::{ContextError, ContextLoader, CourseContext};
pub use orchestrator::{
    provider_from_config, ChallengeOrchestrator, ChallengeOrchestratorBuilder, MissingAnswerSource,
    NoMissingAnswers, RuntimeError, ValidationRun,
};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderRegistry, RetryConfig, RetryProvider, TokenUsage,
};
pub use resilience::{LlmUsage, ModelRole, UsageTracker};
