//! Token usage tracking and the optional global budget.
//!
//! Every model call goes through a [`MeteredProvider`], which refuses the
//! call once the budget is spent and records usage per [`ModelRole`].

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};

/// What a model call was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Validation,
    Answering,
    Evaluation,
    Extraction,
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelRole::Validation => "validation",
            ModelRole::Answering => "answering",
            ModelRole::Evaluation => "evaluation",
            ModelRole::Extraction => "extraction",
        };
        f.write_str(name)
    }
}

/// Token budget for a run.
pub struct TokenBudget {
    /// Maximum tokens allowed
    pub max_tokens: u64,

    used: AtomicU64,
}

impl TokenBudget {
    pub fn new(max_tokens: u64) -> Self {
        Self {
            max_tokens,
            used: AtomicU64::new(0),
        }
    }

    /// Check if we can afford to use tokens.
    pub fn can_afford(&self, tokens: u64) -> bool {
        self.remaining() >= tokens
    }

    pub fn record(&self, tokens: u64) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> u64 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }
}

/// Accumulated LLM usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,

    /// Prompt tokens served from the provider's cache
    pub cached_tokens: u64,

    /// Successful calls
    pub llm_calls: u32,

    /// Calls that returned an error
    pub failed_calls: u32,

    /// Rough cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total());
        self.cached_tokens += u64::from(usage.cached_tokens);
        self.llm_calls += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens (input, output)
        let (input_rate, output_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6),
            m if m.contains("gpt-4o") => (2.5, 10.0),
            m if m.contains("gpt-4.1-mini") => (0.4, 1.6),
            m if m.contains("gpt-4.1") => (2.0, 8.0),
            m if m.contains("claude") && m.contains("haiku") => (1.0, 5.0),
            m if m.contains("claude") => (3.0, 15.0),
            _ => (0.0, 0.0), // local or unknown models
        };

        let input = usage.prompt_tokens.saturating_sub(usage.cached_tokens);
        (input as f64 / 1_000_000.0) * input_rate
            + (usage.completion_tokens as f64 / 1_000_000.0) * output_rate
    }

    /// Flatten into string metadata for persisted results.
    pub fn to_metadata(&self, prefix: &str) -> BTreeMap<String, String> {
        let key = |name: &str| format!("{}{}", prefix, name);
        BTreeMap::from([
            (key("llm_calls"), self.llm_calls.to_string()),
            (key("failed_calls"), self.failed_calls.to_string()),
            (key("prompt_tokens"), self.prompt_tokens.to_string()),
            (key("completion_tokens"), self.completion_tokens.to_string()),
            (key("total_tokens"), self.total_tokens.to_string()),
            (key("estimated_cost_usd"), format!("{:.6}", self.estimated_cost)),
        ])
    }
}

/// Usage tracker shared by every metered provider in a run.
pub struct UsageTracker {
    budget: Option<TokenBudget>,
    total: RwLock<LlmUsage>,
    by_role: RwLock<BTreeMap<ModelRole, LlmUsage>>,
}

impl UsageTracker {
    /// Track usage without a limit.
    pub fn unlimited() -> Self {
        Self {
            budget: None,
            total: RwLock::new(LlmUsage::default()),
            by_role: RwLock::new(BTreeMap::new()),
        }
    }

    /// Track usage with an optional global token limit.
    pub fn new(max_total_tokens: Option<u64>) -> Self {
        Self {
            budget: max_total_tokens.map(TokenBudget::new),
            ..Self::unlimited()
        }
    }

    /// Fail if `estimated_tokens` would exceed the budget.
    pub fn check(&self, estimated_tokens: u64) -> Result<(), ProviderError> {
        match &self.budget {
            Some(budget) if !budget.can_afford(estimated_tokens) || budget.remaining() == 0 => {
                Err(ProviderError::BudgetExceeded {
                    used: budget.used(),
                    limit: budget.max_tokens,
                })
            }
            _ => Ok(()),
        }
    }

    /// Record a successful call.
    pub fn record(&self, role: ModelRole, usage: &TokenUsage, model: &str) {
        if let Some(budget) = &self.budget {
            budget.record(u64::from(usage.total()));
        }
        self.total.write().add(usage, model);
        self.by_role.write().entry(role).or_default().add(usage, model);
    }

    /// Record a failed call.
    pub fn record_failure(&self, role: ModelRole) {
        self.total.write().failed_calls += 1;
        self.by_role.write().entry(role).or_default().failed_calls += 1;
    }

    pub fn usage(&self) -> LlmUsage {
        self.total.read().clone()
    }

    pub fn usage_for(&self, role: ModelRole) -> LlmUsage {
        self.by_role.read().get(&role).cloned().unwrap_or_default()
    }

    /// Remaining budget, if one is set.
    pub fn remaining(&self) -> Option<u64> {
        self.budget.as_ref().map(TokenBudget::remaining)
    }

    /// All usage as flat metadata.
    pub fn to_metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = self.usage().to_metadata("");
        for (role, usage) in self.by_role.read().iter() {
            metadata.insert(format!("{}_tokens", role), usage.total_tokens.to_string());
        }
        if let Some(budget) = &self.budget {
            metadata.insert("token_budget".to_string(), budget.max_tokens.to_string());
        }
        metadata
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Provider wrapper that enforces the budget and records usage.
pub struct MeteredProvider {
    inner: Arc<dyn LlmProvider>,
    tracker: Arc<UsageTracker>,
    role: ModelRole,
}

impl MeteredProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, tracker: Arc<UsageTracker>, role: ModelRole) -> Self {
        Self {
            inner,
            tracker,
            role,
        }
    }
}

#[async_trait]
impl LlmProvider for MeteredProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let estimated: u64 = messages
            .iter()
            .map(|m| u64::from(self.inner.estimate_tokens(&m.content)))
            .sum();

        if let Err(e) = self.tracker.check(estimated) {
            warn!(role = %self.role, error = %e, "Skipping model call");
            self.tracker.record_failure(self.role);
            return Err(e);
        }

        match self.inner.complete(messages, config).await {
            Ok(response) => {
                self.tracker.record(self.role, &response.usage, &response.model);
                Ok(response)
            }
            Err(e) => {
                self.tracker.record_failure(self.role);
                Err(e)
            }
        }
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
