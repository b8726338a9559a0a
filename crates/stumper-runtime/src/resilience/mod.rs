//! Resilience for model calls.
//!
//! - Token usage tracking with an optional global budget
//! - Retry with backoff lives with the providers ([`crate::providers::RetryProvider`])

mod budget;

pub use budget::{LlmUsage, MeteredProvider, ModelRole, TokenBudget, UsageTracker};
