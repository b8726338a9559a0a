//! The model-backed pipeline components.
//!
//! Each agent makes exactly one model call per operation and turns every
//! transport or parse failure into a typed result. Nothing here returns a
//! provider error to the caller, except the extractor, which runs before a
//! challenge starts.

mod answerer;
mod evaluator;
mod extractor;
mod validator;

pub use answerer::Answerer;
pub use evaluator::Evaluator;
pub use extractor::Extractor;
pub use validator::Validator;

use std::time::Instant;
use tracing::debug;

use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};

/// One system + user exchange, returning the reply text.
async fn ask(
    provider: &dyn LlmProvider,
    system: String,
    user: String,
    config: &CompletionConfig,
) -> Result<String, ProviderError> {
    let started = Instant::now();
    let response = provider
        .complete(vec![ChatMessage::system(system), ChatMessage::user(user)], config)
        .await?;

    debug!(
        model = %response.model,
        elapsed = ?started.elapsed(),
        chars = response.content.len(),
        "Model replied"
    );
    Ok(response.content)
}

/// First `max_chars` characters of `text`, for log previews.
fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
