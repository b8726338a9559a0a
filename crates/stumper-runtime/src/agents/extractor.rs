//! Turning a raw submission into a quiz.

use std::sync::Arc;
use tracing::{debug, info, warn};

use stumper_core::quiz::raw::{has_question_blocks, parse_extraction_reply, parse_question_blocks};
use stumper_core::{Quiz, QuizError};

use super::ask;
use crate::config::ChallengeConfig;
use crate::prompts::{extraction_prompt, EXTRACTOR_PROMPT};
use crate::providers::LlmProvider;

/// Extracts question/answer pairs from free-form text.
///
/// `[[questions]]` blocks are parsed locally; anything else goes to the
/// evaluator model.
pub struct Extractor {
    provider: Arc<dyn LlmProvider>,
    config: Arc<ChallengeConfig>,
}

impl Extractor {
    pub fn new(provider: Arc<dyn LlmProvider>, config: Arc<ChallengeConfig>) -> Self {
        Self { provider, config }
    }

    pub async fn extract(&self, raw_input: &str) -> Result<Quiz, QuizError> {
        if has_question_blocks(raw_input) {
            match parse_question_blocks(raw_input) {
                Ok(quiz) if !quiz.is_empty() => {
                    info!(questions = quiz.len(), "Parsed question blocks");
                    return Ok(quiz);
                }
                Ok(_) => debug!("Question blocks held no questions, asking the model"),
                Err(e) => debug!(error = %e, "Question blocks unreadable, asking the model"),
            }
        }

        let completion = self.config.evaluator_completion().with_max_tokens(400);
        let reply = ask(
            self.provider.as_ref(),
            EXTRACTOR_PROMPT.trim().to_string(),
            extraction_prompt(raw_input),
            &completion,
        )
        .await
        .map_err(|e| {
            warn!(error = %e, "Extraction call failed");
            QuizError::ExtractionFailed(format!("Unable to parse input due to API issues: {}", e))
        })?;

        let quiz = parse_extraction_reply(&reply)?;
        info!(questions = quiz.len(), "Extracted questions");
        Ok(quiz)
    }
}
