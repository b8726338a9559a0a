//! The model under test.

use std::sync::Arc;
use tracing::{info, warn};

use stumper_core::CandidateAnswer;

use super::{ask, preview};
use crate::config::ChallengeConfig;
use crate::context::CourseContext;
use crate::prompts::{answer_prompt, answerer_system_prompt};
use crate::providers::LlmProvider;

/// Asks the quiz model a question.
///
/// Only the question text goes in; the reference answer never reaches this
/// type.
pub struct Answerer {
    provider: Arc<dyn LlmProvider>,
    config: Arc<ChallengeConfig>,
}

impl Answerer {
    pub fn new(provider: Arc<dyn LlmProvider>, config: Arc<ChallengeConfig>) -> Self {
        Self { provider, config }
    }

    pub async fn answer(&self, question_text: &str, context: Option<&CourseContext>) -> CandidateAnswer {
        let completion = self.config.quiz_completion();
        info!(
            model = %completion.model,
            question = preview(question_text, 100),
            "Sending question to quiz model"
        );

        let system = answerer_system_prompt(context.map(CourseContext::text));
        match ask(self.provider.as_ref(), system, answer_prompt(question_text), &completion).await {
            Ok(reply) if reply.trim().is_empty() => {
                warn!(model = %completion.model, "Quiz model returned an empty answer");
                CandidateAnswer::failed("Empty response from quiz model")
            }
            Ok(reply) => CandidateAnswer::answered(reply.trim()),
            Err(e) => {
                warn!(model = %completion.model, error = %e, "Quiz model unavailable");
                CandidateAnswer::failed(format!("Failed to get response from LLM: {}", e))
            }
        }
    }
}
