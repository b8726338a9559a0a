//! Judging candidate answers.

use std::sync::Arc;
use tracing::{info, warn};

use stumper_core::response::parse_evaluation;
use stumper_core::{EvaluationResult, Question, ResponseMode, ResponseSchema};

use super::{ask, preview};
use crate::config::ChallengeConfig;
use crate::prompts::{evaluation_prompt, EVALUATOR_PROMPT};
use crate::providers::LlmProvider;

/// Compares the quiz model's answer with the student's reference answer.
///
/// Conceptual equivalence is correct; wording does not matter. A failed
/// judge call is a low-confidence INCORRECT with `success = false` and never
/// a student win.
pub struct Evaluator {
    provider: Arc<dyn LlmProvider>,
    config: Arc<ChallengeConfig>,
}

impl Evaluator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: Arc<ChallengeConfig>) -> Self {
        Self { provider, config }
    }

    pub async fn evaluate(&self, question: &Question, candidate: &str) -> EvaluationResult {
        let mode = self.config.response_mode;
        let mut completion = self.config.evaluator_completion();
        if mode == ResponseMode::Structured {
            match ResponseSchema::Evaluation.response_format() {
                Ok(format) => completion.response_format = Some(format),
                Err(e) => warn!(error = %e, "Evaluation schema unavailable, asking for plain JSON"),
            }
        }

        info!(question = question.number, model = %completion.model, "Evaluating answer");

        let prompt = evaluation_prompt(&question.text, &question.reference_answer, candidate, mode);
        let reply = match ask(self.provider.as_ref(), EVALUATOR_PROMPT.to_string(), prompt, &completion).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(question = question.number, error = %e, "Evaluator unavailable");
                return EvaluationResult::failed(format!("Evaluation system unavailable: {}", e));
            }
        };

        let result = parse_evaluation(mode, &reply);

        if !result.success {
            warn!(
                question = question.number,
                error = ?result.error,
                reply = preview(&reply, 200),
                "Evaluator reply unusable"
            );
        } else if result.verdict_conflict {
            warn!(
                question = question.number,
                verdict = %result.verdict,
                student_wins = result.student_wins,
                "Judge's student_wins disagrees with its verdict; using student_wins"
            );
        } else {
            info!(
                question = question.number,
                verdict = %result.verdict,
                confidence = result.confidence.as_str(),
                student_wins = result.student_wins,
                "Answer evaluated"
            );
        }

        result
    }
}
