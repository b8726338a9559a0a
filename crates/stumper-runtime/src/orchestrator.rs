//! Challenge orchestration.
//!
//! Questions are processed one at a time, in quiz order:
//!
//! ```text
//! Pending -> Validating -> Invalid
//!                       -> Answering -> SystemError
//!                                    -> Evaluating -> Evaluated
//! ```
//!
//! A blank question is invalid without any model call. A question without a
//! reference answer first goes to the [`MissingAnswerSource`]; if that
//! yields nothing the question is invalid.
//! No call is retried at this level (transport retries happen inside the
//! provider stack) and one question's failure never stops the run. A shared
//! stop flag is checked between questions.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use stumper_core::{
    ChallengeResults, ChallengeTally, Question, QuestionResult, Quiz, QuizError, ValidationResult,
    ValidationSummary,
};

use crate::agents::{Answerer, Evaluator, Extractor, Validator};
use crate::config::{ChallengeConfig, ConfigError};
use crate::context::CourseContext;
use crate::providers::{
    LlmProvider, ProviderError, ProviderRegistry, RetryProvider, DEFAULT_PROVIDER_TYPE,
};
use crate::resilience::{LlmUsage, MeteredProvider, ModelRole, UsageTracker};

/// Errors from building an orchestrator.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Supplies a reference answer the quiz left out.
#[async_trait]
pub trait MissingAnswerSource: Send + Sync {
    /// `None` (or a blank answer) leaves the question invalid.
    async fn request_answer(&self, question: &Question) -> Option<String>;
}

/// Never supplies answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMissingAnswers;

#[async_trait]
impl MissingAnswerSource for NoMissingAnswers {
    async fn request_answer(&self, _question: &Question) -> Option<String> {
        None
    }
}

/// Per-question validation outcomes plus their summary.
#[derive(Debug, Clone)]
pub struct ValidationRun {
    pub results: Vec<(Question, ValidationResult)>,
    pub summary: ValidationSummary,
}

/// Build the chat provider described by the endpoint configuration.
pub fn provider_from_config(config: &ChallengeConfig) -> Result<Arc<dyn LlmProvider>, RuntimeError> {
    let registry = ProviderRegistry::with_defaults();
    if !registry.has_provider(DEFAULT_PROVIDER_TYPE) {
        return Err(RuntimeError::ProviderNotConfigured(format!(
            "this build has no '{}' transport (enable the 'openai' feature)",
            DEFAULT_PROVIDER_TYPE
        )));
    }

    let mut endpoint = serde_json::json!({
        "base_url": config.endpoint.base_url,
        "context_window_size": config.endpoint.context_window_size,
    });
    if let Some(key) = &config.endpoint.api_key {
        endpoint["api_key"] = serde_json::Value::String(key.clone());
    }

    registry.validate(DEFAULT_PROVIDER_TYPE, &endpoint)?;
    Ok(registry.create(DEFAULT_PROVIDER_TYPE, &endpoint)?)
}

/// Runs quizzes through validate, answer and evaluate.
pub struct ChallengeOrchestrator {
    config: Arc<ChallengeConfig>,
    validator: Validator,
    answerer: Answerer,
    evaluator: Evaluator,
    extractor: Extractor,
    usage: Arc<UsageTracker>,
    missing_answers: Arc<dyn MissingAnswerSource>,
    context: Option<CourseContext>,
    stop: Arc<AtomicBool>,
}

impl ChallengeOrchestrator {
    pub fn builder(config: ChallengeConfig) -> ChallengeOrchestratorBuilder {
        ChallengeOrchestratorBuilder::new(config)
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    pub fn context(&self) -> Option<&CourseContext> {
        self.context.as_ref()
    }

    /// Token usage so far.
    pub fn usage(&self) -> LlmUsage {
        self.usage.usage()
    }

    /// Flag that stops the run before the next question when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Run the full challenge.
    pub async fn run(&self, quiz: &Quiz) -> ChallengeResults {
        let started = Instant::now();
        let mut tally = ChallengeTally::new(
            quiz.title.clone(),
            &self.config.quiz_model.model,
            &self.config.evaluator_model.model,
            quiz.len(),
        );

        info!(
            questions = quiz.len(),
            quiz_model = %self.config.quiz_model.model,
            evaluator_model = %self.config.evaluator_model.model,
            context = self.context.is_some(),
            "Starting challenge"
        );

        let mut interrupted = false;
        for question in &quiz.questions {
            if self.stop_requested() {
                warn!(processed = tally.processed(), total = quiz.len(), "Challenge interrupted");
                interrupted = true;
                break;
            }

            let result = self.process_question(question).await;
            info!(
                question = question.number,
                winner = result.winner.as_str(),
                "Question finished"
            );
            tally.record(result);
        }

        let mut results = if interrupted {
            tally.finish_interrupted()
        } else {
            tally.finish()
        };
        results.metadata_mut().extend(self.metadata());

        info!(
            valid = results.valid_questions(),
            student_wins = results.student_wins(),
            llm_wins = results.llm_wins(),
            system_errors = results.system_errors(),
            passes = results.passes(),
            elapsed = ?started.elapsed(),
            "Challenge finished"
        );
        results
    }

    /// Drive one question to a terminal state.
    pub async fn process_question(&self, question: &Question) -> QuestionResult {
        let question = match self.prepare(question).await {
            Ok(question) => question,
            Err(rejection) => return QuestionResult::invalid(question.clone(), rejection),
        };

        let context = self.context.as_ref();

        let validation = self.validator.validate(&question, context).await;
        if !validation.valid {
            return QuestionResult::invalid(question, validation);
        }

        let candidate = self.answerer.answer(&question.text, context).await;
        if !candidate.success {
            let error = candidate
                .error
                .unwrap_or_else(|| "Quiz model failed to answer".to_string());
            return QuestionResult::system_error(question, validation, error);
        }

        let evaluation = self.evaluator.evaluate(&question, &candidate.answer).await;
        QuestionResult::evaluated(question, validation, candidate.answer, evaluation)
    }

    /// Checks that need no model call: question text, then reference answer.
    async fn prepare(&self, question: &Question) -> Result<Question, ValidationResult> {
        if !question.has_text() {
            warn!(question = question.number, "Blank question; question is invalid");
            return Err(ValidationResult::blank_question());
        }
        match self.ensure_reference_answer(question).await {
            Some(question) => Ok(question),
            None => {
                warn!(question = question.number, "No reference answer; question is invalid");
                Err(ValidationResult::missing_answer())
            }
        }
    }

    async fn ensure_reference_answer(&self, question: &Question) -> Option<Question> {
        if question.has_reference_answer() {
            return Some(question.clone());
        }

        self.missing_answers
            .request_answer(question)
            .await
            .map(|answer| answer.trim().to_string())
            .filter(|answer| !answer.is_empty())
            .map(|answer| question.with_reference_answer(answer))
    }

    /// Validate one question without answering it.
    pub async fn validate_question(&self, question: &Question) -> ValidationResult {
        self.validator.validate(question, self.context.as_ref()).await
    }

    /// Validate every question of a quiz.
    ///
    /// Missing reference answers go to the [`MissingAnswerSource`] first, as
    /// in a full run.
    pub async fn validate_quiz(&self, quiz: &Quiz) -> ValidationRun {
        let mut results = Vec::with_capacity(quiz.len());
        for question in &quiz.questions {
            if self.stop_requested() {
                warn!(validated = results.len(), "Validation interrupted");
                break;
            }
            let entry = match self.prepare(question).await {
                Ok(question) => {
                    let validation = self.validate_question(&question).await;
                    (question, validation)
                }
                Err(rejection) => (question.clone(), rejection),
            };
            results.push(entry);
        }

        let summary = ValidationSummary::from_results(results.iter().map(|(_, v)| v));
        ValidationRun { results, summary }
    }

    /// Turn a raw submission into a quiz.
    pub async fn extract(&self, raw_input: &str) -> Result<Quiz, QuizError> {
        self.extractor.extract(raw_input).await
    }

    fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = self.usage.to_metadata();
        metadata.insert("response_mode".to_string(), self.config.response_mode.to_string());
        metadata.insert(
            "issue_taxonomy".to_string(),
            format!("{:?}", self.config.issue_taxonomy).to_lowercase(),
        );
        if let Some(module) = self.config.module_label() {
            metadata.insert("module".to_string(), module.to_string());
        }
        if let Some(context) = &self.context {
            metadata.insert("context_documents".to_string(), context.document_count().to_string());
            metadata.insert("context_chars".to_string(), context.char_count().to_string());
        }
        metadata
    }
}

/// Builder for [`ChallengeOrchestrator`].
pub struct ChallengeOrchestratorBuilder {
    config: ChallengeConfig,
    provider: Option<Arc<dyn LlmProvider>>,
    missing_answers: Arc<dyn MissingAnswerSource>,
    context: Option<CourseContext>,
    stop: Option<Arc<AtomicBool>>,
}

impl ChallengeOrchestratorBuilder {
    pub fn new(config: ChallengeConfig) -> Self {
        Self {
            config,
            provider: None,
            missing_answers: Arc::new(NoMissingAnswers),
            context: None,
            stop: None,
        }
    }

    /// The transport every model call goes through.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn missing_answers(mut self, source: Arc<dyn MissingAnswerSource>) -> Self {
        self.missing_answers = source;
        self
    }

    pub fn context(mut self, context: Option<CourseContext>) -> Self {
        self.context = context;
        self
    }

    /// Share an existing stop flag (e.g. one set by a signal handler).
    pub fn stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn build(self) -> Result<ChallengeOrchestrator, RuntimeError> {
        self.config.validate()?;
        let provider = self
            .provider
            .ok_or_else(|| RuntimeError::ProviderNotConfigured("No provider set".to_string()))?;

        let config = Arc::new(self.config);
        let usage = Arc::new(UsageTracker::new(config.budget.max_total_tokens));
        let retrying: Arc<dyn LlmProvider> =
            Arc::new(RetryProvider::with_config(provider, config.retry.clone()));
        let metered = |role: ModelRole| -> Arc<dyn LlmProvider> {
            Arc::new(MeteredProvider::new(
                Arc::clone(&retrying),
                Arc::clone(&usage),
                role,
            ))
        };

        Ok(ChallengeOrchestrator {
            validator: Validator::new(metered(ModelRole::Validation), Arc::clone(&config)),
            answerer: Answerer::new(metered(ModelRole::Answering), Arc::clone(&config)),
            evaluator: Evaluator::new(metered(ModelRole::Evaluation), Arc::clone(&config)),
            extractor: Extractor::new(metered(ModelRole::Extraction), Arc::clone(&config)),
            config,
            usage,
            missing_answers: self.missing_answers,
            context: self.context,
            stop: self.stop.unwrap_or_default(),
        })
    }
}
