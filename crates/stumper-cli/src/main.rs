//! Stumper command-line interface.
//!
//! ```bash
//! stumper run quiz.toml --context-urls urls.txt --output results.json
//! stumper validate quiz.toml --module "Module 3: Graph algorithms"
//! stumper extract submission.txt --output quiz.json
//! ```

mod args;
mod interactive;
mod logging;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use stumper_core::{IssueTaxonomy, Quiz, QuizEntry};
use stumper_runtime::{
    provider_from_config, ChallengeConfig, ChallengeOrchestrator, ContextLoader, CourseContext,
};

use args::{Cli, Command, EndpointArgs, ExtractArgs, RunArgs};
use interactive::TerminalAnswers;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.log_format);

    let outcome = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Validate(args) => validate(args).await,
        Command::Extract(args) => extract(args).await,
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// File configuration with command-line overrides applied.
fn load_config(endpoint: &EndpointArgs, module: Option<&str>) -> Result<ChallengeConfig> {
    let mut config = match &endpoint.config {
        Some(path) => ChallengeConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ChallengeConfig::default(),
    };

    if let Some(base_url) = &endpoint.base_url {
        config.endpoint.base_url = base_url.clone();
    }
    if let Some(api_key) = &endpoint.api_key {
        config.endpoint.api_key = Some(api_key.clone());
    }
    if let Some(timeout) = endpoint.timeout {
        config.endpoint.timeout = timeout;
    }
    if let Some(window) = endpoint.context_window_size {
        config.endpoint.context_window_size = window;
    }
    if let Some(model) = &endpoint.quiz_model {
        config.quiz_model.model = model.clone();
    }
    if let Some(model) = &endpoint.evaluator_model {
        config.evaluator_model.model = model.clone();
    }
    if let Some(mode) = endpoint.response_mode {
        config.response_mode = mode;
    }
    if let Some(module) = module {
        config.module = Some(module.to_string());
        config.issue_taxonomy = IssueTaxonomy::Module;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_quiz(path: &Path) -> Result<Quiz> {
    let quiz = Quiz::from_file(path)
        .with_context(|| format!("Failed to load quiz from {}", path.display()))?;

    let blank = quiz.blank_questions().count();
    if blank > 0 {
        warn!(blank, "Some questions are blank and will be marked invalid");
    }
    let missing = quiz.missing_answers().count();
    if missing > 0 {
        warn!(missing, "Some questions have no reference answer");
    }
    info!(questions = quiz.len(), path = %path.display(), "Quiz loaded");
    Ok(quiz)
}

async fn load_context(config: &ChallengeConfig, args: &RunArgs) -> Result<Option<CourseContext>> {
    if args.context_files.is_empty() && args.context_urls.is_none() {
        return Ok(None);
    }

    let loader = ContextLoader::new(config.endpoint.timeout)
        .context("Failed to initialize context loader")?;
    Ok(loader
        .load(&args.context_files, args.context_urls.as_deref())
        .await)
}

async fn build_orchestrator(config: ChallengeConfig, args: &RunArgs) -> Result<ChallengeOrchestrator> {
    let context = load_context(&config, args).await?;
    let provider = provider_from_config(&config).context("Failed to create chat provider")?;

    let mut builder = ChallengeOrchestrator::builder(config)
        .provider(provider)
        .context(context);
    if args.interactive {
        builder = builder.missing_answers(Arc::new(TerminalAnswers));
    }

    let orchestrator = builder.build().context("Failed to set up the challenge")?;
    watch_ctrl_c(orchestrator.stop_handle());
    Ok(orchestrator)
}

/// First Ctrl-C stops after the current question.
fn watch_ctrl_c(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted; finishing the current question...");
            stop.store(true, Ordering::SeqCst);
        }
    });
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let config = load_config(&args.endpoint, args.module.as_deref())?;
    let quiz = load_quiz(&args.quiz_file)?;
    let orchestrator = build_orchestrator(config, &args).await?;

    let results = orchestrator.run(&quiz).await;
    print!("{}", report::challenge_report(&results));

    if let Some(path) = &args.output {
        results
            .save(path)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        info!(path = %path.display(), "Detailed results saved");
    }

    Ok(exit_code(results.passes(), args.no_exit_on_fail))
}

async fn validate(args: RunArgs) -> Result<ExitCode> {
    let config = load_config(&args.endpoint, args.module.as_deref())?;
    let quiz = load_quiz(&args.quiz_file)?;
    let orchestrator = build_orchestrator(config, &args).await?;

    let run = orchestrator.validate_quiz(&quiz).await;
    print!("{}", report::validation_report(&run));

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&run.summary)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    }

    Ok(exit_code(run.summary.all_valid(), args.no_exit_on_fail))
}

async fn extract(args: ExtractArgs) -> Result<ExitCode> {
    let config = load_config(&args.endpoint, None)?;
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let provider = provider_from_config(&config).context("Failed to create chat provider")?;
    let orchestrator = ChallengeOrchestrator::builder(config)
        .provider(provider)
        .build()
        .context("Failed to set up extraction")?;

    let quiz = orchestrator.extract(&raw).await?;
    let json = quiz_json(&quiz)?;
    match &args.output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Failed to write quiz to {}", path.display()))?;
            info!(questions = quiz.len(), path = %path.display(), "Quiz written");
        }
        None => println!("{}", json),
    }
    Ok(ExitCode::SUCCESS)
}

/// Quiz in the file layout `Quiz::from_file` reads back.
fn quiz_json(quiz: &Quiz) -> Result<String> {
    let entries: Vec<QuizEntry> = quiz
        .questions
        .iter()
        .map(|q| QuizEntry {
            question: q.text.clone(),
            answer: q.reference_answer.clone(),
        })
        .collect();

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "title": quiz.title,
        "questions": entries,
    }))?)
}

fn exit_code(passed: bool, no_exit_on_fail: bool) -> ExitCode {
    if passed || no_exit_on_fail {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use stumper_core::ResponseMode;
    use tempfile::NamedTempFile;

    #[test]
    fn test_flags_override_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "endpoint:\n  base_url: http://localhost:11434/v1\nquiz_model:\n  model: llama3.1\nresponse_mode: text"
        )
        .unwrap();

        let endpoint = EndpointArgs {
            config: Some(file.path().to_path_buf()),
            evaluator_model: Some("qwen2.5".to_string()),
            timeout: Some(Duration::from_secs(90)),
            ..EndpointArgs::default()
        };
        let config = load_config(&endpoint, Some("Module 5: Communities")).unwrap();

        assert_eq!(config.endpoint.base_url, "http://localhost:11434/v1");
        assert_eq!(config.quiz_model.model, "llama3.1");
        assert_eq!(config.evaluator_model.model, "qwen2.5");
        assert_eq!(config.endpoint.timeout, Duration::from_secs(90));
        assert_eq!(config.response_mode, ResponseMode::Text);
        assert_eq!(config.issue_taxonomy, IssueTaxonomy::Module);
        assert_eq!(config.module_label(), Some("Module 5: Communities"));
    }

    #[test]
    fn test_bad_override_rejected() {
        let endpoint = EndpointArgs {
            base_url: Some("localhost:8080".to_string()),
            ..EndpointArgs::default()
        };
        assert!(load_config(&endpoint, None).is_err());
    }

    #[test]
    fn test_extracted_quiz_reloads() {
        let quiz = Quiz {
            title: Some("Trees".to_string()),
            questions: vec![
                stumper_core::Question::new(1, "What is a tree?", "A connected acyclic graph"),
                stumper_core::Question::new(2, "What is a forest?", ""),
            ],
        };

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{}", quiz_json(&quiz).unwrap()).unwrap();

        let reloaded = Quiz::from_file(file.path()).unwrap();
        assert_eq!(reloaded, quiz);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(true, false), ExitCode::SUCCESS);
        assert_eq!(exit_code(false, false), ExitCode::FAILURE);
        assert_eq!(exit_code(false, true), ExitCode::SUCCESS);
    }
}
