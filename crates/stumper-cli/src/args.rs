//! Command-line arguments.
//!
//! - stumper run quiz.toml            # validate, answer, evaluate
//! - stumper validate quiz.toml       # validation pre-flight only
//! - stumper extract submission.txt   # turn free text into a quiz file

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use stumper_core::ResponseMode;

#[derive(Parser, Debug)]
#[command(name = "stumper")]
#[command(about = "Challenge an LLM with a student-written quiz")]
#[command(
    long_about = r#"Challenge an LLM with a student-written quiz.

Each question is validated, answered by the quiz model without seeing the
reference answer, and judged by the evaluator model. The student passes when
at least one question is valid and the model gets every evaluated question
wrong.

EXIT CODES:
  0  student passes (or --no-exit-on-fail)
  1  student fails, or a fatal error occurred"#
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full challenge
    Run(RunArgs),

    /// Validate questions without asking the quiz model
    Validate(RunArgs),

    /// Extract questions from a free-form submission
    Extract(ExtractArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Endpoint and model settings shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct EndpointArgs {
    /// YAML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key (defaults to STUMPER_API_KEY or CHAT_API)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Model under test
    #[arg(long)]
    pub quiz_model: Option<String>,

    /// Judge model, also used for validation and extraction
    #[arg(long)]
    pub evaluator_model: Option<String>,

    /// Reply format requested from the judge (structured or text)
    #[arg(long)]
    pub response_mode: Option<ResponseMode>,

    /// Per-request timeout, e.g. "30s" or "2m"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Context window sent to Ollama endpoints
    #[arg(long)]
    pub context_window_size: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Quiz file (.toml, .yaml, .yml or .json)
    pub quiz_file: PathBuf,

    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Course module the questions must belong to (enables module checks)
    #[arg(long)]
    pub module: Option<String>,

    /// Local file with course materials (repeatable)
    #[arg(long = "context-file")]
    pub context_files: Vec<PathBuf>,

    /// File listing URLs of course materials, one per line
    #[arg(long)]
    pub context_urls: Option<PathBuf>,

    /// Write detailed JSON results here
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Ask on the terminal for missing reference answers
    #[arg(long)]
    pub interactive: bool,

    /// Exit 0 even when the student does not pass
    #[arg(long)]
    pub no_exit_on_fail: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Free-form submission text
    pub input: PathBuf,

    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Write the extracted quiz (JSON) here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "stumper",
            "run",
            "quiz.toml",
            "--quiz-model",
            "llama3.1",
            "--response-mode",
            "text",
            "--timeout",
            "2m",
            "--context-file",
            "a.md",
            "--context-file",
            "b.md",
            "--no-exit-on-fail",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.quiz_file, PathBuf::from("quiz.toml"));
        assert_eq!(args.endpoint.quiz_model.as_deref(), Some("llama3.1"));
        assert_eq!(args.endpoint.response_mode, Some(ResponseMode::Text));
        assert_eq!(args.endpoint.timeout, Some(Duration::from_secs(120)));
        assert_eq!(args.context_files.len(), 2);
        assert!(args.no_exit_on_fail);
        assert!(!args.interactive);
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(Cli::try_parse_from(["stumper", "run", "q.toml", "--response-mode", "xml"]).is_err());
        assert!(Cli::try_parse_from(["stumper", "run", "q.toml", "--timeout", "soon"]).is_err());
        assert!(Cli::try_parse_from(["stumper", "run"]).is_err());
    }

    #[test]
    fn test_log_format_is_global() {
        let cli = Cli::try_parse_from(["stumper", "extract", "in.txt", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Command::Extract(_)));
    }
}
