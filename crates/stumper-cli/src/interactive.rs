//! Terminal prompt for missing reference answers.

use async_trait::async_trait;
use std::io::{BufRead, Write};
use tracing::warn;

use stumper_core::Question;
use stumper_runtime::MissingAnswerSource;

/// Asks on stderr and reads one line from stdin.
pub struct TerminalAnswers;

#[async_trait]
impl MissingAnswerSource for TerminalAnswers {
    async fn request_answer(&self, question: &Question) -> Option<String> {
        let prompt = format!(
            "\nMissing answer for question {}:\n{}\nYour answer: ",
            question.number, question.text
        );

        let line = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut stderr = std::io::stderr().lock();
            stderr.write_all(prompt.as_bytes())?;
            stderr.flush()?;

            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await;

        match line {
            Ok(Ok(line)) => {
                let answer = line.trim().to_string();
                if answer.is_empty() {
                    eprintln!("No answer provided. This question will be skipped.");
                    None
                } else {
                    Some(answer)
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Could not read answer from terminal");
                None
            }
            Err(e) => {
                warn!(error = %e, "Answer prompt task failed");
                None
            }
        }
    }
}
