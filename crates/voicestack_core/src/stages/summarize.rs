//! Transcript summarization adapters.

use std::sync::Arc;

use serde::Serialize;

use crate::config::ToolCommand;
use crate::models::Transcript;
use crate::orchestrator::StageResult;
use crate::process::ToolRunner;

use super::types::SummaryOutput;

/// Produces title, summary and tags for a transcript.
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &str;

    fn summarize(&self, transcript: &Transcript) -> StageResult<SummaryOutput>;
}

impl<T: Summarizer> Summarizer for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn summarize(&self, transcript: &Transcript) -> StageResult<SummaryOutput> {
        (**self).summarize(transcript)
    }
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

/// Summarizer backed by an external tool.
///
/// The tool receives `{"text", "language"}` on stdin and prints
/// `{"title", "summary", "tags"}`.
#[derive(Debug, Clone)]
pub struct CommandSummarizer {
    command: ToolCommand,
    runner: ToolRunner,
}

impl CommandSummarizer {
    pub fn new(command: ToolCommand) -> Self {
        Self {
            command,
            runner: ToolRunner::new(),
        }
    }

    /// Run the tool through `runner` (so it shows up in the run log).
    pub fn with_runner(mut self, runner: ToolRunner) -> Self {
        self.runner = runner;
        self
    }
}

impl Summarizer for CommandSummarizer {
    fn name(&self) -> &str {
        &self.command.program
    }

    fn summarize(&self, transcript: &Transcript) -> StageResult<SummaryOutput> {
        let mut output: SummaryOutput = self.runner.run_json(
            &self.command.program,
            &self.command.args,
            Some(&SummarizeRequest {
                text: &transcript.raw_text,
                language: transcript.language.as_deref(),
            }),
            self.command.timeout(),
        )?;

        output.tags = output
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        output.tags.dedup();
        Ok(output)
    }
}
