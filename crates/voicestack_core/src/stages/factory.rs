//! Adapter bundle built from settings.

use std::sync::Arc;

use crate::config::{AlignerKind, Settings};
use crate::process::ToolRunner;

use super::align::{Aligner, CommandAligner, ProportionalAligner};
use super::asr::AsrChain;
use super::audio::{AudioTool, FfmpegAudioTool};
use super::diarize::{CommandDiarizer, Diarizer};
use super::embed::{CommandEmbedder, VoiceEmbedder};
use super::summarize::{CommandSummarizer, Summarizer};

/// Every adapter the pipeline calls.
#[derive(Clone)]
pub struct StageAdapters {
    pub audio: Arc<dyn AudioTool>,
    pub asr: AsrChain,
    pub aligner: Arc<dyn Aligner>,
    pub diarizer: Arc<dyn Diarizer>,
    pub embedder: Arc<dyn VoiceEmbedder>,
    /// None disables summarization.
    pub summarizer: Option<Arc<dyn Summarizer>>,
}

/// Builds the adapters for one job from that job's settings snapshot.
pub type AdapterFactory = Arc<dyn Fn(&Settings, &ToolRunner) -> StageAdapters + Send + Sync>;

impl StageAdapters {
    /// Build the configured adapters.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_runner(settings, &ToolRunner::new())
    }

    /// Build the configured adapters, running every tool through `runner`.
    ///
    /// `aligner = "command"` without an `align` tool falls back to the
    /// proportional aligner.
    pub fn with_runner(settings: &Settings, runner: &ToolRunner) -> Self {
        let aligner: Arc<dyn Aligner> = match (settings.tools.aligner, &settings.tools.align) {
            (AlignerKind::Command, Some(command)) => {
                Arc::new(CommandAligner::new(command.clone()).with_runner(runner.clone()))
            }
            (AlignerKind::Command, None) => {
                tracing::warn!("aligner = \"command\" but no [tools.align] set; using proportional");
                Arc::new(ProportionalAligner::new())
            }
            (AlignerKind::Proportional, _) => Arc::new(ProportionalAligner::new()),
        };

        Self {
            audio: Arc::new(
                FfmpegAudioTool::new(&settings.tools, &settings.archive)
                    .with_runner(runner.clone()),
            ),
            asr: AsrChain::from_settings(&settings.asr.engines, runner),
            aligner,
            diarizer: Arc::new(
                CommandDiarizer::new(settings.tools.diarize.clone()).with_runner(runner.clone()),
            ),
            embedder: Arc::new(
                CommandEmbedder::new(settings.tools.embed.clone()).with_runner(runner.clone()),
            ),
            summarizer: settings.tools.summarize.clone().map(|command| {
                Arc::new(CommandSummarizer::new(command).with_runner(runner.clone()))
                    as Arc<dyn Summarizer>
            }),
        }
    }

    /// Factory that ignores job settings and hands out clones of `self`.
    pub fn fixed(self) -> AdapterFactory {
        Arc::new(move |_: &Settings, _: &ToolRunner| self.clone())
    }
}
