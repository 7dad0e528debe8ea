//! Word alignment adapters.

use std::sync::Arc;

use serde::Serialize;

use crate::config::ToolCommand;
use crate::models::WordTiming;
use crate::orchestrator::{StageError, StageResult};
use crate::process::{render_args, ToolRunner};

use super::types::{AlignedWord, AlignmentOutput, AsrOutput, PreparedAudio};

/// Places every recognised word on the timeline.
pub trait Aligner: Send + Sync {
    fn name(&self) -> &str;

    fn align(&self, audio: &PreparedAudio, asr: &AsrOutput) -> StageResult<AlignmentOutput>;
}

impl<T: Aligner> Aligner for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn align(&self, audio: &PreparedAudio, asr: &AsrOutput) -> StageResult<AlignmentOutput> {
        (**self).align(audio, asr)
    }
}

/// Spread `[start, end)` over the words of `text` in proportion to their
/// character length.
pub fn spread_words(text: &str, start: f64, end: f64) -> Vec<WordTiming> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    if words.is_empty() || total_chars == 0 {
        return Vec::new();
    }

    let span = (end - start).max(0.0);
    let mut cursor = start;
    let mut consumed = 0usize;
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            consumed += word.chars().count();
            // Last word ends exactly on the segment boundary
            let word_end = if i + 1 == words.len() {
                start + span
            } else {
                start + span * consumed as f64 / total_chars as f64
            };
            let timing = WordTiming::new(*word, cursor, word_end);
            cursor = word_end;
            timing
        })
        .collect()
}

/// Aligner that trusts ASR word timings and estimates the rest.
///
/// Segments with word timings keep them; segments without get their
/// duration distributed by [`spread_words`].
#[derive(Debug, Clone, Default)]
pub struct ProportionalAligner;

impl ProportionalAligner {
    pub fn new() -> Self {
        Self
    }
}

impl Aligner for ProportionalAligner {
    fn name(&self) -> &str {
        "proportional"
    }

    fn align(&self, _audio: &PreparedAudio, asr: &AsrOutput) -> StageResult<AlignmentOutput> {
        let mut words = Vec::new();
        for (index, segment) in asr.segments.iter().enumerate() {
            let timings = if segment.words.is_empty() {
                spread_words(&segment.text, segment.start, segment.end)
            } else {
                segment.words.clone()
            };
            words.extend(timings.into_iter().map(|w| AlignedWord {
                word: w.word,
                start: w.start,
                end: w.end,
                segment_index: index,
            }));
        }
        Ok(AlignmentOutput { words })
    }
}

#[derive(Serialize)]
struct AlignRequest<'a> {
    audio: &'a PreparedAudio,
    asr: &'a AsrOutput,
}

/// Aligner backed by an external tool.
///
/// The tool receives `{"audio": .., "asr": ..}` on stdin and prints
/// `{"words": [{"word", "start", "end", "segment_index"}]}`.
#[derive(Debug, Clone)]
pub struct CommandAligner {
    command: ToolCommand,
    runner: ToolRunner,
}

impl CommandAligner {
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

impl Aligner for CommandAligner {
    fn name(&self) -> &str {
        &self.command.program
    }

    fn align(&self, audio: &PreparedAudio, asr: &AsrOutput) -> StageResult<AlignmentOutput> {
        let input = audio.path.to_string_lossy();
        let args = render_args(&self.command.args, &[("input", &input)]);
        let output: AlignmentOutput = self.runner.run_json(
            &self.command.program,
            &args,
            Some(&AlignRequest { audio, asr }),
            self.command.timeout(),
        )?;

        if let Some(word) = output
            .words
            .iter()
            .find(|w| w.segment_index >= asr.segments.len())
        {
            return Err(StageError::invalid_output(format!(
                "word '{}' references segment {} of {}",
                word.word,
                word.segment_index,
                asr.segments.len()
            )));
        }
        Ok(output)
    }
}
