//! Typed inputs and outputs exchanged with stage adapters.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::{AudioInfo, WordTiming};

/// Audio file on disk plus its probe metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedAudio {
    pub path: PathBuf,
    pub info: AudioInfo,
}

/// Per-job transcription options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrOptions {
    pub model: String,
    pub compute_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Scratch directory engines may write their output into.
    pub output_dir: PathBuf,
}

/// One recognised segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub words: Vec<WordTiming>,
}

/// Transcription result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsrOutput {
    #[serde(default)]
    pub segments: Vec<AsrSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl AsrOutput {
    /// No segment carries any text.
    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.text.trim().is_empty())
    }

    /// Segment texts joined by single spaces.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A word placed on the timeline, tagged with its ASR segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
    /// Index of the ASR segment the word came from.
    pub segment_index: usize,
}

impl AlignedWord {
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }

    pub fn to_timing(&self) -> WordTiming {
        WordTiming::new(self.word.clone(), self.start, self.end)
    }
}

/// Word alignment result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentOutput {
    #[serde(default)]
    pub words: Vec<AlignedWord>,
}

/// One diarized speaker turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub start: f64,
    pub end: f64,
    #[serde(alias = "speaker")]
    pub label: String,
}

impl SpeakerTurn {
    pub fn new(start: f64, end: f64, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }

    /// Inclusive at both ends.
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }

    /// Length of the intersection with `[start, end)`.
    pub fn overlap(&self, start: f64, end: f64) -> f64 {
        (self.end.min(end) - self.start.max(start)).max(0.0)
    }

    /// Distance from `t` to the turn (0 inside it).
    pub fn distance_to(&self, t: f64) -> f64 {
        if t < self.start {
            self.start - t
        } else if t > self.end {
            t - self.end
        } else {
            0.0
        }
    }
}

/// Diarization result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiarizationOutput {
    #[serde(default)]
    pub turns: Vec<SpeakerTurn>,
}

impl DiarizationOutput {
    /// Distinct labels in first-appearance order.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        for turn in &self.turns {
            if !labels.contains(&turn.label) {
                labels.push(turn.label.clone());
            }
        }
        labels
    }

    /// Turns attributed to `label`.
    pub fn turns_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a SpeakerTurn> + 'a {
        self.turns.iter().filter(move |t| t.label == label)
    }
}

/// Summarization result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryOutput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}
