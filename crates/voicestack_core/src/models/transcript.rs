//! Transcript, segment and word timing structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::TagSource;

/// Timing of a single recognised word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    /// Diarizer label the word was attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_label: Option<String>,
}

impl WordTiming {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
            speaker_label: None,
        }
    }

    /// Midpoint of the word in seconds.
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// A contiguous, single-speaker piece of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    pub text: String,
    /// Word-level timings, in order.
    #[serde(default)]
    pub words: Vec<WordTiming>,
    /// Resolved speaker. Never None once diarization has completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<Uuid>,
    /// Raw diarizer label, kept for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_label: Option<String>,
}

impl Segment {
    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Free-form tag attached to a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag: String,
    #[serde(default)]
    pub source: TagSource,
}

/// Transcript of one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub id: Uuid,
    pub job_id: Uuid,
    pub asset_id: Uuid,
    /// Concatenated segment text.
    pub raw_text: String,
    /// Segments ordered by start time.
    pub segments: Vec<Segment>,
    /// Detected or requested language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
}

impl Transcript {
    /// Distinct speakers referenced by the segments, in first-appearance order.
    pub fn speaker_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for id in self.segments.iter().filter_map(|s| s.speaker_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}
