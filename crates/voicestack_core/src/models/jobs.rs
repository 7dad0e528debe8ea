//! Job records, per-job parameters and error summaries.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{JobStatus, Stage};

/// Per-job overrides supplied at enqueue time.
///
/// Every field is optional; unset fields fall back to the settings snapshot
/// taken when the job starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParams {
    /// ASR model name (substituted into engine argument templates).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Spoken language hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Speaker similarity threshold override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f32>,
    /// Force summarization on or off for this job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarize: Option<bool>,
}

/// Error summary visible to callers of a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    /// Stage that failed (None for failures outside any stage).
    pub stage: Option<Stage>,
    /// Error text.
    pub message: String,
}

impl JobError {
    pub fn new(stage: Option<Stage>, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{}: {}", stage, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Durable job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: Uuid,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Progress percentage (0-100), never decreasing.
    pub progress: u8,
    /// Stage currently executing (while running).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    /// Stages that completed, in completion order.
    #[serde(default)]
    pub completed_stages: Vec<Stage>,
    /// Input asset.
    pub asset_id: Uuid,
    /// Produced transcript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<Uuid>,
    /// Per-job overrides.
    #[serde(default)]
    pub params: JobParams,
    /// ASR engine whose output was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asr_engine: Option<String>,
    /// Error summary (failed jobs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// External cancellation request, honoured at the next stage boundary.
    #[serde(default)]
    pub cancel_requested: bool,
    /// Location of the per-job run log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job for an asset.
    pub fn new(asset_id: Uuid, params: JobParams) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            progress: 0,
            current_stage: None,
            completed_stages: Vec::new(),
            asset_id,
            transcript_id: None,
            params,
            asr_engine: None,
            error: None,
            cancel_requested: false,
            log_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next` if the transition is legal.
    ///
    /// Returns false (leaving the record untouched) otherwise.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.current_stage = None;
        }
        self.touch();
        true
    }

    /// Raise progress; lower values are ignored.
    pub fn advance_progress(&mut self, percent: u8) {
        self.progress = self.progress.max(percent.min(100));
        self.touch();
    }

    /// Bump the update timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether the given stage already completed.
    pub fn has_completed(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }
}
