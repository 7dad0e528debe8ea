//! Core enums used throughout the application.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job.
///
/// `Queued -> Running -> {Succeeded | Failed}`, with `Cancelled` reachable
/// from `Queued` or `Running`. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Accepted, waiting for a worker.
    #[default]
    Queued,
    /// Claimed by a worker and executing stages.
    Running,
    /// All stages finished.
    Succeeded,
    /// A fatal stage failure stopped the job.
    Failed,
    /// Stopped on external request.
    Cancelled,
}

impl JobStatus {
    /// Get display string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether the status is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of the fixed processing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExtractAudio,
    NormalizeAudio,
    Transcribe,
    Align,
    Diarize,
    ResolveSpeakers,
    AssembleSegments,
    PersistTranscript,
    ArchiveAudio,
    Summarize,
    Finalize,
}

impl Stage {
    /// Every stage in execution order.
    pub const ALL: [Stage; 11] = [
        Stage::ExtractAudio,
        Stage::NormalizeAudio,
        Stage::Transcribe,
        Stage::Align,
        Stage::Diarize,
        Stage::ResolveSpeakers,
        Stage::AssembleSegments,
        Stage::PersistTranscript,
        Stage::ArchiveAudio,
        Stage::Summarize,
        Stage::Finalize,
    ];

    /// Stable identifier used in logs and persisted records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractAudio => "extract_audio",
            Stage::NormalizeAudio => "normalize_audio",
            Stage::Transcribe => "transcribe",
            Stage::Align => "align",
            Stage::Diarize => "diarize",
            Stage::ResolveSpeakers => "resolve_speakers",
            Stage::AssembleSegments => "assemble_segments",
            Stage::PersistTranscript => "persist_transcript",
            Stage::ArchiveAudio => "archive_audio",
            Stage::Summarize => "summarize",
            Stage::Finalize => "finalize",
        }
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            Stage::ExtractAudio => "Extract audio from the input asset",
            Stage::NormalizeAudio => "Normalize loudness and resample to 16 kHz mono",
            Stage::Transcribe => "Transcribe speech via the ASR fallback chain",
            Stage::Align => "Align words to timestamps",
            Stage::Diarize => "Diarize audio into speaker turns",
            Stage::ResolveSpeakers => "Extract voice embeddings and resolve speaker identities",
            Stage::AssembleSegments => "Merge word timings, turns and identities into segments",
            Stage::PersistTranscript => "Persist transcript, segments and transcript artifacts",
            Stage::ArchiveAudio => "Encode and store an archival copy of the audio",
            Stage::Summarize => "Generate title, summary and tags",
            Stage::Finalize => "Mark the job complete",
        }
    }

    /// Whether the stage contends for the shared accelerator.
    pub fn needs_accelerator(&self) -> bool {
        matches!(
            self,
            Stage::Transcribe | Stage::Align | Stage::Diarize | Stage::ResolveSpeakers
        )
    }

    /// Whether a failure of this stage fails the job.
    pub fn is_critical(&self) -> bool {
        !matches!(self, Stage::Summarize)
    }

    /// Job progress (percent) recorded once this stage completes.
    pub fn progress_after(&self) -> u8 {
        match self {
            Stage::ExtractAudio => 5,
            Stage::NormalizeAudio => 10,
            Stage::Transcribe => 40,
            Stage::Align => 55,
            Stage::Diarize => 65,
            Stage::ResolveSpeakers => 75,
            Stage::AssembleSegments => 80,
            Stage::PersistTranscript => 90,
            Stage::ArchiveAudio => 93,
            Stage::Summarize => 97,
            Stage::Finalize => 100,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a transcript tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagSource {
    #[default]
    Llm,
    User,
}
