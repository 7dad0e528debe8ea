//! Well-known artifact locations.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::Settings;

/// Artifact file names inside a job directory.
pub mod artifact_names {
    pub const RUN_LOG: &str = "_pipeline.log";
    pub const EXTRACTED_AUDIO: &str = "extracted.wav";
    pub const NORMALIZED_AUDIO: &str = "raw_16k_mono.wav";
    pub const ASR_SEGMENTS: &str = "asr_segments.json";
    pub const ALIGNED_WORDS: &str = "aligned_words.json";
    pub const DIARIZATION: &str = "diarization.json";
    pub const SPEAKERS: &str = "speakers.json";
    pub const TRANSCRIPT_JSON: &str = "transcript.json";
    pub const TRANSCRIPT_TXT: &str = "transcript.txt";
    pub const TRANSCRIPT_SRT: &str = "transcript.srt";
    pub const TRANSCRIPT_VTT: &str = "transcript.vtt";
    pub const SUMMARY: &str = "summary.json";
}

/// Per-job artifact directories.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    artifacts_root: PathBuf,
    archive_root: PathBuf,
    archive_extension: String,
}

impl ArtifactLayout {
    pub fn new(artifacts_root: impl Into<PathBuf>, archive_root: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_root: artifacts_root.into(),
            archive_root: archive_root.into(),
            archive_extension: "opus".to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            artifacts_root: settings.paths.artifacts_dir(),
            archive_root: settings.paths.archive_dir(),
            archive_extension: settings.archive.extension.clone(),
        }
    }

    pub fn artifacts_root(&self) -> &Path {
        &self.artifacts_root
    }

    /// `<artifacts>/<job_id>`
    pub fn job_dir(&self, job_id: Uuid) -> PathBuf {
        self.artifacts_root.join(job_id.to_string())
    }

    pub fn artifact(&self, job_id: Uuid, name: &str) -> PathBuf {
        self.job_dir(job_id).join(name)
    }

    pub fn run_log_path(&self, job_id: Uuid) -> PathBuf {
        self.artifact(job_id, artifact_names::RUN_LOG)
    }

    /// `<archive>/<job_id>.<ext>`
    pub fn archive_path(&self, job_id: Uuid) -> PathBuf {
        self.archive_root
            .join(format!("{}.{}", job_id, self.archive_extension))
    }
}
