//! Core types for the orchestrator pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::errors::{StageError, StageResult};
use crate::config::Settings;
use crate::logging::RunLog;
use crate::models::{Asset, Job, JobParams, Segment, Stage, Transcript};
use crate::speakers::{Resolution, SpeakerRegistry};
use crate::stages::{
    AlignmentOutput, AsrSelection, DiarizationOutput, PreparedAudio, StageAdapters, SummaryOutput,
};
use crate::store::{ArtifactLayout, Catalog};

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (stage just completed, job progress percent)
pub type ProgressCallback = Box<dyn Fn(Stage, u8) + Send + Sync>;

/// Job parameters with settings defaults filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedParams {
    pub model: String,
    pub compute_type: String,
    pub language: Option<String>,
    pub similarity_threshold: f32,
    pub summarize: bool,
}

impl ResolvedParams {
    pub fn resolve(settings: &Settings, params: &JobParams) -> Self {
        Self {
            model: params
                .model
                .clone()
                .unwrap_or_else(|| settings.asr.model.clone()),
            compute_type: settings.asr.compute_type.clone(),
            language: params.language.clone(),
            similarity_threshold: params
                .similarity_threshold
                .unwrap_or(settings.pipeline.similarity_threshold),
            summarize: params.summarize.unwrap_or(settings.pipeline.summarize),
        }
    }
}

/// Read-only context passed to pipeline steps.
///
/// Holds the job snapshot, the settings snapshot taken at job start and the
/// shared collaborators. Mutable results go in `JobState`.
pub struct Context {
    pub job: Job,
    pub asset: Asset,
    /// Settings as read when the job started.
    pub settings: Settings,
    pub params: ResolvedParams,
    pub layout: ArtifactLayout,
    /// `<artifacts>/<job_id>`
    pub job_dir: PathBuf,
    /// Per-job run log.
    pub logger: Arc<RunLog>,
    pub adapters: StageAdapters,
    pub catalog: Arc<Catalog>,
    pub registry: SpeakerRegistry,
    progress_callback: Option<ProgressCallback>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job: Job,
        asset: Asset,
        settings: Settings,
        layout: ArtifactLayout,
        logger: Arc<RunLog>,
        adapters: StageAdapters,
        catalog: Arc<Catalog>,
        registry: SpeakerRegistry,
    ) -> Self {
        let params = ResolvedParams::resolve(&settings, &job.params);
        let job_dir = layout.job_dir(job.id);
        Self {
            job,
            asset,
            settings,
            params,
            layout,
            job_dir,
            logger,
            adapters,
            catalog,
            registry,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Path of a named artifact in the job directory.
    pub fn artifact(&self, name: &str) -> PathBuf {
        self.job_dir.join(name)
    }

    /// Report progress to callback (if set).
    pub fn report_progress(&self, stage: Stage, percent: u8) {
        if let Some(ref callback) = self.progress_callback {
            callback(stage, percent);
        }
    }

    /// Write a pretty-printed JSON artifact into the job directory.
    pub fn write_json_artifact<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> StageResult<PathBuf> {
        let path = self.artifact(name);
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StageError::parse_error(name, e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| StageError::io_error(format!("writing {}", name), e))?;
        Ok(path)
    }
}

/// Mutable job state that accumulates results from pipeline steps.
///
/// Steps add their own section and read earlier ones; nothing is
/// overwritten once set.
#[derive(Debug, Clone, Default)]
pub struct JobState {
    pub job_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    /// Stage 1 output.
    pub extracted: Option<PreparedAudio>,
    /// Stage 2 output.
    pub normalized: Option<PreparedAudio>,
    /// Stage 3 output, with the engine that produced it.
    pub asr: Option<AsrSelection>,
    pub alignment: Option<AlignmentOutput>,
    pub diarization: Option<DiarizationOutput>,
    /// One entry per diarized speaker label.
    pub resolutions: Option<Vec<Resolution>>,
    pub segments: Option<Vec<Segment>>,
    pub transcript: Option<Transcript>,
    pub archive_path: Option<PathBuf>,
    pub summary: Option<SummaryOutput>,
}

impl JobState {
    pub fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Audio the inference stages consume.
    pub fn inference_audio(&self) -> StageResult<&PreparedAudio> {
        self.normalized
            .as_ref()
            .ok_or_else(|| StageError::precondition_failed("normalized audio not available"))
    }

    pub fn asr_engine(&self) -> Option<&str> {
        self.asr.as_ref().map(|a| a.engine.as_str())
    }
}

/// Outcome of a step execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step completed successfully.
    Success,
    /// Step was skipped (with reason).
    Skipped(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_override_settings() {
        let settings = Settings::default();
        let params = JobParams {
            model: Some("large-v2".to_string()),
            language: Some("de".to_string()),
            similarity_threshold: Some(0.5),
            summarize: Some(false),
        };
        let resolved = ResolvedParams::resolve(&settings, &params);
        assert_eq!(resolved.model, "large-v2");
        assert_eq!(resolved.similarity_threshold, 0.5);
        assert!(!resolved.summarize);

        let defaults = ResolvedParams::resolve(&settings, &JobParams::default());
        assert_eq!(defaults.model, settings.asr.model);
        assert_eq!(defaults.similarity_threshold, 0.30);
        assert_eq!(defaults.language, None);
    }

    #[test]
    fn missing_audio_is_a_precondition_failure() {
        let state = JobState::new(Uuid::new_v4());
        assert!(matches!(
            state.inference_audio(),
            Err(StageError::PreconditionFailed(_))
        ));
    }
}
