//! Job runner: takes one claimed job through the standard pipeline.
//!
//! The runner owns the catalog and speaker registry. Settings are read again
//! at every job start, and that snapshot decides the job's stage adapters,
//! ASR engine order and accelerator lock options. The runner sets up the job
//! directory and run log, runs the pipeline and writes the terminal status.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use super::errors::PipelineError;
use super::pipeline::{Pipeline, PipelineRunResult};
use super::types::{Context, JobState};
use crate::config::{ConfigManager, Settings};
use crate::lease::{FileLeaseStore, LeaseResult, LockOptions, ResourceLock};
use crate::logging::{LogConfig, LogObserver, RunLog};
use crate::models::{Job, JobError, JobStatus, Stage};
use crate::process::{CommandLog, ToolRunner};
use crate::speakers::SpeakerRegistry;
use crate::stages::{AdapterFactory, StageAdapters};
use crate::store::{ArtifactLayout, Catalog, StoreResult};

/// Progress observer shared by every job a runner executes.
///
/// Arguments: (job, stage just completed, job progress percent)
pub type JobProgressObserver = Arc<dyn Fn(Uuid, Stage, u8) + Send + Sync>;

/// Result of running a single job.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    /// Terminal status written for the job.
    pub status: JobStatus,
    pub error: Option<JobError>,
    /// Stages that completed.
    pub completed: Vec<Stage>,
    /// Stages that were skipped or failed without failing the job.
    pub skipped: Vec<Stage>,
    pub asr_engine: Option<String>,
    pub transcript_id: Option<Uuid>,
    pub log_path: Option<PathBuf>,
}

impl JobOutcome {
    fn from_job(job: &Job, run: Option<PipelineRunResult>) -> Self {
        let run = run.unwrap_or_default();
        Self {
            job_id: job.id,
            status: job.status,
            error: job.error.clone(),
            completed: if run.completed.is_empty() {
                job.completed_stages.clone()
            } else {
                run.completed
            },
            skipped: run.skipped,
            asr_engine: job.asr_engine.clone(),
            transcript_id: job.transcript_id,
            log_path: job.log_path.clone(),
        }
    }

    /// Whether the job reached SUCCEEDED.
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

/// Runs claimed jobs through the standard pipeline.
///
/// # Example
///
/// ```ignore
/// let runner = JobRunner::from_settings(settings, catalog)?.with_settings_file(path);
/// while let Some(outcome) = runner.run_next()? {
///     println!("{} -> {}", outcome.job_id, outcome.status);
/// }
/// ```
pub struct JobRunner {
    /// Settings used when no settings file is configured.
    settings: Settings,
    /// Settings file re-read at every job start.
    settings_path: Option<PathBuf>,
    catalog: Arc<Catalog>,
    adapters: AdapterFactory,
    registry: SpeakerRegistry,
    /// Fixed accelerator lock; None opens the configured leases folder per job.
    lock: Option<ResourceLock>,
    log_observer: Option<LogObserver>,
    progress_observer: Option<JobProgressObserver>,
}

impl JobRunner {
    /// Runner with fixed adapters and a fixed accelerator lock.
    pub fn new(
        settings: Settings,
        catalog: Arc<Catalog>,
        adapters: StageAdapters,
        lock: ResourceLock,
    ) -> Self {
        let registry = SpeakerRegistry::new(Arc::clone(&catalog));
        Self {
            settings,
            settings_path: None,
            catalog,
            adapters: adapters.fixed(),
            registry,
            lock: Some(lock),
            log_observer: None,
            progress_observer: None,
        }
    }

    /// Runner that builds adapters and the accelerator lock from each job's
    /// settings. The lock lives in the configured leases folder, shared with
    /// every other worker process on the same data root.
    pub fn from_settings(settings: Settings, catalog: Arc<Catalog>) -> LeaseResult<Self> {
        FileLeaseStore::new(settings.paths.leases_dir())?;
        let registry = SpeakerRegistry::new(Arc::clone(&catalog));
        Ok(Self {
            settings,
            settings_path: None,
            catalog,
            adapters: Arc::new(StageAdapters::with_runner),
            registry,
            lock: None,
            log_observer: None,
            progress_observer: None,
        })
    }

    /// Build each job's adapters with `factory` instead of the configured tools.
    pub fn with_adapter_factory(mut self, factory: AdapterFactory) -> Self {
        self.adapters = factory;
        self
    }

    /// Re-read `path` at the start of every job.
    pub fn with_settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    /// Forward every run log line to `observer`.
    pub fn with_log_observer(mut self, observer: LogObserver) -> Self {
        self.log_observer = Some(observer);
        self
    }

    pub fn with_progress_observer(mut self, observer: JobProgressObserver) -> Self {
        self.progress_observer = Some(observer);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &SpeakerRegistry {
        &self.registry
    }

    /// Claim the oldest queued job and run it.
    ///
    /// Returns `None` when the queue is empty.
    pub fn run_next(&self) -> StoreResult<Option<JobOutcome>> {
        match self.catalog.claim_next_job()? {
            Some(job) => Ok(Some(self.run_claimed(job))),
            None => Ok(None),
        }
    }

    /// Claim a specific queued job and run it.
    pub fn run_job(&self, job_id: Uuid) -> StoreResult<JobOutcome> {
        let job = self.catalog.claim_job(job_id)?;
        Ok(self.run_claimed(job))
    }

    /// Run a job already moved to RUNNING.
    pub fn run_claimed(&self, job: Job) -> JobOutcome {
        let job_id = job.id;
        tracing::info!(job_id = %job_id, "Starting job");

        let (ctx, lock) = match self.prepare(job) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::error!(job_id = %job_id, "{}", e);
                if let Err(store_err) = self
                    .catalog
                    .fail_job(job_id, JobError::new(None, e.to_string()))
                {
                    tracing::error!(job_id = %job_id, "Could not record failure: {}", store_err);
                }
                return self.outcome(job_id, None);
            }
        };

        let pipeline = Pipeline::standard().with_lock(lock);
        let mut state = JobState::new(job_id);
        let result = pipeline.run(&ctx, &mut state);

        let run = match result {
            Ok(run) => {
                match self.catalog.complete_job(job_id) {
                    Ok(JobStatus::Cancelled) => ctx
                        .logger
                        .warn("Cancellation arrived during the last stage; job CANCELLED"),
                    Ok(status) => ctx.logger.info(&format!("Job finished: {}", status)),
                    Err(e) => ctx
                        .logger
                        .error(&format!("Could not record completion: {}", e)),
                }
                Some(run)
            }
            Err(PipelineError::Cancelled { .. }) => {
                self.record_cancelled(&ctx);
                None
            }
            Err(e) => {
                self.record_failure(&ctx, e);
                None
            }
        };

        ctx.logger.close();
        self.outcome(job_id, run)
    }

    fn prepare(&self, job: Job) -> Result<(Context, ResourceLock), PipelineError> {
        let job_id = job.id;
        let settings = self.settings_snapshot();
        let layout = ArtifactLayout::from_settings(&settings);

        let job_dir = layout.job_dir(job_id);
        std::fs::create_dir_all(&job_dir).map_err(|e| {
            PipelineError::setup_failed(
                job_id,
                format!("cannot create {}: {}", job_dir.display(), e),
            )
        })?;

        let log_path = layout.run_log_path(job_id);
        let logger = RunLog::open(
            job_id,
            &log_path,
            LogConfig::from(&settings.logging),
            self.log_observer.clone(),
        )
        .map(Arc::new)
        .map_err(|e| PipelineError::setup_failed(job_id, format!("cannot open run log: {}", e)))?;
        self.catalog.set_log_path(job_id, log_path)?;

        let asset = self.catalog.get_asset(job.asset_id)?;
        logger.info(&format!("Job {} started", job_id));
        logger.info(&format!("Input: {}", asset.input_path.display()));

        let lock = self.job_lock(job_id, &settings)?;
        let command_log: CommandLog = {
            let logger = Arc::clone(&logger);
            Arc::new(move |line: &str| logger.command(line))
        };
        let adapters = (self.adapters)(&settings, &ToolRunner::new().with_log(command_log));
        logger.info(&format!(
            "ASR engines: {}; lock '{}' (timeout {} s)",
            adapters.asr.engine_names().join(", "),
            lock.name(),
            lock.options().acquire_timeout.as_secs()
        ));

        let mut ctx = Context::new(
            job,
            asset,
            settings,
            layout,
            logger,
            adapters,
            Arc::clone(&self.catalog),
            self.registry.clone(),
        );
        ctx.logger.info(&format!(
            "Model: {}, similarity threshold: {:.2}, summarize: {}",
            ctx.params.model, ctx.params.similarity_threshold, ctx.params.summarize
        ));

        if let Some(ref observer) = self.progress_observer {
            let observer = Arc::clone(observer);
            ctx = ctx.with_progress_callback(Box::new(move |stage, percent| {
                observer(job_id, stage, percent)
            }));
        }
        Ok((ctx, lock))
    }

    fn job_lock(&self, job_id: Uuid, settings: &Settings) -> Result<ResourceLock, PipelineError> {
        if let Some(ref lock) = self.lock {
            return Ok(lock.clone());
        }
        let store = FileLeaseStore::new(settings.paths.leases_dir()).map_err(|e| {
            PipelineError::setup_failed(job_id, format!("cannot open lease store: {}", e))
        })?;
        Ok(ResourceLock::new(
            Arc::new(store),
            settings.pipeline.lock_name.clone(),
            LockOptions::from(&settings.pipeline),
        ))
    }

    fn settings_snapshot(&self) -> Settings {
        let Some(ref path) = self.settings_path else {
            return self.settings.clone();
        };
        match ConfigManager::read_snapshot(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Using startup settings: {}", e);
                self.settings.clone()
            }
        }
    }

    fn record_cancelled(&self, ctx: &Context) {
        match self.catalog.mark_cancelled(ctx.job_id()) {
            Ok(()) => ctx.logger.warn("Job CANCELLED; remaining stages skipped"),
            Err(e) => ctx
                .logger
                .error(&format!("Could not record cancellation: {}", e)),
        }
    }

    fn record_failure(&self, ctx: &Context, error: PipelineError) {
        let job_id = ctx.job_id();

        // A stage that fails after cancellation was requested still ends CANCELLED.
        if self.catalog.is_cancel_requested(job_id).unwrap_or(false) {
            ctx.logger.warn(&format!("{}", error));
            self.record_cancelled(ctx);
            return;
        }

        let job_error = match error {
            PipelineError::StageFailed { stage, source, .. } => {
                JobError::new(Some(stage), source.to_string())
            }
            other => JobError::new(None, other.to_string()),
        };
        ctx.logger.error(&format!("Job FAILED: {}", job_error));
        if let Err(e) = self.catalog.fail_job(job_id, job_error) {
            ctx.logger.error(&format!("Could not record failure: {}", e));
        }
    }

    fn outcome(&self, job_id: Uuid, run: Option<PipelineRunResult>) -> JobOutcome {
        match self.catalog.get_job(job_id) {
            Ok(job) => JobOutcome::from_job(&job, run),
            Err(e) => {
                tracing::error!(job_id = %job_id, "Job record unavailable: {}", e);
                JobOutcome {
                    job_id,
                    status: JobStatus::Failed,
                    error: Some(JobError::new(None, e.to_string())),
                    completed: Vec::new(),
                    skipped: Vec::new(),
                    asr_engine: None,
                    transcript_id: None,
                    log_path: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::MemoryLeaseStore;
    use crate::models::JobParams;
    use tempfile::TempDir;

    fn runner(dir: &TempDir) -> JobRunner {
        let mut settings = Settings::default();
        settings.paths.data_root = dir.path().to_string_lossy().into_owned();
        let catalog = Arc::new(Catalog::in_memory());
        let adapters = StageAdapters::from_settings(&settings);
        let lock = ResourceLock::new(
            Arc::new(MemoryLeaseStore::new()),
            "accelerator",
            LockOptions::default(),
        );
        JobRunner::new(settings, catalog, adapters, lock)
    }

    #[test]
    fn empty_queue_returns_none() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        assert!(runner.run_next().unwrap().is_none());
    }

    #[test]
    fn missing_input_fails_at_extract() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let job = runner
            .catalog()
            .enqueue_job(dir.path().join("missing.wav"), JobParams::default())
            .unwrap();

        let outcome = runner.run_next().unwrap().unwrap();

        assert_eq!(outcome.job_id, job.id);
        assert_eq!(outcome.status, JobStatus::Failed);
        let error = outcome.error.unwrap();
        assert_eq!(error.stage, Some(Stage::ExtractAudio));
        assert!(error.message.contains("missing.wav"));

        let log = std::fs::read_to_string(outcome.log_path.unwrap()).unwrap();
        assert!(log.contains("=== extract_audio ==="));
        assert!(log.contains("[ERROR] extract_audio"));
    }

    #[test]
    fn tool_commands_are_written_to_the_run_log() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.paths.data_root = dir.path().to_string_lossy().into_owned();
        settings.tools.ffprobe = "voicestack-no-such-ffprobe".to_string();
        let runner = JobRunner::from_settings(settings, Arc::new(Catalog::in_memory())).unwrap();

        let input = dir.path().join("talk.wav");
        std::fs::write(&input, b"RIFF").unwrap();
        runner
            .catalog()
            .enqueue_job(&input, JobParams::default())
            .unwrap();

        let outcome = runner.run_next().unwrap().unwrap();

        assert_eq!(outcome.error.unwrap().stage, Some(Stage::ExtractAudio));
        let log = std::fs::read_to_string(outcome.log_path.unwrap()).unwrap();
        assert!(log.contains("$ voicestack-no-such-ffprobe -v error -print_format json"));
    }
}
