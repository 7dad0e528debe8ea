//! Pipeline runner that executes steps in sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::errors::{PipelineError, PipelineResult, StageError};
use super::step::PipelineStep;
use super::steps::{
    AlignStep, ArchiveAudioStep, AssembleSegmentsStep, DiarizeStep, ExtractAudioStep,
    FinalizeStep, NormalizeAudioStep, PersistTranscriptStep, ResolveSpeakersStep, SummarizeStep,
    TranscribeStep,
};
use super::types::{Context, JobState, StepOutcome};
use crate::lease::{holder_id, LeaseGuard, ResourceLock};
use crate::models::Stage;

/// Pipeline that runs a sequence of steps.
///
/// Steps run in order with validation before and after each one.
/// Accelerator-bound steps run inside a single hold of the resource lock:
/// it is taken right before the first of them and given back right after
/// the last, whether that step succeeded or failed.
pub struct Pipeline {
    /// Steps to execute in order.
    steps: Vec<Box<dyn PipelineStep>>,
    /// Cancellation flag.
    cancelled: Arc<AtomicBool>,
    /// Lock guarding accelerator-bound steps. `None` runs them unguarded.
    lock: Option<ResourceLock>,
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            lock: None,
        }
    }

    /// The eleven-stage transcription pipeline.
    pub fn standard() -> Self {
        Pipeline::new()
            .with_step(ExtractAudioStep)
            .with_step(NormalizeAudioStep)
            .with_step(TranscribeStep)
            .with_step(AlignStep)
            .with_step(DiarizeStep)
            .with_step(ResolveSpeakersStep)
            .with_step(AssembleSegmentsStep)
            .with_step(PersistTranscriptStep)
            .with_step(ArchiveAudioStep)
            .with_step(SummarizeStep)
            .with_step(FinalizeStep)
    }

    /// Add a step to the pipeline.
    pub fn add_step<S: PipelineStep + 'static>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a step (builder pattern).
    pub fn with_step<S: PipelineStep + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    /// Guard accelerator-bound steps with `lock`.
    pub fn with_lock(mut self, lock: ResourceLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Get a cancellation handle.
    ///
    /// Call `cancel()` on the returned handle to stop the pipeline
    /// at the next step boundary.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancelled),
        }
    }

    /// Check if pipeline has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run the pipeline with the given context and state.
    ///
    /// For each step:
    /// 1. Check for cancellation (handle or the job's cancel flag)
    /// 2. Take or renew the lock if the step needs the accelerator
    /// 3. Run `validate_input`, `execute`, `validate_output`
    /// 4. Record completion and progress on the job
    ///
    /// A failing optional step is logged and skipped; any other failure
    /// stops the run with `PipelineError::StageFailed`.
    pub fn run(&self, ctx: &Context, state: &mut JobState) -> PipelineResult<PipelineRunResult> {
        let mut result = PipelineRunResult::default();
        let mut guard: Option<LeaseGuard> = None;

        for (i, step) in self.steps.iter().enumerate() {
            let stage = step.stage();

            if self.is_cancelled() || ctx.catalog.is_cancel_requested(ctx.job_id())? {
                ctx.logger
                    .warn(&format!("Cancellation requested; stopping before '{}'", stage));
                self.release(ctx, guard.take());
                return Err(PipelineError::cancelled(ctx.job_id()));
            }

            ctx.catalog.record_stage_started(ctx.job_id(), stage)?;
            ctx.logger.stage_started(stage);
            let started = Instant::now();

            if stage.needs_accelerator() {
                if let Err(e) = self.hold_lock(ctx, &mut guard) {
                    return Err(self.fail(ctx, stage, e, guard.take()));
                }
            }

            let outcome = Self::run_step(step.as_ref(), ctx, state);

            let next_needs_lock = self
                .steps
                .get(i + 1)
                .is_some_and(|s| s.stage().needs_accelerator());
            if !next_needs_lock {
                self.release(ctx, guard.take());
            }

            match outcome {
                Ok(StepOutcome::Success) => {
                    ctx.logger.stage_done(stage, started.elapsed());
                    let job = ctx.catalog.record_stage_completed(ctx.job_id(), stage)?;
                    ctx.report_progress(stage, job.progress);
                    result.completed.push(stage);
                }
                Ok(StepOutcome::Skipped(reason)) => {
                    ctx.logger.stage_skipped(stage, &reason);
                    result.skipped.push(stage);
                }
                Err(e) if step.is_optional() => {
                    ctx.logger.stage_failed(stage, &e.to_string());
                    ctx.logger
                        .warn(&format!("'{}' is optional; continuing without it", stage));
                    result.skipped.push(stage);
                }
                Err(e) => return Err(self.fail(ctx, stage, e, guard.take())),
            }
        }

        result.asr_engine = state.asr_engine().map(str::to_string);
        ctx.logger.info("Pipeline completed successfully");
        Ok(result)
    }

    fn run_step(
        step: &dyn PipelineStep,
        ctx: &Context,
        state: &mut JobState,
    ) -> Result<StepOutcome, StageError> {
        step.validate_input(ctx, state)?;
        let outcome = step.execute(ctx, state)?;
        if outcome == StepOutcome::Success {
            step.validate_output(ctx, state)?;
        }
        Ok(outcome)
    }

    /// Take the lock on first use, renew it on later accelerator steps.
    fn hold_lock(&self, ctx: &Context, guard: &mut Option<LeaseGuard>) -> Result<(), StageError> {
        let Some(ref lock) = self.lock else {
            return Ok(());
        };

        if let Some(held) = guard.as_mut() {
            held.renew()?;
            return Ok(());
        }

        let holder = holder_id(&format!("job-{}", ctx.job_id()));
        ctx.logger
            .info(&format!("Waiting for lock '{}' as {}", lock.name(), holder));
        let acquired = lock.acquire(&holder)?;
        ctx.logger.info(&format!("Acquired lock '{}'", lock.name()));
        *guard = Some(acquired);
        Ok(())
    }

    fn release(&self, ctx: &Context, guard: Option<LeaseGuard>) {
        let Some(guard) = guard else {
            return;
        };
        let name = self.lock.as_ref().map(|l| l.name()).unwrap_or("lock");
        match guard.release() {
            Ok(()) => ctx.logger.info(&format!("Released lock '{}'", name)),
            Err(e) => ctx
                .logger
                .warn(&format!("Failed to release lock '{}': {}", name, e)),
        }
    }

    fn fail(
        &self,
        ctx: &Context,
        stage: Stage,
        error: StageError,
        guard: Option<LeaseGuard>,
    ) -> PipelineError {
        ctx.logger.stage_failed(stage, &error.to_string());
        self.release(ctx, guard);
        ctx.logger.show_tail("failure");
        PipelineError::stage_failed(ctx.job_id(), stage, error)
    }

    /// Get the number of steps in the pipeline.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Get step names in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for cancelling a running pipeline.
#[derive(Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Handle not attached to any pipeline (e.g. a worker shutdown flag).
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pipeline.
    ///
    /// The pipeline will stop at the next step boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Result of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineRunResult {
    /// Stages that completed successfully, in order.
    pub completed: Vec<Stage>,
    /// Stages that were skipped or failed without failing the job.
    pub skipped: Vec<Stage>,
    /// ASR engine whose output was used.
    pub asr_engine: Option<String>,
}

impl PipelineRunResult {
    /// Check if all steps completed (none skipped).
    pub fn all_completed(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Total number of steps that ran.
    pub fn total_steps(&self) -> usize {
        self.completed.len() + self.skipped.len()
    }
}
