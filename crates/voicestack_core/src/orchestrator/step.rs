//! The unit of work the pipeline runs for each stage.

use super::errors::StageResult;
use super::types::{Context, JobState, StepOutcome};
use crate::models::Stage;

/// One stage of a job.
///
/// The pipeline calls `validate_input`, then `execute`, then
/// `validate_output` (only when `execute` returned `Success`). Results are
/// handed to later stages through [`JobState`].
///
/// ```ignore
/// struct DiarizeStep;
///
/// impl PipelineStep for DiarizeStep {
///     fn stage(&self) -> Stage { Stage::Diarize }
///
///     fn validate_input(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
///         state.inference_audio().map(|_| ())
///     }
///
///     fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
///         let audio = state.inference_audio()?.clone();
///         state.diarization = Some(ctx.adapters.diarizer.diarize(&audio)?);
///         Ok(StepOutcome::Success)
///     }
///
///     fn validate_output(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
///         state.diarization.as_ref().map(|_| ()).ok_or_else(|| {
///             StageError::invalid_output("no diarization recorded")
///         })
///     }
/// }
/// ```
pub trait PipelineStep: Send + Sync {
    /// Stage this step implements.
    fn stage(&self) -> Stage;

    /// Name used in run log headers and errors.
    fn name(&self) -> &str {
        self.stage().as_str()
    }

    /// Fail early when an earlier stage left nothing to work on.
    fn validate_input(&self, ctx: &Context, state: &JobState) -> StageResult<()>;

    /// Do the work and record results in `state`. `Skipped` is not a failure.
    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome>;

    /// Check what `execute` recorded.
    fn validate_output(&self, ctx: &Context, state: &JobState) -> StageResult<()>;

    /// Whether a failure of this step is logged and passed over instead of
    /// failing the job. Defaults to the stage's criticality.
    fn is_optional(&self) -> bool {
        !self.stage().is_critical()
    }

    /// One-line description for the run log.
    fn description(&self) -> &str {
        self.stage().description()
    }
}
