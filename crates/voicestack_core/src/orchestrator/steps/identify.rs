//! Stage 6: voice embedding and speaker identity resolution.

use crate::models::Stage;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome};
use crate::store::artifact_names;

/// Embeds each diarized speaker cluster and resolves it against the
/// speaker registry.
///
/// Runs inside the accelerator lock window, so registry writes from
/// concurrent jobs never interleave.
pub struct ResolveSpeakersStep;

impl PipelineStep for ResolveSpeakersStep {
    fn stage(&self) -> Stage {
        Stage::ResolveSpeakers
    }

    fn validate_input(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        state.inference_audio()?;
        if state.diarization.is_none() {
            return Err(StageError::precondition_failed("no diarization to resolve"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let audio = state.inference_audio()?;
        let diarization = state
            .diarization
            .as_ref()
            .ok_or_else(|| StageError::precondition_failed("no diarization to resolve"))?;
        let threshold = ctx.params.similarity_threshold;

        let mut resolutions = Vec::new();
        for label in diarization.labels() {
            let turns: Vec<_> = diarization.turns_for(&label).cloned().collect();
            let vector = ctx.adapters.embedder.embed(audio, &label, &turns)?;
            let resolution = ctx
                .registry
                .resolve(ctx.job_id(), &label, vector, threshold)?;

            match resolution.similarity {
                Some(similarity) => ctx.logger.info(&format!(
                    "{} -> speaker {} (similarity {:.3})",
                    label, resolution.speaker_id, similarity
                )),
                None => ctx.logger.info(&format!(
                    "{} -> new speaker {} (no match at threshold {:.2})",
                    label, resolution.speaker_id, threshold
                )),
            }
            resolutions.push(resolution);
        }

        ctx.write_json_artifact(artifact_names::SPEAKERS, &resolutions)?;
        state.resolutions = Some(resolutions);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        let resolutions = state
            .resolutions
            .as_ref()
            .ok_or_else(|| StageError::invalid_output("no speaker resolutions recorded"))?;
        let labels = state
            .diarization
            .as_ref()
            .map(|d| d.labels())
            .unwrap_or_default();
        if let Some(missing) = labels
            .iter()
            .find(|label| !resolutions.iter().any(|r| &r.label == *label))
        {
            return Err(StageError::invalid_output(format!(
                "speaker {} was not resolved",
                missing
            )));
        }
        Ok(())
    }
}
