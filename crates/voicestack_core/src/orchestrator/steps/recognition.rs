//! Accelerator-bound recognition steps: transcribe, align, diarize.

use crate::models::Stage;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome};
use crate::stages::AsrOptions;
use crate::store::artifact_names;

/// Stage 3: run the ASR fallback chain.
pub struct TranscribeStep;

impl PipelineStep for TranscribeStep {
    fn stage(&self) -> Stage {
        Stage::Transcribe
    }

    fn validate_input(&self, ctx: &Context, state: &JobState) -> StageResult<()> {
        state.inference_audio()?;
        if ctx.adapters.asr.is_empty() {
            return Err(StageError::invalid_input("no ASR engines configured"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let audio = state.inference_audio()?.clone();
        let options = AsrOptions {
            model: ctx.params.model.clone(),
            compute_type: ctx.params.compute_type.clone(),
            language: ctx.params.language.clone(),
            output_dir: ctx.artifact("asr"),
        };

        ctx.logger.info(&format!(
            "ASR chain: {} (model {})",
            ctx.adapters.asr.engine_names().join(" -> "),
            options.model
        ));

        let selection = ctx.adapters.asr.transcribe(&audio, &options, &|attempt| {
            match attempt.error {
                Some(ref error) => ctx.logger.warn(&format!(
                    "ASR engine '{}' failed after {} ms: {}",
                    attempt.engine,
                    attempt.elapsed.as_millis(),
                    error
                )),
                None => ctx.logger.info(&format!(
                    "ASR engine '{}' succeeded in {} ms",
                    attempt.engine,
                    attempt.elapsed.as_millis()
                )),
            }
        })?;

        ctx.logger
            .audit(&format!("ASR engine used: {}", selection.engine));
        ctx.catalog.record_asr_engine(ctx.job_id(), &selection.engine)?;
        ctx.write_json_artifact(artifact_names::ASR_SEGMENTS, &selection.output)?;
        ctx.logger.info(&format!(
            "Transcribed {} segments (language: {})",
            selection.output.segments.len(),
            selection.output.language.as_deref().unwrap_or("unknown")
        ));

        state.asr = Some(selection);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        match state.asr {
            Some(ref selection) if !selection.output.segments.is_empty() => Ok(()),
            Some(_) => Err(StageError::invalid_output("transcription has no segments")),
            None => Err(StageError::invalid_output("no transcription recorded")),
        }
    }
}

/// Stage 4: place every word on the timeline.
pub struct AlignStep;

impl PipelineStep for AlignStep {
    fn stage(&self) -> Stage {
        Stage::Align
    }

    fn validate_input(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        state.inference_audio()?;
        if state.asr.is_none() {
            return Err(StageError::precondition_failed("no transcription to align"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let audio = state.inference_audio()?;
        let asr = state
            .asr
            .as_ref()
            .ok_or_else(|| StageError::precondition_failed("no transcription to align"))?;

        let alignment = ctx.adapters.aligner.align(audio, &asr.output)?;
        ctx.write_json_artifact(artifact_names::ALIGNED_WORDS, &alignment)?;
        ctx.logger.info(&format!(
            "Aligned {} words with {}",
            alignment.words.len(),
            ctx.adapters.aligner.name()
        ));

        state.alignment = Some(alignment);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        let alignment = state
            .alignment
            .as_ref()
            .ok_or_else(|| StageError::invalid_output("no alignment recorded"))?;
        if let Some(word) = alignment
            .words
            .iter()
            .find(|w| !(w.start.is_finite() && w.end.is_finite()) || w.end < w.start)
        {
            return Err(StageError::invalid_output(format!(
                "word '{}' has invalid timing {}..{}",
                word.word, word.start, word.end
            )));
        }
        Ok(())
    }
}

/// Stage 5: partition the audio into speaker turns.
pub struct DiarizeStep;

impl PipelineStep for DiarizeStep {
    fn stage(&self) -> Stage {
        Stage::Diarize
    }

    fn validate_input(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        state.inference_audio().map(|_| ())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let audio = state.inference_audio()?;
        let diarization = ctx.adapters.diarizer.diarize(audio)?;
        ctx.write_json_artifact(artifact_names::DIARIZATION, &diarization)?;
        ctx.logger.info(&format!(
            "Diarized {} turns, {} speakers",
            diarization.turns.len(),
            diarization.labels().len()
        ));

        state.diarization = Some(diarization);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        let diarization = state
            .diarization
            .as_ref()
            .ok_or_else(|| StageError::invalid_output("no diarization recorded"))?;
        let has_speech = state
            .asr
            .as_ref()
            .is_some_and(|a| !a.output.segments.is_empty());
        if has_speech && diarization.turns.is_empty() {
            return Err(StageError::invalid_output(
                "diarization found no speakers in transcribed audio",
            ));
        }
        Ok(())
    }
}
