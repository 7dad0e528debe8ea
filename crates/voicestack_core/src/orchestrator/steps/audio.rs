//! Signal-processing steps: extract, normalize, archive.
//!
//! None of these touch the accelerator, so they run outside the lock window.

use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome};
use crate::models::Stage;
use crate::store::artifact_names;

/// Stage 1: probe the upload and pull its audio track into a WAV.
pub struct ExtractAudioStep;

impl PipelineStep for ExtractAudioStep {
    fn stage(&self) -> Stage {
        Stage::ExtractAudio
    }

    fn validate_input(&self, ctx: &Context, _state: &JobState) -> StageResult<()> {
        if !ctx.asset.input_path.is_file() {
            return Err(StageError::file_not_found(
                ctx.asset.input_path.display().to_string(),
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let input = &ctx.asset.input_path;
        let info = ctx.adapters.audio.probe(input)?;
        ctx.logger.info(&format!(
            "Input: {} ({:.2}s, {} Hz, {} ch, {})",
            input.display(),
            info.duration_secs,
            info.sample_rate,
            info.channels,
            info.codec
        ));
        ctx.catalog.record_asset_audio(ctx.asset.id, info)?;

        let output = ctx.artifact(artifact_names::EXTRACTED_AUDIO);
        let extracted = ctx.adapters.audio.extract(input, &output)?;
        ctx.logger
            .info(&format!("Extracted audio to {}", extracted.path.display()));
        state.extracted = Some(extracted);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        match state.extracted {
            Some(ref audio) if audio.path.is_file() => Ok(()),
            Some(ref audio) => Err(StageError::invalid_output(format!(
                "extracted audio missing at {}",
                audio.path.display()
            ))),
            None => Err(StageError::invalid_output("no extracted audio recorded")),
        }
    }
}

/// Stage 2: loudness-normalize and resample to 16 kHz mono.
pub struct NormalizeAudioStep;

impl PipelineStep for NormalizeAudioStep {
    fn stage(&self) -> Stage {
        Stage::NormalizeAudio
    }

    fn validate_input(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        if state.extracted.is_none() {
            return Err(StageError::precondition_failed("audio has not been extracted"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let extracted = state
            .extracted
            .as_ref()
            .ok_or_else(|| StageError::precondition_failed("audio has not been extracted"))?;

        let output = ctx.artifact(artifact_names::NORMALIZED_AUDIO);
        let normalized = ctx.adapters.audio.normalize(&extracted.path, &output)?;
        ctx.logger.info(&format!(
            "Normalized audio: {:.2}s at {} Hz, {} ch",
            normalized.info.duration_secs, normalized.info.sample_rate, normalized.info.channels
        ));
        state.normalized = Some(normalized);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        let audio = state.inference_audio()?;
        if audio.info.sample_rate != 16_000 || audio.info.channels != 1 {
            return Err(StageError::invalid_output(format!(
                "expected 16000 Hz mono, got {} Hz / {} ch",
                audio.info.sample_rate, audio.info.channels
            )));
        }
        Ok(())
    }
}

/// Stage 9: encode an archival copy of the original upload.
pub struct ArchiveAudioStep;

impl PipelineStep for ArchiveAudioStep {
    fn stage(&self) -> Stage {
        Stage::ArchiveAudio
    }

    fn validate_input(&self, ctx: &Context, _state: &JobState) -> StageResult<()> {
        if !ctx.asset.input_path.is_file() {
            return Err(StageError::file_not_found(
                ctx.asset.input_path.display().to_string(),
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let target = ctx.layout.archive_path(ctx.job_id());
        let archived = ctx.adapters.audio.archive(&ctx.asset.input_path, &target)?;
        ctx.catalog
            .record_archival_path(ctx.asset.id, archived.clone())?;
        ctx.logger
            .info(&format!("Archived audio to {}", archived.display()));
        state.archive_path = Some(archived);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        match state.archive_path {
            Some(ref path) if path.is_file() => Ok(()),
            _ => Err(StageError::invalid_output("archival copy was not written")),
        }
    }
}
