//! Transcript steps: assemble, persist, summarize, finalize.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{Stage, Tag, TagSource, Transcript};
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, JobState, StepOutcome};
use crate::store::artifact_names;
use crate::transcript::{assemble_segments, write_transcript_artifacts, SpeakerNames};

/// Stage 7: merge word timings, turns and identities into segments.
pub struct AssembleSegmentsStep;

impl PipelineStep for AssembleSegmentsStep {
    fn stage(&self) -> Stage {
        Stage::AssembleSegments
    }

    fn validate_input(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        if state.asr.is_none()
            || state.alignment.is_none()
            || state.diarization.is_none()
            || state.resolutions.is_none()
        {
            return Err(StageError::precondition_failed(
                "transcription, alignment, diarization and speaker resolution are required",
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let missing = || StageError::precondition_failed("earlier stage output missing");
        let asr = state.asr.as_ref().ok_or_else(missing)?;
        let alignment = state.alignment.as_ref().ok_or_else(missing)?;
        let diarization = state.diarization.as_ref().ok_or_else(missing)?;
        let speakers: HashMap<String, Uuid> = state
            .resolutions
            .as_ref()
            .ok_or_else(missing)?
            .iter()
            .map(|r| (r.label.clone(), r.speaker_id))
            .collect();

        let segments = assemble_segments(&asr.output, alignment, diarization, &speakers)?;
        ctx.logger.info(&format!(
            "Assembled {} segments from {} words",
            segments.len(),
            alignment.words.len()
        ));
        state.segments = Some(segments);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        let segments = state
            .segments
            .as_ref()
            .ok_or_else(|| StageError::invalid_output("no segments recorded"))?;
        if segments.iter().any(|s| s.speaker_id.is_none()) {
            return Err(StageError::invalid_output("segment without a speaker"));
        }
        if segments.windows(2).any(|w| w[1].start < w[0].end) {
            return Err(StageError::invalid_output("segments overlap"));
        }
        Ok(())
    }
}

/// Speaker names as currently registered, for caption prefixes.
fn speaker_names(ctx: &Context, transcript: &Transcript) -> SpeakerNames {
    transcript
        .speaker_ids()
        .into_iter()
        .filter_map(|id| ctx.registry.get(id).ok().map(|s| (id, s.label())))
        .collect()
}

/// Stage 8: store the transcript and write its artifacts.
pub struct PersistTranscriptStep;

impl PipelineStep for PersistTranscriptStep {
    fn stage(&self) -> Stage {
        Stage::PersistTranscript
    }

    fn validate_input(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        if state.segments.is_none() {
            return Err(StageError::precondition_failed("no segments to persist"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let segments = state
            .segments
            .clone()
            .ok_or_else(|| StageError::precondition_failed("no segments to persist"))?;
        let language = state
            .asr
            .as_ref()
            .and_then(|a| a.output.language.clone())
            .or_else(|| ctx.params.language.clone());

        let transcript = Transcript {
            id: Uuid::new_v4(),
            job_id: ctx.job_id(),
            asset_id: ctx.asset.id,
            raw_text: segments
                .iter()
                .map(|s| s.text.as_str())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            segments,
            language,
            title: None,
            summary: None,
            tags: Vec::new(),
            created_at: Utc::now(),
        };

        ctx.catalog.save_transcript(transcript.clone())?;
        let names = speaker_names(ctx, &transcript);
        let written = write_transcript_artifacts(&ctx.job_dir, &transcript, &names)?;
        ctx.logger.info(&format!(
            "Saved transcript {} ({} segments, {} speakers); wrote {} files",
            transcript.id,
            transcript.segments.len(),
            transcript.speaker_ids().len(),
            written.len()
        ));

        state.transcript = Some(transcript);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, state: &JobState) -> StageResult<()> {
        if state.transcript.is_none() {
            return Err(StageError::invalid_output("no transcript recorded"));
        }
        let path = ctx.artifact(artifact_names::TRANSCRIPT_JSON);
        if !path.is_file() {
            return Err(StageError::invalid_output(format!(
                "{} was not written",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Stage 10: title, summary and tags. Failures never fail the job.
pub struct SummarizeStep;

impl PipelineStep for SummarizeStep {
    fn stage(&self) -> Stage {
        Stage::Summarize
    }

    fn validate_input(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        if state.transcript.is_none() {
            return Err(StageError::precondition_failed("no transcript to summarize"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let summarizer = match (ctx.params.summarize, ctx.adapters.summarizer.as_ref()) {
            (true, Some(summarizer)) => summarizer,
            (false, _) => {
                ctx.logger.info("Summarization disabled for this job");
                return Ok(StepOutcome::Success);
            }
            (true, None) => {
                ctx.logger.info("No summarizer configured");
                return Ok(StepOutcome::Success);
            }
        };

        let transcript = state
            .transcript
            .as_ref()
            .ok_or_else(|| StageError::precondition_failed("no transcript to summarize"))?;
        let summary = summarizer.summarize(transcript)?;
        ctx.write_json_artifact(artifact_names::SUMMARY, &summary)?;

        let update = summary.clone();
        let updated = ctx.catalog.update_transcript(transcript.id, move |t| {
            t.title = update.title;
            t.summary = update.summary;
            t.tags = update
                .tags
                .into_iter()
                .map(|tag| Tag {
                    tag,
                    source: TagSource::Llm,
                })
                .collect();
        })?;
        ctx.logger.info(&format!(
            "Summary: {} ({} tags)",
            updated.title.as_deref().unwrap_or("untitled"),
            updated.tags.len()
        ));

        state.transcript = Some(updated);
        state.summary = Some(summary);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, _state: &JobState) -> StageResult<()> {
        Ok(())
    }

    fn is_optional(&self) -> bool {
        true
    }
}

/// Stage 11: confirm the job's results are in place.
///
/// The terminal status itself is written by the runner once the pipeline
/// returns, so a cancellation that arrives during this stage still wins.
pub struct FinalizeStep;

impl PipelineStep for FinalizeStep {
    fn stage(&self) -> Stage {
        Stage::Finalize
    }

    fn validate_input(&self, _ctx: &Context, state: &JobState) -> StageResult<()> {
        if state.transcript.is_none() {
            return Err(StageError::precondition_failed("no transcript produced"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut JobState) -> StageResult<StepOutcome> {
        let job = ctx.catalog.get_job(ctx.job_id())?;
        let transcript_id = state.transcript.as_ref().map(|t| t.id);
        if job.transcript_id != transcript_id {
            return Err(StageError::other(
                "job record does not reference the produced transcript",
            ));
        }

        let elapsed = state
            .started_at
            .map(|t| (Utc::now() - t).num_milliseconds().max(0))
            .unwrap_or(0);
        ctx.logger.info(&format!(
            "Job finished in {} ms (ASR engine: {})",
            elapsed,
            state.asr_engine().unwrap_or("none")
        ));
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, _state: &JobState) -> StageResult<()> {
        Ok(())
    }
}
