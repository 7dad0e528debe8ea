//! Job store operations.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::{Catalog, StoreError, StoreResult};
use crate::models::{Asset, AudioInfo, Job, JobError, JobParams, JobStatus, Stage, Transcript};

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job had not started and is now CANCELLED.
    CancelledWhileQueued,
    /// The job is running; it stops at the next stage boundary.
    Requested,
    /// The job had already finished; nothing changed.
    AlreadyTerminal(JobStatus),
}

fn transition(job: &mut Job, next: JobStatus) -> StoreResult<()> {
    let from = job.status;
    if job.transition(next) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition {
            job_id: job.id,
            from,
            to: next,
        })
    }
}

fn running_job(state: &mut super::CatalogState, id: Uuid) -> StoreResult<&mut Job> {
    let job = state.job_mut(id)?;
    if job.status != JobStatus::Running {
        return Err(StoreError::Conflict(format!(
            "job {} is {}, not RUNNING",
            id, job.status
        )));
    }
    Ok(job)
}

impl Catalog {
    /// Register an uploaded file and queue a job for it.
    pub fn enqueue_job(&self, input_path: impl AsRef<Path>, params: JobParams) -> StoreResult<Job> {
        let input_path = input_path.as_ref().to_path_buf();
        self.transaction(|state| {
            let mut job = Job::new(Uuid::nil(), params);
            let asset = Asset::new(job.id, input_path);
            job.asset_id = asset.id;
            state.assets.insert(asset.id, asset);
            state.jobs.insert(job.id, job.clone());
            tracing::info!(job_id = %job.id, "Job queued");
            Ok(job)
        })
    }

    /// Claim the oldest queued job, moving it to RUNNING.
    pub fn claim_next_job(&self) -> StoreResult<Option<Job>> {
        self.transaction(|state| {
            let next = state
                .jobs
                .values()
                .filter(|j| j.status == JobStatus::Queued && !j.cancel_requested)
                .min_by_key(|j| (j.created_at, j.id))
                .map(|j| j.id);

            match next {
                Some(id) => {
                    let job = state.job_mut(id)?;
                    transition(job, JobStatus::Running)?;
                    Ok(Some(job.clone()))
                }
                None => Ok(None),
            }
        })
    }

    /// Claim a specific queued job.
    pub fn claim_job(&self, id: Uuid) -> StoreResult<Job> {
        self.transaction(|state| {
            let job = state.job_mut(id)?;
            transition(job, JobStatus::Running)?;
            Ok(job.clone())
        })
    }

    pub fn set_log_path(&self, id: Uuid, log_path: PathBuf) -> StoreResult<()> {
        self.transaction(|state| {
            let job = state.job_mut(id)?;
            job.log_path = Some(log_path);
            job.touch();
            Ok(())
        })
    }

    pub fn record_stage_started(&self, id: Uuid, stage: Stage) -> StoreResult<()> {
        self.transaction(|state| {
            let job = running_job(state, id)?;
            job.current_stage = Some(stage);
            job.touch();
            Ok(())
        })
    }

    /// Append `stage` to the completed list and raise progress.
    pub fn record_stage_completed(&self, id: Uuid, stage: Stage) -> StoreResult<Job> {
        self.transaction(|state| {
            let job = running_job(state, id)?;
            if !job.has_completed(stage) {
                job.completed_stages.push(stage);
            }
            job.advance_progress(stage.progress_after());
            Ok(job.clone())
        })
    }

    pub fn record_asr_engine(&self, id: Uuid, engine: &str) -> StoreResult<()> {
        self.transaction(|state| {
            let job = running_job(state, id)?;
            job.asr_engine = Some(engine.to_string());
            job.touch();
            Ok(())
        })
    }

    /// Ask a job to stop.
    ///
    /// Queued jobs are cancelled on the spot; running jobs are flagged and
    /// stop at the next stage boundary.
    pub fn request_cancel(&self, id: Uuid) -> StoreResult<CancelOutcome> {
        self.transaction(|state| {
            let job = state.job_mut(id)?;
            let outcome = match job.status {
                JobStatus::Queued => {
                    job.cancel_requested = true;
                    transition(job, JobStatus::Cancelled)?;
                    CancelOutcome::CancelledWhileQueued
                }
                JobStatus::Running => {
                    job.cancel_requested = true;
                    job.touch();
                    CancelOutcome::Requested
                }
                status => CancelOutcome::AlreadyTerminal(status),
            };
            tracing::info!(job_id = %id, ?outcome, "Cancellation requested");
            Ok(outcome)
        })
    }

    pub fn is_cancel_requested(&self, id: Uuid) -> StoreResult<bool> {
        self.read(|state| state.job(id).map(|j| j.cancel_requested))?
    }

    /// Finish a running job: SUCCEEDED, or CANCELLED if a request arrived
    /// during the last stage.
    pub fn complete_job(&self, id: Uuid) -> StoreResult<JobStatus> {
        self.transaction(|state| {
            let job = state.job_mut(id)?;
            let next = if job.cancel_requested {
                JobStatus::Cancelled
            } else {
                JobStatus::Succeeded
            };
            transition(job, next)?;
            Ok(next)
        })
    }

    pub fn mark_cancelled(&self, id: Uuid) -> StoreResult<()> {
        self.transaction(|state| transition(state.job_mut(id)?, JobStatus::Cancelled))
    }

    pub fn fail_job(&self, id: Uuid, error: JobError) -> StoreResult<()> {
        self.transaction(|state| {
            let job = state.job_mut(id)?;
            transition(job, JobStatus::Failed)?;
            job.error = Some(error);
            Ok(())
        })
    }

    pub fn get_job(&self, id: Uuid) -> StoreResult<Job> {
        self.read(|state| state.job(id).cloned())?
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> StoreResult<Vec<Job>> {
        self.read(|state| {
            let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
            jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            jobs
        })
    }

    pub fn get_asset(&self, id: Uuid) -> StoreResult<Asset> {
        self.read(|state| {
            state
                .assets
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("Asset", id))
        })?
    }

    /// Fill in probe metadata; a value already recorded is kept.
    pub fn record_asset_audio(&self, id: Uuid, audio: AudioInfo) -> StoreResult<Asset> {
        self.transaction(|state| {
            let asset = state
                .assets
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("Asset", id))?;
            if asset.audio.is_none() {
                asset.audio = Some(audio);
            }
            Ok(asset.clone())
        })
    }

    /// Record where the archival copy lives; a path already recorded is kept.
    pub fn record_archival_path(&self, id: Uuid, path: PathBuf) -> StoreResult<Asset> {
        self.transaction(|state| {
            let asset = state
                .assets
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("Asset", id))?;
            if asset.archival_path.is_none() {
                asset.archival_path = Some(path);
            }
            Ok(asset.clone())
        })
    }

    /// Store a transcript and link it to its job.
    pub fn save_transcript(&self, transcript: Transcript) -> StoreResult<()> {
        self.transaction(|state| {
            let job = state.job_mut(transcript.job_id)?;
            job.transcript_id = Some(transcript.id);
            job.touch();
            state.transcripts.insert(transcript.id, transcript);
            Ok(())
        })
    }

    /// Set summary fields on a stored transcript.
    pub fn update_transcript(
        &self,
        id: Uuid,
        update: impl FnOnce(&mut Transcript),
    ) -> StoreResult<Transcript> {
        self.transaction(|state| {
            let transcript = state
                .transcripts
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("Transcript", id))?;
            update(transcript);
            Ok(transcript.clone())
        })
    }

    pub fn get_transcript(&self, id: Uuid) -> StoreResult<Transcript> {
        self.read(|state| {
            state
                .transcripts
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found("Transcript", id))
        })?
    }

    /// Transcript produced by a job, if any.
    pub fn transcript_for_job(&self, job_id: Uuid) -> StoreResult<Option<Transcript>> {
        self.read(|state| {
            let job = state.job(job_id)?;
            Ok(job
                .transcript_id
                .and_then(|id| state.transcripts.get(&id).cloned()))
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_links_job_and_asset() {
        let catalog = Catalog::in_memory();
        let job = catalog.enqueue_job("/uploads/a.wav", JobParams::default()).unwrap();

        let asset = catalog.get_asset(job.asset_id).unwrap();
        assert_eq!(asset.job_id, job.id);
        assert_eq!(asset.input_path, PathBuf::from("/uploads/a.wav"));
        assert_eq!(catalog.get_job(job.id).unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn claim_takes_oldest_first() {
        let catalog = Catalog::in_memory();
        let first = catalog.enqueue_job("a.wav", JobParams::default()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = catalog.enqueue_job("b.wav", JobParams::default()).unwrap();

        assert_eq!(catalog.claim_next_job().unwrap().unwrap().id, first.id);
        assert_eq!(catalog.claim_next_job().unwrap().unwrap().id, second.id);
        assert!(catalog.claim_next_job().unwrap().is_none());
    }

    #[test]
    fn cancel_while_queued_is_never_claimed() {
        let catalog = Catalog::in_memory();
        let job = catalog.enqueue_job("a.wav", JobParams::default()).unwrap();

        assert_eq!(
            catalog.request_cancel(job.id).unwrap(),
            CancelOutcome::CancelledWhileQueued
        );
        assert!(catalog.claim_next_job().unwrap().is_none());
        assert!(matches!(
            catalog.claim_job(job.id),
            Err(StoreError::InvalidTransition { .. })
        ));
        assert_eq!(catalog.get_job(job.id).unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn cancel_during_last_stage_wins_over_success() {
        let catalog = Catalog::in_memory();
        let job = catalog.enqueue_job("a.wav", JobParams::default()).unwrap();
        catalog.claim_job(job.id).unwrap();

        assert_eq!(catalog.request_cancel(job.id).unwrap(), CancelOutcome::Requested);
        assert_eq!(catalog.complete_job(job.id).unwrap(), JobStatus::Cancelled);
        assert_eq!(
            catalog.request_cancel(job.id).unwrap(),
            CancelOutcome::AlreadyTerminal(JobStatus::Cancelled)
        );
    }

    #[test]
    fn stage_completion_tracks_progress() {
        let catalog = Catalog::in_memory();
        let job = catalog.enqueue_job("a.wav", JobParams::default()).unwrap();
        catalog.claim_job(job.id).unwrap();

        catalog.record_stage_started(job.id, Stage::ExtractAudio).unwrap();
        let updated = catalog
            .record_stage_completed(job.id, Stage::ExtractAudio)
            .unwrap();
        assert_eq!(updated.completed_stages, vec![Stage::ExtractAudio]);
        assert_eq!(updated.progress, 5);
        assert_eq!(updated.current_stage, Some(Stage::ExtractAudio));
    }

    #[test]
    fn progress_rejected_after_terminal_state() {
        let catalog = Catalog::in_memory();
        let job = catalog.enqueue_job("a.wav", JobParams::default()).unwrap();
        catalog.claim_job(job.id).unwrap();
        catalog
            .fail_job(job.id, JobError::new(Some(Stage::Align), "boom"))
            .unwrap();

        assert!(catalog.record_stage_completed(job.id, Stage::Align).is_err());
        let failed = catalog.get_job(job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.unwrap().stage, Some(Stage::Align));
    }

    #[test]
    fn asset_metadata_is_write_once() {
        let catalog = Catalog::in_memory();
        let job = catalog.enqueue_job("a.wav", JobParams::default()).unwrap();
        let info = |duration_secs| AudioInfo {
            duration_secs,
            sample_rate: 44100,
            channels: 2,
            codec: "pcm_s16le".to_string(),
        };

        catalog.record_asset_audio(job.asset_id, info(10.0)).unwrap();
        let asset = catalog.record_asset_audio(job.asset_id, info(99.0)).unwrap();
        assert_eq!(asset.duration_secs(), Some(10.0));
    }

    #[test]
    fn list_is_newest_first() {
        let catalog = Catalog::in_memory();
        let first = catalog.enqueue_job("a.wav", JobParams::default()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = catalog.enqueue_job("b.wav", JobParams::default()).unwrap();

        let ids: Vec<Uuid> = catalog.list_jobs().unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
