//! External job and speaker facade.
//!
//! What an upload/API layer calls: enqueue, cancel, status, listings,
//! transcripts and the user-initiated speaker operations. Nothing here
//! reaches into a running pipeline; callers only see catalog records.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, JobParams, Speaker, Transcript};
use crate::speakers::{MergeReport, RegistryError, SpeakerRegistry};
use crate::store::{CancelOutcome, Catalog, StoreError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Input file not found: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("Similarity threshold must be between -1 and 1, got {0}")]
    InvalidThreshold(f32),

    #[error("No transcript for job {0}")]
    NoTranscript(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Entry point for callers outside the pipeline.
#[derive(Clone)]
pub struct JobService {
    catalog: Arc<Catalog>,
    registry: SpeakerRegistry,
}

impl JobService {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let registry = SpeakerRegistry::new(Arc::clone(&catalog));
        Self { catalog, registry }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Queue a job for an uploaded file.
    pub fn enqueue(&self, input: &Path, params: JobParams) -> ServiceResult<Job> {
        if !input.is_file() {
            return Err(ServiceError::InputMissing(input.to_path_buf()));
        }
        if let Some(threshold) = params.similarity_threshold {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(ServiceError::InvalidThreshold(threshold));
            }
        }
        let input = input.canonicalize().unwrap_or_else(|_| input.to_path_buf());
        Ok(self.catalog.enqueue_job(input, params)?)
    }

    /// Cancel a queued job, or flag a running one to stop at the next stage.
    pub fn cancel(&self, job_id: Uuid) -> ServiceResult<CancelOutcome> {
        Ok(self.catalog.request_cancel(job_id)?)
    }

    pub fn status(&self, job_id: Uuid) -> ServiceResult<Job> {
        Ok(self.catalog.get_job(job_id)?)
    }

    /// All jobs, newest first.
    pub fn list(&self) -> ServiceResult<Vec<Job>> {
        Ok(self.catalog.list_jobs()?)
    }

    pub fn transcript(&self, job_id: Uuid) -> ServiceResult<Transcript> {
        self.catalog
            .transcript_for_job(job_id)?
            .ok_or(ServiceError::NoTranscript(job_id))
    }

    /// Speakers, named ones first.
    pub fn speakers(&self) -> ServiceResult<Vec<Speaker>> {
        Ok(self.registry.list()?)
    }

    pub fn merge_speakers(&self, source: Uuid, target: Uuid) -> ServiceResult<MergeReport> {
        Ok(self.registry.merge(source, target)?)
    }

    pub fn rename_speaker(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        trusted: bool,
    ) -> ServiceResult<Speaker> {
        Ok(self.registry.rename(id, display_name, trusted)?)
    }
}
