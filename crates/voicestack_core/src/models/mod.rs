//! Data models for VoiceStack.
//!
//! This module contains the durable records shared by the pipeline, the
//! job store and the speaker registry:
//! - Enums for job status, pipeline stages and tag sources
//! - Jobs (status, progress, per-job parameters, error summary)
//! - Media assets
//! - Transcripts, segments and word timings
//! - Speakers and their voice embeddings

mod enums;
mod jobs;
mod media;
mod speakers;
mod transcript;

pub use enums::{JobStatus, Stage, TagSource};
pub use jobs::{Job, JobError, JobParams};
pub use media::{Asset, AudioInfo};
pub use speakers::{Embedding, Speaker};
pub use transcript::{Segment, Tag, Transcript, WordTiming};
