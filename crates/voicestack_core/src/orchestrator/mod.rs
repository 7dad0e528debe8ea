//! Pipeline orchestrator for coordinating job execution.
//!
//! Each job runs the same eleven steps in order. Every step validates its
//! input, executes, and validates what it recorded. The lock around the
//! accelerator-bound steps, cancellation at step boundaries and the failure
//! policy all live in [`Pipeline`].
//!
//! # Architecture
//!
//! ```text
//! Worker (N threads)
//!  └── JobRunner (one job: run log, context, terminal status)
//!       └── Pipeline
//!            ├── Step: ExtractAudio
//!            ├── Step: NormalizeAudio
//!            ├── ┌ lock ──────────────┐
//!            ├── │ Step: Transcribe   │
//!            ├── │ Step: Align        │
//!            ├── │ Step: Diarize      │
//!            ├── │ Step: ResolveSpeakers
//!            ├── └────────────────────┘
//!            ├── Step: AssembleSegments
//!            ├── Step: PersistTranscript
//!            ├── Step: ArchiveAudio
//!            ├── Step: Summarize (optional)
//!            └── Step: Finalize
//! ```
//!
//! # Example
//!
//! ```ignore
//! use voicestack_core::orchestrator::{JobRunner, Worker};
//!
//! let runner = JobRunner::from_settings(settings.clone(), catalog)?.with_settings_file(path);
//! let worker = Worker::from_settings(runner, &settings.pipeline);
//! worker.run_until_shutdown();
//! ```

mod errors;
mod pipeline;
mod runner;
mod service;
mod step;
pub mod steps;
mod types;
mod worker;

pub use errors::{PipelineError, PipelineResult, StageError, StageResult};
pub use pipeline::{CancelHandle, Pipeline, PipelineRunResult};
pub use runner::{JobOutcome, JobProgressObserver, JobRunner};
pub use service::{JobService, ServiceError, ServiceResult};
pub use step::PipelineStep;
pub use steps::{
    AlignStep, ArchiveAudioStep, AssembleSegmentsStep, DiarizeStep, ExtractAudioStep,
    FinalizeStep, NormalizeAudioStep, PersistTranscriptStep, ResolveSpeakersStep, SummarizeStep,
    TranscribeStep,
};
pub use types::{Context, JobState, ProgressCallback, ResolvedParams, StepOutcome};
pub use worker::Worker;
