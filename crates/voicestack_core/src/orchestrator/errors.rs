//! Job and stage errors.
//!
//! A [`StageError`] says what an adapter or step hit; [`PipelineError`]
//! pins it to the job and stage where it happened.

use std::io;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::lease::LeaseError;
use crate::models::Stage;
use crate::speakers::RegistryError;
use crate::store::StoreError;

/// Why a job stopped short of `Succeeded`.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A critical stage failed.
    #[error("Job {job_id} failed at stage '{stage}': {source}")]
    StageFailed {
        job_id: Uuid,
        stage: Stage,
        #[source]
        source: StageError,
    },

    /// Pipeline stopped at a stage boundary on request.
    #[error("Job {job_id} was cancelled")]
    Cancelled { job_id: Uuid },

    /// The job could not be prepared before its first stage.
    #[error("Job {job_id} setup failed: {message}")]
    SetupFailed { job_id: Uuid, message: String },

    /// Catalog access failed outside any stage.
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    pub fn stage_failed(job_id: Uuid, stage: Stage, source: StageError) -> Self {
        Self::StageFailed {
            job_id,
            stage,
            source,
        }
    }

    pub fn setup_failed(job_id: Uuid, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            job_id,
            message: message.into(),
        }
    }

    pub fn cancelled(job_id: Uuid) -> Self {
        Self::Cancelled { job_id }
    }

    /// Stage the error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Error from a stage or stage adapter.
#[derive(Error, Debug)]
pub enum StageError {
    /// A step found nothing usable from earlier stages.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// A step finished but left an unusable result.
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// An external command exited unsuccessfully.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// An external command was not found.
    #[error("{tool} is not installed or not on PATH")]
    ToolMissing { tool: String },

    /// An external command ran past its time limit.
    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    /// Filesystem error while doing `operation`.
    #[error("I/O error in {operation}: {source}")]
    IoError {
        operation: String,
        #[source]
        source: io::Error,
    },

    /// A required file was not found.
    #[error("Required file not found: {path}")]
    FileNotFound { path: String },

    /// Tool output could not be decoded.
    #[error("Failed to parse {what}: {message}")]
    ParseError { what: String, message: String },

    /// An adapter produced nothing for non-empty input.
    #[error("{0} returned empty output")]
    EmptyOutput(String),

    /// Every ASR engine failed.
    #[error("All ASR engines failed: {0}")]
    AsrExhausted(String),

    /// The accelerator lock could not be acquired.
    #[error("Accelerator lock unavailable: {0}")]
    LockUnavailable(#[from] LeaseError),

    /// Speaker registry failure.
    #[error("Speaker registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Job store failure.
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    /// A precondition was not met.
    #[error("Precondition not met: {0}")]
    PreconditionFailed(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl StageError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    pub fn command_failed(
        tool: impl Into<String>,
        exit_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    pub fn tool_missing(tool: impl Into<String>) -> Self {
        Self::ToolMissing { tool: tool.into() }
    }

    pub fn timeout(tool: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            tool: tool.into(),
            after,
        }
    }

    pub fn io_error(operation: impl Into<String>, source: io::Error) -> Self {
        Self::IoError {
            operation: operation.into(),
            source,
        }
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn parse_error(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn empty_output(what: impl Into<String>) -> Self {
        Self::EmptyOutput(what.into())
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Result of a step or adapter call.
pub type StageResult<T> = Result<T, StageError>;

/// Result of running a job.
pub type PipelineResult<T> = Result<T, PipelineError>;
