//! Durable catalog of jobs, assets, transcripts and the speaker registry.
//!
//! The catalog is one JSON document. Every mutation goes through
//! [`Catalog::transaction`], which reloads the document, applies the change to
//! a copy and atomically replaces the file, so a failed change is never
//! observable. File-backed catalogs also hold a lease while writing so
//! separate worker processes serialize their read-modify-write cycles.

mod catalog;
mod jobs;
mod layout;

pub use catalog::{Catalog, CatalogState};
pub use jobs::CancelOutcome;
pub use layout::{artifact_names, ArtifactLayout};

use thiserror::Error;
use uuid::Uuid;

use crate::lease::LeaseError;
use crate::models::JobStatus;

/// Errors from catalog operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Catalog I/O failed during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog document is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Catalog lock unavailable: {0}")]
    Lease(#[from] LeaseError),

    #[error("Catalog conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
