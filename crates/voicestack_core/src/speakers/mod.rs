//! Speaker identity resolution.
//!
//! New voice embeddings are matched against the most recent embedding of
//! every known speaker by cosine similarity. Speakers can be merged and
//! renamed by users; both run as catalog transactions.

mod registry;
mod similarity;

pub use registry::{MergeReport, Resolution, SpeakerRegistry};
pub use similarity::{cosine_similarity, select_match, MatchCandidate};

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Default minimum similarity for assigning an existing speaker.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.30;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Speaker {0} not found")]
    SpeakerNotFound(Uuid),

    #[error("Cannot merge speaker {0} with itself")]
    MergeWithSelf(Uuid),

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
