//! Speaker identities and voice embeddings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A known voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    pub id: Uuid,
    /// User-editable display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Set when a human confirmed the identity.
    #[serde(default)]
    pub trusted: bool,
    /// Diarizer label from the most recent assignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_label: Option<String>,
    /// Similarity of the most recent automatic match.
    /// None means the speaker was created without matching anyone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_confidence: Option<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Speaker {
    /// Create an unnamed, untrusted speaker first seen under `label`.
    pub fn new(label: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            display_name: None,
            trusted: false,
            last_label: Some(label.into()),
            match_confidence: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name for display: the display name, else the last diarizer label.
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.last_label.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Voice print captured from one recording. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub id: Uuid,
    /// Owning speaker.
    pub speaker_id: Uuid,
    /// Fixed-dimensional voice vector.
    pub vector: Vec<f32>,
    /// Job the embedding was extracted in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Embedding {
    pub fn new(speaker_id: Uuid, vector: Vec<f32>, job_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker_id,
            vector,
            job_id,
            created_at: Utc::now(),
        }
    }
}
