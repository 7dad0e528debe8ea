//! Media asset structures.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stream properties reported by the audio probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Codec name (e.g. `pcm_s16le`, `aac`).
    #[serde(default)]
    pub codec: String,
}

/// Uploaded media asset.
///
/// Created at intake. The probe metadata and the archival path are
/// write-once: each is filled by its stage the first time and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    /// Job the asset was uploaded with.
    pub job_id: Uuid,
    /// Original uploaded file.
    pub input_path: PathBuf,
    /// Archival copy, once encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archival_path: Option<PathBuf>,
    /// Probe metadata of the input, once probed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioInfo>,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Create an asset for an uploaded file.
    pub fn new(job_id: Uuid, input_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            input_path: input_path.into(),
            archival_path: None,
            audio: None,
            created_at: Utc::now(),
        }
    }

    /// Duration in seconds, if probed.
    pub fn duration_secs(&self) -> Option<f64> {
        self.audio.as_ref().map(|a| a.duration_secs)
    }
}
