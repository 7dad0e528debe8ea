//! Persistent speaker registry: resolve, merge, rename.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::similarity::{cosine_similarity, select_match, MatchCandidate};
use super::{RegistryError, RegistryResult};
use crate::logging::append_audit;
use crate::models::{Embedding, Speaker};
use crate::store::{Catalog, CatalogState};

/// Identity decision for one diarized speaker cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// Diarizer label of the cluster.
    pub label: String,
    pub speaker_id: Uuid,
    /// Similarity to the matched speaker; None for a new speaker.
    pub similarity: Option<f32>,
    /// Whether a new speaker was created.
    pub created: bool,
}

/// What a merge changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub source: Uuid,
    pub target: Uuid,
    pub segments_moved: usize,
    pub embeddings_moved: usize,
    /// Jobs whose transcripts or embeddings referenced the source.
    pub affected_jobs: Vec<Uuid>,
}

/// Registry of known speakers and their embeddings.
///
/// Every operation is one catalog transaction, so resolution, merge and
/// rename never interleave on the same speaker, even across processes.
#[derive(Clone)]
pub struct SpeakerRegistry {
    catalog: Arc<Catalog>,
}

impl SpeakerRegistry {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Match `vector` against the latest embedding of every speaker.
    ///
    /// A match at or above `threshold` assigns the cluster to that speaker
    /// and records the similarity as its confidence; otherwise a new
    /// unnamed speaker is created with no confidence. The embedding is
    /// stored under the chosen speaker either way.
    pub fn resolve(
        &self,
        job_id: Uuid,
        label: &str,
        vector: Vec<f32>,
        threshold: f32,
    ) -> RegistryResult<Resolution> {
        if vector.is_empty() || vector.iter().any(|v| !v.is_finite()) {
            return Err(RegistryError::InvalidEmbedding(format!(
                "embedding for {} is empty or non-finite",
                label
            )));
        }

        let resolution = self
            .catalog
            .try_transaction(|state| -> RegistryResult<Resolution> {
                let candidates = score_speakers(state, &vector);
                let now = Utc::now();

                let resolution = match select_match(&candidates, threshold) {
                    Some(best) => {
                        let speaker = state
                            .speakers
                            .get_mut(&best.speaker_id)
                            .ok_or(RegistryError::SpeakerNotFound(best.speaker_id))?;
                        speaker.last_label = Some(label.to_string());
                        speaker.match_confidence = Some(best.similarity);
                        speaker.updated_at = now;
                        Resolution {
                            label: label.to_string(),
                            speaker_id: best.speaker_id,
                            similarity: Some(best.similarity),
                            created: false,
                        }
                    }
                    None => {
                        let speaker = Speaker::new(label);
                        let id = speaker.id;
                        state.speakers.insert(id, speaker);
                        Resolution {
                            label: label.to_string(),
                            speaker_id: id,
                            similarity: None,
                            created: true,
                        }
                    }
                };

                state
                    .embeddings
                    .push(Embedding::new(resolution.speaker_id, vector, Some(job_id)));
                Ok(resolution)
            })?;

        tracing::info!(
            job_id = %job_id,
            label,
            speaker_id = %resolution.speaker_id,
            similarity = ?resolution.similarity,
            created = resolution.created,
            "Resolved speaker"
        );
        Ok(resolution)
    }

    /// Fold `source` into `target`.
    ///
    /// Segments and embeddings move to the target and the source is deleted,
    /// all in one transaction. Each affected job's run log gets an audit
    /// line. Merging a speaker that no longer exists fails without changes.
    pub fn merge(&self, source: Uuid, target: Uuid) -> RegistryResult<MergeReport> {
        if source == target {
            return Err(RegistryError::MergeWithSelf(source));
        }

        let (report, log_paths) = self.catalog.try_transaction(|state| -> RegistryResult<_> {
            if !state.speakers.contains_key(&source) {
                return Err(RegistryError::SpeakerNotFound(source));
            }
            if !state.speakers.contains_key(&target) {
                return Err(RegistryError::SpeakerNotFound(target));
            }

            let mut affected = BTreeSet::new();
            let mut segments_moved = 0;
            for transcript in state.transcripts.values_mut() {
                for segment in &mut transcript.segments {
                    if segment.speaker_id == Some(source) {
                        segment.speaker_id = Some(target);
                        segments_moved += 1;
                        affected.insert(transcript.job_id);
                    }
                }
            }

            let mut embeddings_moved = 0;
            for embedding in &mut state.embeddings {
                if embedding.speaker_id == source {
                    embedding.speaker_id = target;
                    embeddings_moved += 1;
                    if let Some(job_id) = embedding.job_id {
                        affected.insert(job_id);
                    }
                }
            }

            state.speakers.remove(&source);
            if let Some(speaker) = state.speakers.get_mut(&target) {
                speaker.updated_at = Utc::now();
            }

            let log_paths: Vec<_> = affected
                .iter()
                .filter_map(|id| {
                    state
                        .jobs
                        .get(id)
                        .and_then(|job| job.log_path.clone().map(|path| (*id, path)))
                })
                .collect();

            Ok((
                MergeReport {
                    source,
                    target,
                    segments_moved,
                    embeddings_moved,
                    affected_jobs: affected.into_iter().collect(),
                },
                log_paths,
            ))
        })?;

        let message = format!(
            "Merged speaker {} into {} ({} segments, {} embeddings)",
            source, target, report.segments_moved, report.embeddings_moved
        );
        for (job_id, path) in log_paths {
            if let Err(e) = append_audit(job_id, &path, &message) {
                tracing::warn!(job_id = %job_id, error = %e, "Could not append merge audit entry");
            }
        }
        tracing::info!(%source, %target, segments = report.segments_moved, "{}", message);
        Ok(report)
    }

    /// Set display name and trusted flag. Blank names clear the name.
    pub fn rename(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        trusted: bool,
    ) -> RegistryResult<Speaker> {
        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        self.catalog.try_transaction(|state| -> RegistryResult<Speaker> {
            let speaker = state
                .speakers
                .get_mut(&id)
                .ok_or(RegistryError::SpeakerNotFound(id))?;
            speaker.display_name = display_name;
            speaker.trusted = trusted;
            speaker.updated_at = Utc::now();
            Ok(speaker.clone())
        })
    }

    pub fn get(&self, id: Uuid) -> RegistryResult<Speaker> {
        self.catalog
            .read(|state| state.speakers.get(&id).cloned())?
            .ok_or(RegistryError::SpeakerNotFound(id))
    }

    /// All speakers, named ones first by name, then by label.
    pub fn list(&self) -> RegistryResult<Vec<Speaker>> {
        let mut speakers = self
            .catalog
            .read(|state| state.speakers.values().cloned().collect::<Vec<_>>())?;
        speakers.sort_by(|a, b| {
            a.display_name
                .is_none()
                .cmp(&b.display_name.is_none())
                .then_with(|| a.label().cmp(&b.label()))
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(speakers)
    }

    /// Embeddings owned by `id`, oldest first.
    pub fn embeddings(&self, id: Uuid) -> RegistryResult<Vec<Embedding>> {
        Ok(self.catalog.read(|state| {
            state
                .embeddings
                .iter()
                .filter(|e| e.speaker_id == id)
                .cloned()
                .collect()
        })?)
    }
}

fn score_speakers(state: &CatalogState, vector: &[f32]) -> Vec<MatchCandidate> {
    state
        .speakers
        .values()
        .filter_map(|speaker| {
            let latest = state.latest_embedding(speaker.id)?;
            let similarity = cosine_similarity(vector, &latest.vector)?;
            Some(MatchCandidate {
                speaker_id: speaker.id,
                similarity,
                updated_at: speaker.updated_at,
            })
        })
        .collect()
}
