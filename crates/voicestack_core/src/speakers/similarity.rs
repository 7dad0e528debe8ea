//! Vector similarity and match selection.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Cosine similarity of two vectors.
///
/// None when dimensions differ, a vector is empty, or a norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    Some(similarity.clamp(-1.0, 1.0) as f32)
}

/// An existing speaker scored against a new embedding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchCandidate {
    pub speaker_id: Uuid,
    pub similarity: f32,
    pub updated_at: DateTime<Utc>,
}

/// Pick the speaker a new embedding belongs to.
///
/// Only candidates at or above `threshold` qualify. Among those the highest
/// similarity wins, then the most recently updated speaker, then the lowest
/// id.
pub fn select_match(candidates: &[MatchCandidate], threshold: f32) -> Option<MatchCandidate> {
    candidates
        .iter()
        .filter(|c| c.similarity >= threshold)
        .max_by(|a, b| {
            a.similarity
                .total_cmp(&b.similarity)
                .then(a.updated_at.cmp(&b.updated_at))
                .then(b.speaker_id.cmp(&a.speaker_id))
        })
        .copied()
}
