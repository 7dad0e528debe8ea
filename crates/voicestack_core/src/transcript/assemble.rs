//! Merge word timings, speaker turns and resolved identities into segments.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{Segment, WordTiming};
use crate::orchestrator::{StageError, StageResult};
use crate::stages::{AlignmentOutput, AsrOutput, DiarizationOutput, SpeakerTurn};

/// Label of the first turn containing `t`.
pub fn label_at(turns: &[SpeakerTurn], t: f64) -> Option<&str> {
    turns
        .iter()
        .find(|turn| turn.contains(t))
        .map(|turn| turn.label.as_str())
}

/// Most frequent label; ties go to the label heard first.
fn majority_label<'a>(labels: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for label in labels {
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => counts.push((label, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label)
}

/// Turn overlapping `[start, end)` the most, else the turn nearest its middle.
fn fallback_label(turns: &[SpeakerTurn], start: f64, end: f64) -> Option<&str> {
    let widest = turns
        .iter()
        .map(|t| (t, t.overlap(start, end)))
        .filter(|(_, overlap)| *overlap > 0.0)
        .fold(None::<(&SpeakerTurn, f64)>, |best, (t, overlap)| match best {
            Some((_, o)) if o >= overlap => best,
            _ => Some((t, overlap)),
        });
    if let Some((turn, _)) = widest {
        return Some(turn.label.as_str());
    }

    let middle = (start + end) / 2.0;
    turns
        .iter()
        .fold(None::<(&SpeakerTurn, f64)>, |best, t| {
            let distance = t.distance_to(middle);
            match best {
                Some((_, d)) if d <= distance => best,
                _ => Some((t, distance)),
            }
        })
        .map(|(t, _)| t.label.as_str())
}

/// Build the final, speaker-attributed segment list.
///
/// Each word takes the label of the turn containing its midpoint; each
/// segment takes the majority label of its words (falling back to the
/// widest-overlapping, then nearest turn). Segments come out ordered by
/// start time with no overlap. Every label must have a resolved speaker.
pub fn assemble_segments(
    asr: &AsrOutput,
    alignment: &AlignmentOutput,
    diarization: &DiarizationOutput,
    speakers: &HashMap<String, Uuid>,
) -> StageResult<Vec<Segment>> {
    let turns = &diarization.turns;
    let mut segments = Vec::with_capacity(asr.segments.len());

    for (index, asr_segment) in asr.segments.iter().enumerate() {
        let words: Vec<WordTiming> = alignment
            .words
            .iter()
            .filter(|w| w.segment_index == index)
            .map(|w| {
                let mut timing = w.to_timing();
                timing.speaker_label = label_at(turns, w.midpoint()).map(str::to_string);
                timing
            })
            .collect();

        let text = asr_segment.text.trim();
        if text.is_empty() && words.is_empty() {
            continue;
        }

        let label = majority_label(words.iter().filter_map(|w| w.speaker_label.as_deref()))
            .or_else(|| fallback_label(turns, asr_segment.start, asr_segment.end))
            .ok_or_else(|| {
                StageError::precondition_failed(format!(
                    "no speaker turn for segment at {:.2}s",
                    asr_segment.start
                ))
            })?
            .to_string();

        let speaker_id = *speakers.get(&label).ok_or_else(|| {
            StageError::precondition_failed(format!("no resolved speaker for label {}", label))
        })?;

        segments.push(Segment {
            id: Uuid::new_v4(),
            start: asr_segment.start,
            end: asr_segment.end.max(asr_segment.start),
            text: text.to_string(),
            words,
            speaker_id: Some(speaker_id),
            speaker_label: Some(label),
        });
    }

    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    enforce_no_overlap(&mut segments);
    Ok(segments)
}

/// Trim each segment so it starts no earlier than the previous one ends.
fn enforce_no_overlap(segments: &mut [Segment]) {
    let mut previous_end = f64::NEG_INFINITY;
    for segment in segments.iter_mut() {
        if segment.start < previous_end {
            segment.start = previous_end;
        }
        if segment.end < segment.start {
            segment.end = segment.start;
        }
        for word in &mut segment.words {
            word.start = word.start.clamp(segment.start, segment.end);
            word.end = word.end.clamp(word.start, segment.end);
        }
        previous_end = segment.end;
    }
}
