//! Speaker identity across jobs: matching, merging and renaming.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{fake_adapters, FixedVoices, Harness};
use voicestack_core::models::JobParams;
use voicestack_core::orchestrator::ServiceError;
use voicestack_core::speakers::RegistryError;
use voicestack_core::stages::{StageAdapters, VoiceEmbedder};

fn adapters_with(voices: &Arc<FixedVoices>) -> StageAdapters {
    let embedder: Arc<dyn VoiceEmbedder> = voices.clone();
    let mut adapters = fake_adapters();
    adapters.embedder = embedder;
    adapters
}

/// cos = 0.5 against SPEAKER_00's voice, 0 against SPEAKER_01's.
fn near_first_voice() -> Vec<f32> {
    vec![0.5, 0.0, 0.75_f32.sqrt()]
}

#[test]
fn returning_voices_resolve_to_existing_speakers() {
    let h = Harness::new();
    let runner = h.runner(fake_adapters());
    let first = h.enqueue("first.wav", JobParams::default());
    let second = h.enqueue("second.wav", JobParams::default());

    assert!(runner.run_job(first).unwrap().succeeded());
    assert!(runner.run_job(second).unwrap().succeeded());

    let service = h.service();
    assert_eq!(service.speakers().unwrap().len(), 2);

    let ids = |job| -> HashSet<_> {
        service
            .transcript(job)
            .unwrap()
            .speaker_ids()
            .into_iter()
            .collect()
    };
    assert_eq!(ids(first), ids(second));

    for speaker in service.speakers().unwrap() {
        assert!((speaker.match_confidence.unwrap() - 1.0).abs() < 1e-5);
        assert_eq!(runner.registry().embeddings(speaker.id).unwrap().len(), 2);
    }
}

#[test]
fn similarity_above_threshold_matches() {
    let h = Harness::new();
    let voices = Arc::new(FixedVoices::orthogonal());
    let runner = h.runner(adapters_with(&voices));

    let first = h.enqueue("first.wav", JobParams::default());
    assert!(runner.run_job(first).unwrap().succeeded());

    voices.set("SPEAKER_00", near_first_voice());
    let second = h.enqueue("second.wav", JobParams::default());
    assert!(runner.run_job(second).unwrap().succeeded());

    let speakers = h.service().speakers().unwrap();
    assert_eq!(speakers.len(), 2);
    let matched = speakers
        .iter()
        .find(|s| s.last_label.as_deref() == Some("SPEAKER_00"))
        .unwrap();
    assert!((matched.match_confidence.unwrap() - 0.5).abs() < 1e-4);
}

#[test]
fn per_job_threshold_can_force_a_new_speaker() {
    let h = Harness::new();
    let voices = Arc::new(FixedVoices::orthogonal());
    let runner = h.runner(adapters_with(&voices));

    let first = h.enqueue("first.wav", JobParams::default());
    assert!(runner.run_job(first).unwrap().succeeded());

    voices.set("SPEAKER_00", near_first_voice());
    let second = h.enqueue(
        "second.wav",
        JobParams {
            similarity_threshold: Some(0.6),
            ..Default::default()
        },
    );
    assert!(runner.run_job(second).unwrap().succeeded());

    let speakers = h.service().speakers().unwrap();
    assert_eq!(speakers.len(), 3);
    assert_eq!(
        speakers
            .iter()
            .filter(|s| s.match_confidence.is_none())
            .count(),
        2
    );
}

#[test]
fn merge_moves_segments_and_is_not_repeatable() {
    let h = Harness::new();
    let runner = h.runner(fake_adapters());
    let job_id = h.enqueue("talk.wav", JobParams::default());
    let outcome = runner.run_job(job_id).unwrap();
    assert!(outcome.succeeded());

    let service = h.service();
    let transcript = service.transcript(job_id).unwrap();
    let ids = transcript.speaker_ids();
    assert_eq!(ids.len(), 2);
    let (source, target) = (ids[0], ids[1]);
    let source_segments = transcript
        .segments
        .iter()
        .filter(|s| s.speaker_id == Some(source))
        .count();

    let report = service.merge_speakers(source, target).unwrap();

    assert_eq!(report.segments_moved, source_segments);
    assert_eq!(report.embeddings_moved, 1);
    assert_eq!(report.affected_jobs, vec![job_id]);

    let merged = service.transcript(job_id).unwrap();
    assert!(merged.segments.iter().all(|s| s.speaker_id == Some(target)));
    let speakers = service.speakers().unwrap();
    assert_eq!(speakers.len(), 1);
    assert_eq!(speakers[0].id, target);
    assert_eq!(runner.registry().embeddings(target).unwrap().len(), 2);

    let log = std::fs::read_to_string(outcome.log_path.unwrap()).unwrap();
    assert!(log.contains("[AUDIT]"));
    assert!(log.contains(&source.to_string()));

    let again = service.merge_speakers(source, target).unwrap_err();
    assert!(matches!(
        again,
        ServiceError::Registry(RegistryError::SpeakerNotFound(id)) if id == source
    ));
    assert_eq!(service.transcript(job_id).unwrap(), merged);
}

#[test]
fn merged_speaker_is_matched_by_later_jobs() {
    let h = Harness::new();
    let runner = h.runner(fake_adapters());
    let first = h.enqueue("first.wav", JobParams::default());
    assert!(runner.run_job(first).unwrap().succeeded());

    let service = h.service();
    let ids = service.transcript(first).unwrap().speaker_ids();
    service.merge_speakers(ids[0], ids[1]).unwrap();

    let second = h.enqueue("second.wav", JobParams::default());
    assert!(runner.run_job(second).unwrap().succeeded());

    // Only the survivor's latest voice print is compared, so the merged-away
    // voice comes back as a new speaker.
    let speakers = service.speakers().unwrap();
    assert_eq!(speakers.len(), 2);
    assert!(speakers.iter().any(|s| s.id == ids[1]));
    assert!(!speakers.iter().any(|s| s.id == ids[0]));
}

#[test]
fn rename_shows_up_in_transcript_names() {
    let h = Harness::new();
    let runner = h.runner(fake_adapters());
    let job_id = h.enqueue("talk.wav", JobParams::default());
    assert!(runner.run_job(job_id).unwrap().succeeded());

    let service = h.service();
    let id = service.transcript(job_id).unwrap().speaker_ids()[0];

    let renamed = service.rename_speaker(id, Some("  Ada  "), true).unwrap();
    assert_eq!(renamed.display_name.as_deref(), Some("Ada"));
    assert!(renamed.trusted);
    assert_eq!(service.speakers().unwrap()[0].id, id);

    let cleared = service.rename_speaker(id, None, false).unwrap();
    assert!(cleared.display_name.is_none());
    assert!(!cleared.trusted);
}
