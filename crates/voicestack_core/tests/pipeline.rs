//! End-to-end job runs over fake stage adapters.

mod common;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use common::{
    fake_adapters, BrokenSummary, BrokenTranscriber, CancellingDiarizer, CannedSummary, Harness,
    TwoSpeakers, DURATION,
};
use voicestack_core::config::{AsrEngineSettings, ConfigManager, Settings};
use voicestack_core::lease::{FileLeaseStore, LeaseStore, LockOptions};
use voicestack_core::models::{JobParams, JobStatus, Stage, TagSource};
use voicestack_core::orchestrator::{JobRunner, Worker};
use voicestack_core::process::ToolRunner;
use voicestack_core::stages::{AdapterFactory, AsrChain, StubTranscriber, Transcriber};
use voicestack_core::store::{artifact_names, CancelOutcome};

#[test]
fn job_runs_every_stage_in_order() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let runner = h
        .runner(fake_adapters())
        .with_progress_observer(Arc::new(move |_: Uuid, stage: Stage, progress: u8| {
            sink.lock().push((stage, progress));
        }));

    let outcome = runner.run_next().unwrap().unwrap();

    assert_eq!(outcome.job_id, job_id);
    assert!(outcome.succeeded(), "job failed: {:?}", outcome.error);
    assert_eq!(outcome.completed, Stage::ALL.to_vec());
    assert!(outcome.skipped.is_empty());
    assert_eq!(outcome.asr_engine.as_deref(), Some("stub"));

    let seen = seen.lock();
    let stages: Vec<Stage> = seen.iter().map(|(s, _)| *s).collect();
    assert_eq!(stages, Stage::ALL.to_vec());
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(seen.last().map(|(_, p)| *p), Some(100));

    let job = h.service().status(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.progress, 100);
    assert_eq!(job.completed_stages, Stage::ALL.to_vec());
    assert!(job.error.is_none());
}

#[test]
fn transcript_covers_the_audio_with_two_speakers() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());

    let outcome = h.runner(fake_adapters()).run_job(job_id).unwrap();
    assert!(outcome.succeeded(), "job failed: {:?}", outcome.error);

    let transcript = h.service().transcript(job_id).unwrap();
    assert_eq!(Some(transcript.id), outcome.transcript_id);
    assert_eq!(transcript.language.as_deref(), Some("en"));
    assert!(!transcript.raw_text.is_empty());

    let segments = &transcript.segments;
    assert!(!segments.is_empty());
    assert!(segments.iter().all(|s| s.speaker_id.is_some()));
    assert!(segments.windows(2).all(|w| w[0].end <= w[1].start));
    assert!(segments[0].start.abs() < 1e-6);
    assert!((segments[segments.len() - 1].end - DURATION).abs() < 1e-6);

    assert_eq!(transcript.speaker_ids().len(), 2);
    assert_eq!(h.service().speakers().unwrap().len(), 2);
}

#[test]
fn run_log_and_artifacts_are_written() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());

    let outcome = h.runner(fake_adapters()).run_job(job_id).unwrap();
    assert!(outcome.succeeded(), "job failed: {:?}", outcome.error);

    let log_path = outcome.log_path.unwrap();
    let log = std::fs::read_to_string(&log_path).unwrap();
    for stage in Stage::ALL {
        assert!(
            log.contains(&format!("=== {} ===", stage.as_str())),
            "missing header for {}",
            stage
        );
        assert!(log.contains(&format!("[DONE] {}", stage.as_str())));
    }
    assert!(!log.contains("[ERROR]"));

    let job_dir = log_path.parent().unwrap();
    for name in [
        artifact_names::ASR_SEGMENTS,
        artifact_names::ALIGNED_WORDS,
        artifact_names::DIARIZATION,
        artifact_names::SPEAKERS,
        artifact_names::TRANSCRIPT_JSON,
        artifact_names::TRANSCRIPT_TXT,
        artifact_names::TRANSCRIPT_SRT,
        artifact_names::TRANSCRIPT_VTT,
    ] {
        assert!(job_dir.join(name).is_file(), "missing artifact {}", name);
    }
}

#[test]
fn asr_falls_back_to_the_next_engine() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());
    let mut adapters = fake_adapters();
    let engines: Vec<Arc<dyn Transcriber>> = vec![
        Arc::new(BrokenTranscriber("whisperx")),
        Arc::new(StubTranscriber::new("stub")),
    ];
    adapters.asr = AsrChain::new(engines);

    let outcome = h.runner(adapters).run_job(job_id).unwrap();

    assert!(outcome.succeeded(), "job failed: {:?}", outcome.error);
    assert_eq!(outcome.asr_engine.as_deref(), Some("stub"));
    assert_eq!(
        h.service().status(job_id).unwrap().asr_engine.as_deref(),
        Some("stub")
    );
    let log = std::fs::read_to_string(outcome.log_path.unwrap()).unwrap();
    assert!(log.contains("whisperx is not installed"));
}

#[test]
fn exhausted_asr_chain_fails_the_job_at_transcribe() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());
    let mut adapters = fake_adapters();
    let engines: Vec<Arc<dyn Transcriber>> = vec![
        Arc::new(BrokenTranscriber("whisperx")),
        Arc::new(BrokenTranscriber("faster-whisper")),
    ];
    adapters.asr = AsrChain::new(engines);

    let outcome = h.runner(adapters).run_job(job_id).unwrap();

    assert_eq!(outcome.status, JobStatus::Failed);
    let error = outcome.error.unwrap();
    assert_eq!(error.stage, Some(Stage::Transcribe));
    assert!(error.message.contains("whisperx"));
    assert!(error.message.contains("faster-whisper"));
    assert!(outcome.transcript_id.is_none());
    assert_eq!(
        outcome.completed,
        vec![Stage::ExtractAudio, Stage::NormalizeAudio]
    );

    // The failed job must not keep the accelerator.
    assert!(h.leases.current("accelerator").unwrap().is_none());
    let holds = h.lock_log.holds();
    assert_eq!(holds.len(), 1);
    assert!(holds[0].released.is_some());
}

#[test]
fn summary_is_attached_to_the_transcript() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());
    let mut adapters = fake_adapters();
    adapters.summarizer = Some(Arc::new(CannedSummary));

    let outcome = h.runner(adapters).run_job(job_id).unwrap();
    assert!(outcome.succeeded(), "job failed: {:?}", outcome.error);

    let transcript = h.service().transcript(job_id).unwrap();
    assert_eq!(transcript.title.as_deref(), Some("Weekly sync"));
    assert!(transcript.summary.is_some());
    let tags: Vec<&str> = transcript.tags.iter().map(|t| t.tag.as_str()).collect();
    assert_eq!(tags, vec!["meeting", "planning"]);
    assert!(transcript.tags.iter().all(|t| t.source == TagSource::Llm));
    assert!(outcome
        .log_path
        .unwrap()
        .parent()
        .unwrap()
        .join(artifact_names::SUMMARY)
        .is_file());
}

#[test]
fn failed_summary_does_not_fail_the_job() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());
    let mut adapters = fake_adapters();
    adapters.summarizer = Some(Arc::new(BrokenSummary));

    let outcome = h.runner(adapters).run_job(job_id).unwrap();

    assert_eq!(outcome.status, JobStatus::Succeeded);
    assert_eq!(outcome.skipped, vec![Stage::Summarize]);
    assert!(!outcome.completed.contains(&Stage::Summarize));
    assert!(outcome.completed.contains(&Stage::Finalize));
    let transcript = h.service().transcript(job_id).unwrap();
    assert!(transcript.title.is_none());
}

#[test]
fn summary_can_be_turned_off_per_job() {
    let h = Harness::new();
    let job_id = h.enqueue(
        "talk.wav",
        JobParams {
            summarize: Some(false),
            ..Default::default()
        },
    );
    let mut adapters = fake_adapters();
    adapters.summarizer = Some(Arc::new(CannedSummary));

    let outcome = h.runner(adapters).run_job(job_id).unwrap();

    assert!(outcome.succeeded());
    assert!(h.service().transcript(job_id).unwrap().title.is_none());
}

#[test]
fn cancel_while_queued_never_runs() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());

    assert_eq!(
        h.service().cancel(job_id).unwrap(),
        CancelOutcome::CancelledWhileQueued
    );
    assert!(h.runner(fake_adapters()).run_next().unwrap().is_none());

    let job = h.service().status(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.completed_stages.is_empty());
    assert!(job.log_path.is_none());
}

#[test]
fn cancel_while_running_stops_after_the_current_stage() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());
    let mut adapters = fake_adapters();
    adapters.diarizer = Arc::new(CancellingDiarizer {
        catalog: Arc::clone(&h.catalog),
    });

    let outcome = h.runner(adapters).run_job(job_id).unwrap();

    assert_eq!(outcome.status, JobStatus::Cancelled);
    assert!(outcome.error.is_none());
    assert!(outcome.transcript_id.is_none());

    let job = h.service().status(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.completed_stages.last(), Some(&Stage::Diarize));
    assert!(!job.completed_stages.contains(&Stage::ResolveSpeakers));
    assert!(h.service().speakers().unwrap().is_empty());
    assert!(h.leases.current("accelerator").unwrap().is_none());

    // Cancelling again is a no-op on a terminal job.
    assert_eq!(
        h.service().cancel(job_id).unwrap(),
        CancelOutcome::AlreadyTerminal(JobStatus::Cancelled)
    );
}

#[test]
fn accelerator_stages_never_overlap_across_jobs() {
    let h = Harness::new();
    let ids: Vec<_> = (0..4)
        .map(|i| h.enqueue(&format!("talk-{}.wav", i), JobParams::default()))
        .collect();
    let mut adapters = fake_adapters();
    adapters.diarizer = Arc::new(TwoSpeakers::slow(Duration::from_millis(40)));

    let worker = Worker::new(h.runner(adapters), 3, Duration::from_millis(10));
    let outcomes = worker.drain();

    assert_eq!(outcomes.len(), ids.len());
    assert!(outcomes.iter().all(|o| o.succeeded()));

    // One hold per job, and each hold ends before the next begins.
    let mut holds = h.lock_log.holds();
    assert_eq!(holds.len(), ids.len());
    holds.sort_by_key(|hold| hold.acquired);
    for pair in holds.windows(2) {
        let released = pair[0].released.expect("hold was never released");
        assert!(
            released <= pair[1].acquired,
            "{} acquired while {} still held the lock",
            pair[1].holder,
            pair[0].holder
        );
    }
    assert!(h.leases.current("accelerator").unwrap().is_none());
}

#[test]
fn lock_timeout_fails_the_job_at_transcribe() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());
    h.leases
        .try_acquire("accelerator", "other-worker", Duration::from_secs(60))
        .unwrap()
        .unwrap();

    let runner = h.runner_with_lock(
        fake_adapters(),
        LockOptions {
            acquire_timeout: Duration::from_millis(50),
            lease_duration: Duration::from_secs(60),
            poll_interval: Duration::from_millis(5),
        },
    );
    let outcome = runner.run_job(job_id).unwrap();

    assert_eq!(outcome.status, JobStatus::Failed);
    let error = outcome.error.unwrap();
    assert_eq!(error.stage, Some(Stage::Transcribe));
    assert!(error.message.contains("other-worker"));
    assert_eq!(
        h.leases.current("accelerator").unwrap().unwrap().holder,
        "other-worker"
    );
}

#[test]
fn missing_upload_fails_at_extract_audio() {
    let h = Harness::new();
    let job_id = h.enqueue("talk.wav", JobParams::default());
    let asset = h.catalog.get_asset(h.service().status(job_id).unwrap().asset_id);
    std::fs::remove_file(asset.unwrap().input_path).unwrap();

    let outcome = h.runner(fake_adapters()).run_job(job_id).unwrap();

    assert_eq!(outcome.status, JobStatus::Failed);
    assert_eq!(outcome.error.unwrap().stage, Some(Stage::ExtractAudio));
    assert!(outcome.completed.is_empty());
    assert!(h.lock_log.holds().is_empty());
}

#[test]
fn catalog_survives_reopening() {
    let h = Harness::durable();
    let job_id = h.enqueue("talk.wav", JobParams::default());
    let outcome = h.runner(fake_adapters()).run_job(job_id).unwrap();
    assert!(outcome.succeeded(), "job failed: {:?}", outcome.error);

    let reopened = voicestack_core::store::Catalog::open(
        h.settings.paths.catalog_path(),
        &h.settings.paths.leases_dir(),
    )
    .unwrap();
    let job = reopened.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    let transcript = reopened.transcript_for_job(job_id).unwrap().unwrap();
    assert_eq!(Some(transcript.id), job.transcript_id);
}

#[test]
fn settings_file_edits_apply_to_the_next_job() {
    let h = Harness::new();
    let mut startup = h.settings.clone();
    startup.asr.engines = vec![AsrEngineSettings::stub("first")];
    startup.pipeline.lock_timeout_secs = 1;
    startup.pipeline.lock_poll_ms = 10;

    let config_path = h.dir.path().join("voicestack.toml");
    let mut config = ConfigManager::new(&config_path);
    *config.settings_mut() = startup.clone();
    config.save().unwrap();

    // Real ASR chain from the job's settings, fakes for everything else.
    let factory: AdapterFactory = Arc::new(|settings: &Settings, tools: &ToolRunner| {
        let mut adapters = fake_adapters();
        adapters.asr = AsrChain::from_settings(&settings.asr.engines, tools);
        adapters
    });
    let runner = JobRunner::from_settings(startup, Arc::clone(&h.catalog))
        .unwrap()
        .with_settings_file(&config_path)
        .with_adapter_factory(factory);

    let first = runner
        .run_job(h.enqueue("first.wav", JobParams::default()))
        .unwrap();
    assert!(first.succeeded(), "job failed: {:?}", first.error);
    assert_eq!(first.asr_engine.as_deref(), Some("first"));

    // Another process now holds the startup lock; the edit moves this worker off it.
    let leases = FileLeaseStore::new(h.settings.paths.leases_dir()).unwrap();
    leases
        .try_acquire("accelerator", "other-worker", Duration::from_secs(600))
        .unwrap()
        .unwrap();
    config.settings_mut().asr.engines = vec![AsrEngineSettings::stub("second")];
    config.settings_mut().pipeline.lock_name = "accelerator-b".to_string();
    config.save().unwrap();

    let second = runner
        .run_job(h.enqueue("second.wav", JobParams::default()))
        .unwrap();
    assert!(second.succeeded(), "job failed: {:?}", second.error);
    assert_eq!(second.asr_engine.as_deref(), Some("second"));
    assert!(leases.current("accelerator-b").unwrap().is_none());

    let log = std::fs::read_to_string(second.log_path.unwrap()).unwrap();
    assert!(log.contains("ASR engines: second; lock 'accelerator-b'"));
}
