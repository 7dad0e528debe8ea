//! Shared harness: fake stage adapters and a runner over a temp data root.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tempfile::TempDir;

use voicestack_core::config::Settings;
use voicestack_core::lease::{LockEvent, LockOptions, MemoryLeaseStore, ResourceLock};
use voicestack_core::models::{AudioInfo, JobParams, JobStatus, Transcript};
use voicestack_core::orchestrator::{JobRunner, JobService, StageError, StageResult};
use voicestack_core::stages::{
    AsrChain, AsrOptions, AsrOutput, AudioTool, DiarizationOutput, Diarizer, PreparedAudio,
    ProportionalAligner, SpeakerTurn, StageAdapters, StubTranscriber, SummaryOutput, Summarizer,
    Transcriber, VoiceEmbedder,
};
use voicestack_core::store::Catalog;

pub const DURATION: f64 = 10.0;

/// Copies files around and reports a fixed ten second track.
pub struct FakeAudio;

impl FakeAudio {
    fn copy(input: &Path, output: &Path) -> StageResult<()> {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StageError::io_error("mkdir", e))?;
        }
        std::fs::copy(input, output).map_err(|e| StageError::io_error("copy", e))?;
        Ok(())
    }

    fn info(sample_rate: u32, channels: u16) -> AudioInfo {
        AudioInfo {
            duration_secs: DURATION,
            sample_rate,
            channels,
            codec: "pcm_s16le".to_string(),
        }
    }
}

impl AudioTool for FakeAudio {
    fn probe(&self, _path: &Path) -> StageResult<AudioInfo> {
        Ok(Self::info(44_100, 2))
    }

    fn extract(&self, input: &Path, output: &Path) -> StageResult<PreparedAudio> {
        Self::copy(input, output)?;
        Ok(PreparedAudio {
            path: output.to_path_buf(),
            info: Self::info(44_100, 2),
        })
    }

    fn normalize(&self, input: &Path, output: &Path) -> StageResult<PreparedAudio> {
        Self::copy(input, output)?;
        Ok(PreparedAudio {
            path: output.to_path_buf(),
            info: Self::info(16_000, 1),
        })
    }

    fn archive(&self, input: &Path, output: &Path) -> StageResult<PathBuf> {
        Self::copy(input, output)?;
        Ok(output.to_path_buf())
    }
}

/// An engine that never works.
pub struct BrokenTranscriber(pub &'static str);

impl Transcriber for BrokenTranscriber {
    fn name(&self) -> &str {
        self.0
    }

    fn transcribe(&self, _audio: &PreparedAudio, _options: &AsrOptions) -> StageResult<AsrOutput> {
        Err(StageError::other(format!("{} is not installed", self.0)))
    }
}

/// Two speakers, each talking for half the track.
pub struct TwoSpeakers {
    delay: Duration,
}

impl TwoSpeakers {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    /// Hold the stage open for `delay` so concurrent jobs contend.
    pub fn slow(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Diarizer for TwoSpeakers {
    fn name(&self) -> &str {
        "two-speakers"
    }

    fn diarize(&self, _audio: &PreparedAudio) -> StageResult<DiarizationOutput> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(DiarizationOutput {
            turns: vec![
                SpeakerTurn::new(0.0, 5.0, "SPEAKER_00"),
                SpeakerTurn::new(5.0, DURATION, "SPEAKER_01"),
            ],
        })
    }
}

/// Requests cancellation of the running job while diarizing.
pub struct CancellingDiarizer {
    pub catalog: Arc<Catalog>,
}

impl Diarizer for CancellingDiarizer {
    fn name(&self) -> &str {
        "cancelling"
    }

    fn diarize(&self, audio: &PreparedAudio) -> StageResult<DiarizationOutput> {
        let running = self
            .catalog
            .list_jobs()
            .map_err(|e| StageError::other(e.to_string()))?;
        for job in running.iter().filter(|j| j.status == JobStatus::Running) {
            self.catalog
                .request_cancel(job.id)
                .map_err(|e| StageError::other(e.to_string()))?;
        }
        TwoSpeakers::new().diarize(audio)
    }
}

/// Returns a fixed voice print per diarizer label.
pub struct FixedVoices {
    voices: Mutex<HashMap<String, Vec<f32>>>,
}

impl FixedVoices {
    pub fn new(voices: &[(&str, Vec<f32>)]) -> Self {
        Self {
            voices: Mutex::new(
                voices
                    .iter()
                    .map(|(label, v)| (label.to_string(), v.clone()))
                    .collect(),
            ),
        }
    }

    /// Orthogonal voices for SPEAKER_00 and SPEAKER_01.
    pub fn orthogonal() -> Self {
        Self::new(&[
            ("SPEAKER_00", vec![1.0, 0.0, 0.0]),
            ("SPEAKER_01", vec![0.0, 1.0, 0.0]),
        ])
    }

    pub fn set(&self, label: &str, vector: Vec<f32>) {
        self.voices.lock().insert(label.to_string(), vector);
    }
}

impl VoiceEmbedder for FixedVoices {
    fn name(&self) -> &str {
        "fixed"
    }

    fn embed(
        &self,
        _audio: &PreparedAudio,
        label: &str,
        _turns: &[SpeakerTurn],
    ) -> StageResult<Vec<f32>> {
        self.voices
            .lock()
            .get(label)
            .cloned()
            .ok_or_else(|| StageError::other(format!("no voice for {}", label)))
    }
}

pub struct CannedSummary;

impl Summarizer for CannedSummary {
    fn name(&self) -> &str {
        "canned"
    }

    fn summarize(&self, transcript: &Transcript) -> StageResult<SummaryOutput> {
        Ok(SummaryOutput {
            title: Some("Weekly sync".to_string()),
            summary: Some(format!("{} segments", transcript.segments.len())),
            tags: vec!["meeting".to_string(), "planning".to_string()],
        })
    }
}

pub struct BrokenSummary;

impl Summarizer for BrokenSummary {
    fn name(&self) -> &str {
        "broken"
    }

    fn summarize(&self, _transcript: &Transcript) -> StageResult<SummaryOutput> {
        Err(StageError::other("summarizer offline"))
    }
}

/// Adapters that run the whole pipeline without external tools.
pub fn fake_adapters() -> StageAdapters {
    let engines: Vec<Arc<dyn Transcriber>> = vec![Arc::new(StubTranscriber::new("stub"))];
    StageAdapters {
        audio: Arc::new(FakeAudio),
        asr: AsrChain::new(engines),
        aligner: Arc::new(ProportionalAligner::new()),
        diarizer: Arc::new(TwoSpeakers::new()),
        embedder: Arc::new(FixedVoices::orthogonal()),
        summarizer: None,
    }
}

/// One observed lock hold.
#[derive(Debug, Clone)]
pub struct Hold {
    pub holder: String,
    pub acquired: Instant,
    pub released: Option<Instant>,
}

/// Records lock holds in order.
#[derive(Clone, Default)]
pub struct LockLog {
    holds: Arc<Mutex<Vec<Hold>>>,
}

impl LockLog {
    pub fn holds(&self) -> Vec<Hold> {
        self.holds.lock().clone()
    }

    fn observe(&self, event: &LockEvent) {
        let mut holds = self.holds.lock();
        match event {
            LockEvent::Acquired { holder, at, .. } => holds.push(Hold {
                holder: holder.clone(),
                acquired: *at,
                released: None,
            }),
            LockEvent::Released { holder, at, .. } => {
                if let Some(hold) = holds
                    .iter_mut()
                    .rev()
                    .find(|h| &h.holder == holder && h.released.is_none())
                {
                    hold.released = Some(*at);
                }
            }
            _ => {}
        }
    }
}

/// A temp data root, a catalog and an in-process accelerator lock.
pub struct Harness {
    pub dir: TempDir,
    pub settings: Settings,
    pub catalog: Arc<Catalog>,
    pub leases: Arc<MemoryLeaseStore>,
    pub lock_log: LockLog,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.paths.data_root = dir.path().to_string_lossy().into_owned();
        Self {
            dir,
            settings,
            catalog: Arc::new(Catalog::in_memory()),
            leases: Arc::new(MemoryLeaseStore::new()),
            lock_log: LockLog::default(),
        }
    }

    /// Same as `new` but with the catalog persisted under the data root.
    pub fn durable() -> Self {
        let mut harness = Self::new();
        let catalog = Catalog::open(
            harness.settings.paths.catalog_path(),
            &harness.settings.paths.leases_dir(),
        )
        .unwrap();
        harness.catalog = Arc::new(catalog);
        harness
    }

    pub fn service(&self) -> JobService {
        JobService::new(Arc::clone(&self.catalog))
    }

    /// Write a placeholder upload.
    pub fn upload(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join("uploads").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"RIFF\0\0\0\0WAVEfmt ").unwrap();
        path
    }

    pub fn enqueue(&self, name: &str, params: JobParams) -> uuid::Uuid {
        self.service().enqueue(&self.upload(name), params).unwrap().id
    }

    pub fn lock(&self, options: LockOptions) -> ResourceLock {
        let log = self.lock_log.clone();
        ResourceLock::new(self.leases.clone(), "accelerator", options)
            .with_observer(Arc::new(move |event: &LockEvent| log.observe(event)))
    }

    pub fn runner(&self, adapters: StageAdapters) -> JobRunner {
        self.runner_with_lock(
            adapters,
            LockOptions {
                acquire_timeout: Duration::from_secs(30),
                lease_duration: Duration::from_secs(60),
                poll_interval: Duration::from_millis(5),
            },
        )
    }

    pub fn runner_with_lock(&self, adapters: StageAdapters, options: LockOptions) -> JobRunner {
        JobRunner::new(
            self.settings.clone(),
            Arc::clone(&self.catalog),
            adapters,
            self.lock(options),
        )
    }
}
