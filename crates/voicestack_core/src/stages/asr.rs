//! Speech recognition adapters and the ordered fallback chain.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::config::{AsrEngineKind, AsrEngineSettings};
use crate::models::WordTiming;
use crate::orchestrator::{StageError, StageResult};
use crate::process::{render_args, ToolRunner};

use super::align::spread_words;
use super::types::{AsrOptions, AsrOutput, AsrSegment, PreparedAudio};

/// Trait for speech-to-text engines.
///
/// Implementations are interchangeable entries of an [`AsrChain`].
pub trait Transcriber: Send + Sync {
    /// Engine identity recorded on the job.
    fn name(&self) -> &str;

    fn transcribe(&self, audio: &PreparedAudio, options: &AsrOptions) -> StageResult<AsrOutput>;
}

impl<T: Transcriber> Transcriber for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn transcribe(&self, audio: &PreparedAudio, options: &AsrOptions) -> StageResult<AsrOutput> {
        (**self).transcribe(audio, options)
    }
}

const STUB_SENTENCES: [&str; 10] = [
    "Hello, this is a test recording for the voice transcription system.",
    "The audio quality seems to be working well today.",
    "I'm testing the new transcription features and functionality.",
    "This is an example of continuous speech that we might encounter.",
    "The system should be able to handle different types of audio content.",
    "Thank you for trying out the transcription service.",
    "We hope this demonstration shows the capabilities of the platform.",
    "Please let us know if you have any questions or feedback.",
    "The placeholder transcription is working as expected.",
    "This concludes our test of the audio processing pipeline.",
];

const STUB_FALLBACK_SENTENCE: &str = "This is a test audio transcription.";
const STUB_MAX_SEGMENT_SECS: f64 = 5.0;

/// Deterministic transcription for environments without an inference engine.
///
/// Cuts the audio into segments of `min(5 s, duration / 3)` and fills them
/// from a fixed sentence list, with proportional word timings.
#[derive(Debug, Clone)]
pub struct StubTranscriber {
    name: String,
}

impl StubTranscriber {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Transcriber for StubTranscriber {
    fn name(&self) -> &str {
        &self.name
    }

    fn transcribe(&self, audio: &PreparedAudio, options: &AsrOptions) -> StageResult<AsrOutput> {
        let duration = audio.info.duration_secs;
        let mut segments = Vec::new();

        let step = STUB_MAX_SEGMENT_SECS.min(duration / 3.0);
        if duration.is_finite() && step > 0.0 {
            // Count from the ratio so rounding never leaves a sliver at the end.
            let count = ((duration / step) - 1e-9).ceil().max(1.0) as usize;
            for index in 0..count {
                let start = index as f64 * step;
                let end = if index + 1 == count {
                    duration
                } else {
                    ((index + 1) as f64 * step).min(duration)
                };
                let text = STUB_SENTENCES[index % STUB_SENTENCES.len()];
                segments.push(AsrSegment {
                    start,
                    end,
                    text: text.to_string(),
                    words: spread_words(text, start, end),
                });
            }
        }

        if segments.is_empty() {
            let end = duration.max(0.0);
            segments.push(AsrSegment {
                start: 0.0,
                end,
                text: STUB_FALLBACK_SENTENCE.to_string(),
                words: spread_words(STUB_FALLBACK_SENTENCE, 0.0, end),
            });
        }

        Ok(AsrOutput {
            segments,
            language: Some(options.language.clone().unwrap_or_else(|| "en".to_string())),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawTranscript {
    #[serde(default)]
    segments: Vec<RawSegment>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    words: Vec<RawWord>,
}

#[derive(Debug, Deserialize)]
struct RawWord {
    word: String,
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    end: Option<f64>,
}

/// Parse engine JSON (`{"segments": [...], "language": ..}`).
///
/// Words the engine could not time are dropped.
pub fn parse_engine_output(json: &str) -> StageResult<AsrOutput> {
    let raw: RawTranscript = serde_json::from_str(json)
        .map_err(|e| StageError::parse_error("ASR output", e.to_string()))?;

    let segments = raw
        .segments
        .into_iter()
        .map(|s| AsrSegment {
            start: s.start,
            end: s.end,
            text: s.text.trim().to_string(),
            words: s
                .words
                .into_iter()
                .filter_map(|w| match (w.start, w.end) {
                    (Some(start), Some(end)) => Some(WordTiming::new(w.word.trim(), start, end)),
                    _ => None,
                })
                .collect(),
        })
        .collect();

    Ok(AsrOutput {
        segments,
        language: raw.language,
    })
}

/// Engine run as an external program.
///
/// Output is read from stdout when the program prints JSON, otherwise from
/// `<output_dir>/<input stem>.json`.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    name: String,
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
    runner: ToolRunner,
}

impl CommandTranscriber {
    pub fn new(settings: &AsrEngineSettings) -> Self {
        Self {
            name: settings.name.clone(),
            program: settings.program.clone(),
            args: settings.args.clone(),
            timeout: (settings.timeout_secs > 0).then(|| Duration::from_secs(settings.timeout_secs)),
            runner: ToolRunner::new(),
        }
    }

    /// Run the engine through `runner` (so it shows up in the run log).
    pub fn with_runner(mut self, runner: ToolRunner) -> Self {
        self.runner = runner;
        self
    }

    fn output_file(audio: &Path, output_dir: &Path) -> PathBuf {
        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        output_dir.join(format!("{}.json", stem))
    }
}

impl Transcriber for CommandTranscriber {
    fn name(&self) -> &str {
        &self.name
    }

    fn transcribe(&self, audio: &PreparedAudio, options: &AsrOptions) -> StageResult<AsrOutput> {
        std::fs::create_dir_all(&options.output_dir)
            .map_err(|e| StageError::io_error("creating ASR output directory", e))?;

        let input = audio.path.to_string_lossy();
        let output_dir = options.output_dir.to_string_lossy();
        let language = options.language.clone().unwrap_or_default();
        let args = render_args(
            &self.args,
            &[
                ("input", &input),
                ("output_dir", &output_dir),
                ("model", &options.model),
                ("compute_type", &options.compute_type),
                ("language", &language),
            ],
        );

        let output = self.runner.run(&self.program, &args, None, self.timeout)?;
        let stdout = output.stdout.trim();
        if stdout.starts_with('{') {
            return parse_engine_output(stdout);
        }

        let file = Self::output_file(&audio.path, &options.output_dir);
        let json = std::fs::read_to_string(&file).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StageError::empty_output(&self.name)
            } else {
                StageError::io_error(format!("reading {}", file.display()), e)
            }
        })?;
        parse_engine_output(&json)
    }
}

/// Build a transcriber from its settings entry.
pub fn transcriber_from_settings(
    settings: &AsrEngineSettings,
    runner: &ToolRunner,
) -> Arc<dyn Transcriber> {
    match settings.kind {
        AsrEngineKind::Command => {
            Arc::new(CommandTranscriber::new(settings).with_runner(runner.clone()))
        }
        AsrEngineKind::Stub => Arc::new(StubTranscriber::new(settings.name.clone())),
    }
}

/// Outcome of one engine attempt.
#[derive(Debug, Clone)]
pub struct AsrAttempt {
    pub engine: String,
    pub elapsed: Duration,
    /// Failure reason; None for the winning attempt.
    pub error: Option<String>,
}

/// Result of running the chain.
#[derive(Debug, Clone)]
pub struct AsrSelection {
    /// Engine whose output was used.
    pub engine: String,
    pub output: AsrOutput,
    /// Every attempt in order, the winner last.
    pub attempts: Vec<AsrAttempt>,
}

/// Ordered list of interchangeable engines.
///
/// Engines are tried strictly in order; the first success wins. An engine
/// fails when it errors, times out or returns no text for non-empty audio.
/// A failed engine is never retried.
#[derive(Clone, Default)]
pub struct AsrChain {
    engines: Vec<Arc<dyn Transcriber>>,
}

impl AsrChain {
    pub fn new(engines: Vec<Arc<dyn Transcriber>>) -> Self {
        Self { engines }
    }

    pub fn from_settings(engines: &[AsrEngineSettings], runner: &ToolRunner) -> Self {
        Self::new(
            engines
                .iter()
                .map(|engine| transcriber_from_settings(engine, runner))
                .collect(),
        )
    }

    pub fn with_engine(mut self, engine: Arc<dyn Transcriber>) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn engine_names(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Run engines in order until one succeeds.
    ///
    /// `on_attempt` sees every attempt as it finishes.
    pub fn transcribe(
        &self,
        audio: &PreparedAudio,
        options: &AsrOptions,
        on_attempt: &dyn Fn(&AsrAttempt),
    ) -> StageResult<AsrSelection> {
        if self.engines.is_empty() {
            return Err(StageError::AsrExhausted("no engines configured".to_string()));
        }

        let mut attempts = Vec::with_capacity(self.engines.len());
        for engine in &self.engines {
            let started = Instant::now();
            let result = engine.transcribe(audio, options).and_then(|output| {
                if audio.info.duration_secs > 0.0 && output.is_empty() {
                    Err(StageError::empty_output(engine.name()))
                } else {
                    Ok(output)
                }
            });

            let attempt = AsrAttempt {
                engine: engine.name().to_string(),
                elapsed: started.elapsed(),
                error: result.as_ref().err().map(|e| e.to_string()),
            };
            on_attempt(&attempt);
            attempts.push(attempt);

            match result {
                Ok(output) => {
                    tracing::info!(engine = engine.name(), "ASR engine selected");
                    return Ok(AsrSelection {
                        engine: engine.name().to_string(),
                        output,
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::warn!(engine = engine.name(), error = %e, "ASR engine failed");
                }
            }
        }

        let summary = attempts
            .iter()
            .map(|a| format!("{}: {}", a.engine, a.error.as_deref().unwrap_or("unknown")))
            .collect::<Vec<_>>()
            .join("; ");
        Err(StageError::AsrExhausted(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AudioInfo;
    use parking_lot::Mutex;

    fn audio(duration: f64) -> PreparedAudio {
        PreparedAudio {
            path: "/tmp/raw_16k_mono.wav".into(),
            info: AudioInfo {
                duration_secs: duration,
                sample_rate: 16_000,
                channels: 1,
                codec: "pcm_s16le".to_string(),
            },
        }
    }

    fn options() -> AsrOptions {
        AsrOptions {
            model: "base".to_string(),
            compute_type: "float32".to_string(),
            language: None,
            output_dir: std::env::temp_dir(),
        }
    }

    /// Scripted engine that counts its calls.
    struct ScriptedEngine {
        name: &'static str,
        output: Option<AsrOutput>,
        calls: Mutex<usize>,
    }

    impl ScriptedEngine {
        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                output: None,
                calls: Mutex::new(0),
            })
        }

        fn returning(name: &'static str, output: AsrOutput) -> Arc<Self> {
            Arc::new(Self {
                name,
                output: Some(output),
                calls: Mutex::new(0),
            })
        }
    }

    impl Transcriber for ScriptedEngine {
        fn name(&self) -> &str {
            self.name
        }

        fn transcribe(&self, _audio: &PreparedAudio, _options: &AsrOptions) -> StageResult<AsrOutput> {
            *self.calls.lock() += 1;
            self.output
                .clone()
                .ok_or_else(|| StageError::tool_missing(self.name))
        }
    }

    fn one_segment() -> AsrOutput {
        AsrOutput {
            segments: vec![AsrSegment {
                start: 0.0,
                end: 1.0,
                text: "hi".to_string(),
                words: Vec::new(),
            }],
            language: Some("en".to_string()),
        }
    }

    #[test]
    fn stub_segments_follow_duration() {
        let output = StubTranscriber::new("stub")
            .transcribe(&audio(10.0), &options())
            .unwrap();
        // min(5, 10/3) = 3.33 s segments
        assert_eq!(output.segments.len(), 3);
        assert_eq!(output.segments[0].start, 0.0);
        assert_eq!(output.segments.last().unwrap().end, 10.0);
        assert!(output.segments.iter().all(|s| !s.words.is_empty()));
    }

    #[test]
    fn stub_long_audio_uses_five_second_segments() {
        let output = StubTranscriber::new("stub")
            .transcribe(&audio(30.0), &options())
            .unwrap();
        assert_eq!(output.segments.len(), 6);
        assert_eq!(output.segments[1].start, 5.0);
    }

    #[test]
    fn stub_zero_length_yields_fallback_segment() {
        let output = StubTranscriber::new("stub")
            .transcribe(&audio(0.0), &options())
            .unwrap();
        assert_eq!(output.segments.len(), 1);
        assert_eq!(output.segments[0].text, STUB_FALLBACK_SENTENCE);
    }

    #[test]
    fn stub_has_no_trailing_sliver() {
        let output = StubTranscriber::new("stub")
            .transcribe(&audio(7.3), &options())
            .unwrap();
        assert_eq!(output.segments.len(), 3);
        assert_eq!(output.segments.last().unwrap().end, 7.3);
        for pair in output.segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        let shortest = output
            .segments
            .iter()
            .map(|s| s.end - s.start)
            .fold(f64::INFINITY, f64::min);
        assert!(shortest > 2.0);
    }

    #[test]
    fn stub_tiny_duration_returns_one_segment() {
        let output = StubTranscriber::new("stub")
            .transcribe(&audio(5e-324), &options())
            .unwrap();
        assert_eq!(output.segments.len(), 1);
        assert_eq!(output.segments[0].start, 0.0);
        assert_eq!(output.segments[0].end, 5e-324);
    }

    #[test]
    fn parse_drops_untimed_words() {
        let output = parse_engine_output(
            r#"{"language":"en","segments":[{"start":0.0,"end":2.0,"text":" It costs 5 ",
                "words":[{"word":"It","start":0.0,"end":0.3},{"word":"costs","start":0.3,"end":0.8},{"word":"5"}]}]}"#,
        )
        .unwrap();
        assert_eq!(output.segments[0].text, "It costs 5");
        assert_eq!(output.segments[0].words.len(), 2);
        assert_eq!(output.language.as_deref(), Some("en"));
    }

    #[test]
    fn chain_falls_through_to_first_success() {
        let first = ScriptedEngine::failing("fast");
        let second = ScriptedEngine::returning("general", one_segment());
        let third = ScriptedEngine::returning("stub", one_segment());
        let chain = AsrChain::new(vec![first.clone(), second.clone(), third.clone()]);

        let seen = Mutex::new(Vec::new());
        let selection = chain
            .transcribe(&audio(1.0), &options(), &|a| seen.lock().push(a.engine.clone()))
            .unwrap();

        assert_eq!(selection.engine, "general");
        assert_eq!(selection.attempts.len(), 2);
        assert!(selection.attempts[0].error.is_some());
        assert_eq!(*seen.lock(), vec!["fast".to_string(), "general".to_string()]);
        assert_eq!(*first.calls.lock(), 1);
        assert_eq!(*third.calls.lock(), 0);
    }

    #[test]
    fn empty_output_counts_as_failure() {
        let silent = ScriptedEngine::returning("silent", AsrOutput::default());
        let stub = ScriptedEngine::returning("stub", one_segment());
        let chain = AsrChain::new(vec![silent, stub]);

        let selection = chain.transcribe(&audio(1.0), &options(), &|_| {}).unwrap();
        assert_eq!(selection.engine, "stub");
    }

    #[test]
    fn exhausted_chain_names_every_engine() {
        let chain = AsrChain::new(vec![
            ScriptedEngine::failing("fast"),
            ScriptedEngine::failing("general"),
        ]);
        let err = chain.transcribe(&audio(1.0), &options(), &|_| {}).unwrap_err();
        match err {
            StageError::AsrExhausted(message) => {
                assert!(message.contains("fast"));
                assert!(message.contains("general"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_engine_program_falls_back() {
        let commands = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&commands);
        let runner = ToolRunner::new().with_log(Arc::new(move |line: &str| {
            sink.lock().push(line.to_string())
        }));
        let chain = AsrChain::from_settings(
            &[
                AsrEngineSettings {
                    name: "missing".to_string(),
                    kind: AsrEngineKind::Command,
                    program: "voicestack-no-such-asr".to_string(),
                    args: vec!["{input}".to_string()],
                    timeout_secs: 5,
                },
                AsrEngineSettings::stub("stub"),
            ],
            &runner,
        );
        assert_eq!(chain.engine_names(), vec!["missing", "stub"]);

        let selection = chain.transcribe(&audio(6.0), &options(), &|_| {}).unwrap();
        assert_eq!(selection.engine, "stub");
        assert!(selection.attempts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("not installed"));
        assert_eq!(
            *commands.lock(),
            vec!["voicestack-no-such-asr /tmp/raw_16k_mono.wav"]
        );
    }
}
