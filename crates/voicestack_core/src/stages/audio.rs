//! Audio probing, extraction, normalisation and archival via ffmpeg.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::config::{ArchiveSettings, ToolSettings};
use crate::models::AudioInfo;
use crate::orchestrator::{StageError, StageResult};
use crate::process::ToolRunner;

use super::types::PreparedAudio;

/// EBU R128 loudness target used for inference input.
const LOUDNORM_FILTER: &str = "loudnorm=I=-16:TP=-1.5:LRA=11";
const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Signal-processing operations on audio files.
pub trait AudioTool: Send + Sync {
    /// Read stream metadata of `path`.
    fn probe(&self, path: &Path) -> StageResult<AudioInfo>;

    /// Pull the audio track of `input` into a PCM WAV at `output`.
    fn extract(&self, input: &Path, output: &Path) -> StageResult<PreparedAudio>;

    /// Loudness-normalise and resample `input` to 16 kHz mono at `output`.
    fn normalize(&self, input: &Path, output: &Path) -> StageResult<PreparedAudio>;

    /// Encode an archival copy of `input` at `output`.
    fn archive(&self, input: &Path, output: &Path) -> StageResult<PathBuf>;
}

/// [`AudioTool`] backed by the ffmpeg/ffprobe binaries.
#[derive(Debug, Clone)]
pub struct FfmpegAudioTool {
    ffmpeg: String,
    ffprobe: String,
    codec: String,
    bitrate: String,
    timeout: Option<Duration>,
    runner: ToolRunner,
}

impl FfmpegAudioTool {
    pub fn new(tools: &ToolSettings, archive: &ArchiveSettings) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
            codec: archive.codec.clone(),
            bitrate: archive.bitrate.clone(),
            timeout: tools.media_timeout(),
            runner: ToolRunner::new(),
        }
    }

    /// Run ffmpeg and ffprobe through `runner` (so it shows up in the run log).
    pub fn with_runner(mut self, runner: ToolRunner) -> Self {
        self.runner = runner;
        self
    }

    fn ffmpeg(&self, args: Vec<String>) -> StageResult<()> {
        self.runner.run(&self.ffmpeg, &args, None, self.timeout)?;
        Ok(())
    }

    fn prepared(&self, output: &Path) -> StageResult<PreparedAudio> {
        require_file(output)?;
        Ok(PreparedAudio {
            path: output.to_path_buf(),
            info: self.probe(output)?,
        })
    }
}

impl AudioTool for FfmpegAudioTool {
    fn probe(&self, path: &Path) -> StageResult<AudioInfo> {
        require_file(path)?;
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path_arg(path),
        ];
        let output = self.runner.run(&self.ffprobe, &args, None, self.timeout)?;
        parse_probe(&output.stdout)
    }

    fn extract(&self, input: &Path, output: &Path) -> StageResult<PreparedAudio> {
        require_file(input)?;
        self.ffmpeg(vec![
            "-y".to_string(),
            "-i".to_string(),
            path_arg(input),
            "-vn".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            path_arg(output),
        ])?;
        self.prepared(output)
    }

    fn normalize(&self, input: &Path, output: &Path) -> StageResult<PreparedAudio> {
        require_file(input)?;
        self.ffmpeg(vec![
            "-y".to_string(),
            "-i".to_string(),
            path_arg(input),
            "-af".to_string(),
            LOUDNORM_FILTER.to_string(),
            "-ar".to_string(),
            TARGET_SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            path_arg(output),
        ])?;
        self.prepared(output)
    }

    fn archive(&self, input: &Path, output: &Path) -> StageResult<PathBuf> {
        require_file(input)?;
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StageError::io_error("creating archive directory", e))?;
        }
        self.ffmpeg(vec![
            "-y".to_string(),
            "-i".to_string(),
            path_arg(input),
            "-c:a".to_string(),
            self.codec.clone(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            "-vbr".to_string(),
            "on".to_string(),
            path_arg(output),
        ])?;
        require_file(output)?;
        Ok(output.to_path_buf())
    }
}

#[derive(Debug, Deserialize)]
struct ProbeDocument {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
    #[serde(default)]
    sample_rate: Option<String>,
    #[serde(default)]
    channels: Option<u16>,
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json` output.
///
/// Uses the first audio stream; the container duration wins over the
/// stream duration.
pub fn parse_probe(json: &str) -> StageResult<AudioInfo> {
    let doc: ProbeDocument = serde_json::from_str(json)
        .map_err(|e| StageError::parse_error("ffprobe output", e.to_string()))?;

    let stream = doc
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or_else(|| StageError::invalid_input("No audio stream found"))?;

    let duration = doc
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(AudioInfo {
        duration_secs: duration,
        sample_rate: stream
            .sample_rate
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(0),
        channels: stream.channels.unwrap_or(0),
        codec: stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

fn require_file(path: &Path) -> StageResult<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(StageError::file_not_found(path.display().to_string())),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
