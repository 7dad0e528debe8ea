//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Pipeline, lock and worker settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Ordered ASR engine chain.
    #[serde(default)]
    pub asr: AsrSettings,

    /// External tool commands.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Archival encode settings.
    #[serde(default)]
    pub archive: ArchiveSettings,
}

/// Data locations.
///
/// Relative folders are resolved against `data_root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root folder for all worker data.
    #[serde(default = "default_data_root")]
    pub data_root: String,

    /// Per-job artifact folders live here.
    #[serde(default = "default_artifacts_folder")]
    pub artifacts_folder: String,

    /// Archival audio copies.
    #[serde(default = "default_archive_folder")]
    pub archive_folder: String,

    /// Application log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Catalog document (jobs, transcripts, speakers).
    #[serde(default = "default_catalog_file")]
    pub catalog_file: String,

    /// Shared folder holding lease records.
    #[serde(default = "default_leases_folder")]
    pub leases_folder: String,
}

fn default_data_root() -> String {
    "voicestack_data".to_string()
}

fn default_artifacts_folder() -> String {
    "artifacts".to_string()
}

fn default_archive_folder() -> String {
    "archive".to_string()
}

fn default_logs_folder() -> String {
    "logs".to_string()
}

fn default_catalog_file() -> String {
    "catalog.json".to_string()
}

fn default_leases_folder() -> String {
    "leases".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            artifacts_folder: default_artifacts_folder(),
            archive_folder: default_archive_folder(),
            logs_folder: default_logs_folder(),
            catalog_file: default_catalog_file(),
            leases_folder: default_leases_folder(),
        }
    }
}

impl PathSettings {
    fn resolve(&self, value: &str) -> PathBuf {
        let path = PathBuf::from(value);
        if path.is_absolute() {
            path
        } else {
            PathBuf::from(&self.data_root).join(path)
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.resolve(&self.artifacts_folder)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.resolve(&self.archive_folder)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.resolve(&self.logs_folder)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.resolve(&self.catalog_file)
    }

    pub fn leases_dir(&self) -> PathBuf {
        self.resolve(&self.leases_folder)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Application log level (`trace`..`error`).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Number of run log lines kept in memory for failure reports.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Timestamp run log lines forwarded to the console. The file always has them.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            error_tail: default_error_tail(),
            show_timestamps: true,
        }
    }
}

/// Orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Minimum cosine similarity for matching a known speaker.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Name of the accelerator lock.
    #[serde(default = "default_lock_name")]
    pub lock_name: String,

    /// Longest wait for the accelerator lock, in seconds.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Lease duration of the accelerator lock, in seconds.
    #[serde(default = "default_lock_lease")]
    pub lock_lease_secs: u64,

    /// Interval between acquisition attempts, in milliseconds.
    #[serde(default = "default_lock_poll")]
    pub lock_poll_ms: u64,

    /// Worker threads per process.
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,

    /// Idle interval between queue polls, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Run the summarization stage.
    #[serde(default = "default_true")]
    pub summarize: bool,
}

fn default_similarity_threshold() -> f32 {
    0.30
}

fn default_lock_name() -> String {
    "accelerator".to_string()
}

fn default_lock_timeout() -> u64 {
    300
}

fn default_lock_lease() -> u64 {
    1800
}

fn default_lock_poll() -> u64 {
    1000
}

fn default_worker_count() -> u32 {
    2
}

fn default_poll_interval() -> u64 {
    2000
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            lock_name: default_lock_name(),
            lock_timeout_secs: default_lock_timeout(),
            lock_lease_secs: default_lock_lease(),
            lock_poll_ms: default_lock_poll(),
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval(),
            summarize: true,
        }
    }
}

impl PipelineSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock_lease_secs)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Kind of ASR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsrEngineKind {
    /// External program printing JSON segments.
    #[default]
    Command,
    /// Deterministic placeholder transcription.
    Stub,
}

/// One entry of the ASR fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrEngineSettings {
    /// Engine identity recorded on the job.
    pub name: String,

    #[serde(default)]
    pub kind: AsrEngineKind,

    /// Program to run (command engines).
    #[serde(default)]
    pub program: String,

    /// Argument templates.
    #[serde(default)]
    pub args: Vec<String>,

    /// Per-invocation timeout in seconds (0 disables).
    #[serde(default = "default_asr_timeout")]
    pub timeout_secs: u64,
}

fn default_asr_timeout() -> u64 {
    3600
}

impl AsrEngineSettings {
    pub fn stub(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AsrEngineKind::Stub,
            program: String::new(),
            args: Vec::new(),
            timeout_secs: 0,
        }
    }
}

/// ASR chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrSettings {
    /// Default model name.
    #[serde(default = "default_asr_model")]
    pub model: String,

    /// Compute type passed to engines.
    #[serde(default = "default_compute_type")]
    pub compute_type: String,

    /// Engines in priority order.
    #[serde(default = "default_engines")]
    pub engines: Vec<AsrEngineSettings>,
}

fn default_asr_model() -> String {
    "base".to_string()
}

fn default_compute_type() -> String {
    "float32".to_string()
}

fn default_engines() -> Vec<AsrEngineSettings> {
    vec![
        AsrEngineSettings {
            name: "whisperx".to_string(),
            kind: AsrEngineKind::Command,
            program: "whisperx".to_string(),
            args: vec![
                "{input}".to_string(),
                "--model".to_string(),
                "{model}".to_string(),
                "--compute_type".to_string(),
                "{compute_type}".to_string(),
                "--output_dir".to_string(),
                "{output_dir}".to_string(),
                "--output_format".to_string(),
                "json".to_string(),
            ],
            timeout_secs: default_asr_timeout(),
        },
        AsrEngineSettings::stub("stub"),
    ]
}

impl Default for AsrSettings {
    fn default() -> Self {
        Self {
            model: default_asr_model(),
            compute_type: default_compute_type(),
            engines: default_engines(),
        }
    }
}

/// External command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout in seconds (0 disables).
    #[serde(default)]
    pub timeout_secs: u64,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: &[&str], timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Word alignment strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignerKind {
    /// Use the `align` tool command.
    Command,
    /// Spread segment time over words by character length.
    #[default]
    Proportional,
}

/// External tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    /// Timeout for ffmpeg/ffprobe runs, in seconds (0 disables).
    #[serde(default = "default_media_timeout")]
    pub media_timeout_secs: u64,

    #[serde(default)]
    pub aligner: AlignerKind,

    /// Alignment tool (used when `aligner = "command"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<ToolCommand>,

    #[serde(default = "default_diarize")]
    pub diarize: ToolCommand,

    #[serde(default = "default_embed")]
    pub embed: ToolCommand,

    /// Summarization tool. Unset disables summarization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summarize: Option<ToolCommand>,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_media_timeout() -> u64 {
    1800
}

fn default_diarize() -> ToolCommand {
    ToolCommand::new("voicestack-diarize", &["{input}"], 3600)
}

fn default_embed() -> ToolCommand {
    ToolCommand::new("voicestack-embed", &["{input}", "{label}"], 600)
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            media_timeout_secs: default_media_timeout(),
            aligner: AlignerKind::default(),
            align: None,
            diarize: default_diarize(),
            embed: default_embed(),
            summarize: None,
        }
    }
}

impl ToolSettings {
    pub fn media_timeout(&self) -> Option<Duration> {
        (self.media_timeout_secs > 0).then(|| Duration::from_secs(self.media_timeout_secs))
    }
}

/// Archival encode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSettings {
    #[serde(default = "default_codec")]
    pub codec: String,

    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// File extension of archived audio.
    #[serde(default = "default_extension")]
    pub extension: String,
}

fn default_codec() -> String {
    "libopus".to_string()
}

fn default_bitrate() -> String {
    "24k".to_string()
}

fn default_extension() -> String {
    "opus".to_string()
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            bitrate: default_bitrate(),
            extension: default_extension(),
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Logging,
    Pipeline,
    Asr,
    Tools,
    Archive,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 6] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Pipeline,
        ConfigSection::Asr,
        ConfigSection::Tools,
        ConfigSection::Archive,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Pipeline => "pipeline",
            ConfigSection::Asr => "asr",
            ConfigSection::Tools => "tools",
            ConfigSection::Archive => "archive",
        }
    }

    /// Comment written above the section in generated files.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "# Data, artifact and lease locations",
            ConfigSection::Logging => "# Logging configuration",
            ConfigSection::Pipeline => "# Speaker matching, accelerator lock and worker loop",
            ConfigSection::Asr => "# ASR engines, tried in order until one succeeds",
            ConfigSection::Tools => "# External media and inference tools",
            ConfigSection::Archive => "# Archival audio encoding",
        }
    }
}
