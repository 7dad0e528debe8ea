//! Command-line interface for the VoiceStack worker.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// VoiceStack worker - transcription pipeline and speaker registry
#[derive(Parser, Debug)]
#[command(name = "voicestack-worker", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the settings file (created with defaults if missing)
    #[arg(long, global = true, value_name = "PATH", default_value = "voicestack.toml")]
    pub config: PathBuf,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Claim and run queued jobs
    Run {
        /// Run until the queue is empty, then exit
        #[arg(long)]
        once: bool,

        /// Worker threads (overrides [pipeline] worker_count)
        #[arg(long, short = 'w')]
        workers: Option<usize>,
    },
    /// Queue a job for a media file
    Enqueue {
        /// Uploaded media file
        input: PathBuf,

        /// ASR model override
        #[arg(long)]
        model: Option<String>,

        /// Spoken language hint (e.g. en, de)
        #[arg(long)]
        language: Option<String>,

        /// Speaker similarity threshold override
        #[arg(long, value_name = "SIMILARITY", allow_hyphen_values = true)]
        threshold: Option<f32>,

        /// Skip summarization for this job
        #[arg(long, conflicts_with = "summarize")]
        no_summary: bool,

        /// Force summarization for this job
        #[arg(long)]
        summarize: bool,
    },
    /// Show one job's status and progress
    Status {
        job_id: Uuid,
    },
    /// List jobs, newest first
    List,
    /// Cancel a queued or running job
    Cancel {
        job_id: Uuid,
    },
    /// Print the transcript produced by a job
    Transcript {
        job_id: Uuid,
    },
    /// Speaker registry operations
    Speakers {
        #[command(subcommand)]
        action: SpeakerAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SpeakerAction {
    /// List speakers, named ones first
    List,
    /// Move everything from SOURCE onto TARGET and delete SOURCE
    Merge {
        source: Uuid,
        target: Uuid,
    },
    /// Set or clear a speaker's display name
    Rename {
        id: Uuid,

        /// New display name (omit to clear)
        #[arg(long)]
        name: Option<String>,

        /// Mark the identity as confirmed by a person
        #[arg(long)]
        trusted: bool,
    },
}

/// `--no-summary` / `--summarize` as a per-job override.
pub fn summarize_override(no_summary: bool, summarize: bool) -> Option<bool> {
    match (no_summary, summarize) {
        (true, _) => Some(false),
        (false, true) => Some(true),
        (false, false) => None,
    }
}
