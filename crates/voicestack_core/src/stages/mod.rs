//! Stage adapters.
//!
//! Each external capability (audio processing, transcription, alignment,
//! diarization, voice embedding, summarization) sits behind a trait with a
//! typed input and output. The orchestrator only sees these traits; the
//! concrete engines are chosen from settings by [`StageAdapters`].

pub mod align;
pub mod asr;
pub mod audio;
pub mod diarize;
pub mod embed;
pub mod factory;
pub mod summarize;
pub mod types;

pub use align::{spread_words, Aligner, CommandAligner, ProportionalAligner};
pub use asr::{
    AsrAttempt, AsrChain, AsrSelection, CommandTranscriber, StubTranscriber, Transcriber,
};
pub use audio::{parse_probe, AudioTool, FfmpegAudioTool};
pub use diarize::{CommandDiarizer, Diarizer};
pub use embed::{CommandEmbedder, VoiceEmbedder};
pub use factory::{AdapterFactory, StageAdapters};
pub use summarize::{CommandSummarizer, Summarizer};
pub use types::{
    AlignedWord, AlignmentOutput, AsrOptions, AsrOutput, AsrSegment, DiarizationOutput,
    PreparedAudio, SpeakerTurn, SummaryOutput,
};
