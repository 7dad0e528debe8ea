//! Pipeline step implementations.
//!
//! One step per stage of the fixed sequence:
//! 1. ExtractAudio - probe the upload and pull out its audio
//! 2. NormalizeAudio - loudness-normalize, 16 kHz mono
//! 3. Transcribe - ASR fallback chain
//! 4. Align - word timestamps
//! 5. Diarize - speaker turns
//! 6. ResolveSpeakers - embeddings matched against the speaker registry
//! 7. AssembleSegments - speaker-attributed segments
//! 8. PersistTranscript - catalog record and transcript files
//! 9. ArchiveAudio - Opus archival copy
//! 10. Summarize - title, summary, tags (optional)
//! 11. Finalize - consistency check before the terminal status

mod audio;
mod identify;
mod recognition;
mod transcript;

pub use audio::{ArchiveAudioStep, ExtractAudioStep, NormalizeAudioStep};
pub use identify::ResolveSpeakersStep;
pub use recognition::{AlignStep, DiarizeStep, TranscribeStep};
pub use transcript::{AssembleSegmentsStep, FinalizeStep, PersistTranscriptStep, SummarizeStep};
