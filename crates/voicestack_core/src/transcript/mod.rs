//! Final transcript construction and artifact formats.

mod assemble;
mod writers;

pub use assemble::{assemble_segments, label_at};
pub use writers::{
    format_srt, format_txt, format_vtt, srt_timestamp, vtt_timestamp, write_transcript_artifacts,
    SpeakerNames,
};
