//! Transcript artifact writers: JSON, plain text, SRT and WebVTT.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::models::{Segment, Transcript};
use crate::orchestrator::{StageError, StageResult};
use crate::store::artifact_names;

/// Speaker id → name shown in captions.
pub type SpeakerNames = HashMap<Uuid, String>;

fn speaker_name<'a>(segment: &'a Segment, names: &'a SpeakerNames) -> &'a str {
    segment
        .speaker_id
        .and_then(|id| names.get(&id))
        .map(String::as_str)
        .or(segment.speaker_label.as_deref())
        .unwrap_or("Unknown")
}

/// `HH:MM:SS<sep>mmm`
fn timestamp(seconds: f64, separator: char) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (secs, millis) = (rest / 1000, rest % 1000);
    format!(
        "{:02}:{:02}:{:02}{}{:03}",
        hours, minutes, secs, separator, millis
    )
}

pub fn srt_timestamp(seconds: f64) -> String {
    timestamp(seconds, ',')
}

pub fn vtt_timestamp(seconds: f64) -> String {
    timestamp(seconds, '.')
}

pub fn format_srt(segments: &[Segment], names: &SpeakerNames) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}: {}\n\n",
            i + 1,
            srt_timestamp(segment.start),
            srt_timestamp(segment.end),
            speaker_name(segment, names),
            segment.text
        );
    }
    out
}

pub fn format_vtt(segments: &[Segment], names: &SpeakerNames) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for segment in segments {
        let _ = write!(
            out,
            "{} --> {}\n{}: {}\n\n",
            vtt_timestamp(segment.start),
            vtt_timestamp(segment.end),
            speaker_name(segment, names),
            segment.text
        );
    }
    out
}

/// One `[HH:MM:SS] Name: text` line per segment.
pub fn format_txt(segments: &[Segment], names: &SpeakerNames) -> String {
    let mut out = String::new();
    for segment in segments {
        let stamp = srt_timestamp(segment.start);
        let _ = writeln!(
            out,
            "[{}] {}: {}",
            &stamp[..8],
            speaker_name(segment, names),
            segment.text
        );
    }
    out
}

/// Write `transcript.{json,txt,srt,vtt}` into `dir`.
pub fn write_transcript_artifacts(
    dir: &Path,
    transcript: &Transcript,
    names: &SpeakerNames,
) -> StageResult<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| StageError::io_error("creating artifact directory", e))?;

    let json = serde_json::to_string_pretty(transcript)
        .map_err(|e| StageError::parse_error("transcript", e.to_string()))?;

    let files = [
        (artifact_names::TRANSCRIPT_JSON, json),
        (
            artifact_names::TRANSCRIPT_TXT,
            format_txt(&transcript.segments, names),
        ),
        (
            artifact_names::TRANSCRIPT_SRT,
            format_srt(&transcript.segments, names),
        ),
        (
            artifact_names::TRANSCRIPT_VTT,
            format_vtt(&transcript.segments, names),
        ),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (name, content) in files {
        let path = dir.join(name);
        fs::write(&path, content)
            .map_err(|e| StageError::io_error(format!("writing {}", name), e))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn segment(start: f64, end: f64, text: &str, speaker: Option<u128>, label: &str) -> Segment {
        Segment {
            id: Uuid::new_v4(),
            start,
            end,
            text: text.to_string(),
            words: Vec::new(),
            speaker_id: speaker.map(Uuid::from_u128),
            speaker_label: Some(label.to_string()),
        }
    }

    fn names() -> SpeakerNames {
        HashMap::from([(Uuid::from_u128(1), "Ada".to_string())])
    }

    #[test]
    fn timestamps() {
        assert_eq!(srt_timestamp(3725.5), "01:02:05,500");
        assert_eq!(vtt_timestamp(0.0429), "00:00:00.043");
        assert_eq!(srt_timestamp(-1.0), "00:00:00,000");
    }

    #[test]
    fn srt_numbers_cues_and_prefixes_speaker() {
        let srt = format_srt(
            &[
                segment(0.0, 1.5, "Hello.", Some(1), "SPEAKER_00"),
                segment(1.5, 3.0, "Hi.", Some(2), "SPEAKER_01"),
            ],
            &names(),
        );
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,500\nAda: Hello.\n\n\
             2\n00:00:01,500 --> 00:00:03,000\nSPEAKER_01: Hi.\n\n"
        );
    }

    #[test]
    fn vtt_has_header() {
        let vtt = format_vtt(&[segment(0.0, 1.0, "Hello.", Some(1), "SPEAKER_00")], &names());
        assert!(vtt.starts_with("WEBVTT\n\n00:00:00.000 --> 00:00:01.000\nAda: Hello."));
    }

    #[test]
    fn txt_lines() {
        let txt = format_txt(&[segment(65.0, 70.0, "Later.", None, "SPEAKER_02")], &names());
        assert_eq!(txt, "[00:01:05] SPEAKER_02: Later.\n");
    }

    #[test]
    fn artifacts_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = Transcript {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            asset_id: Uuid::new_v4(),
            raw_text: "Hello.".to_string(),
            segments: vec![segment(0.0, 1.0, "Hello.", Some(1), "SPEAKER_00")],
            language: Some("en".to_string()),
            title: None,
            summary: None,
            tags: Vec::new(),
            created_at: Utc::now(),
        };

        let written = write_transcript_artifacts(dir.path(), &transcript, &names()).unwrap();
        assert_eq!(written.len(), 4);
        let parsed: Transcript =
            serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(parsed, transcript);
    }
}
