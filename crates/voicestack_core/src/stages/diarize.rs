//! Speaker diarization adapters.

use std::sync::Arc;

use serde::Deserialize;

use crate::config::ToolCommand;
use crate::orchestrator::{StageError, StageResult};
use crate::process::{render_args, ToolRunner};

use super::types::{DiarizationOutput, PreparedAudio, SpeakerTurn};

/// Partitions audio into labelled speaker turns.
pub trait Diarizer: Send + Sync {
    fn name(&self) -> &str;

    fn diarize(&self, audio: &PreparedAudio) -> StageResult<DiarizationOutput>;
}

impl<T: Diarizer> Diarizer for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn diarize(&self, audio: &PreparedAudio) -> StageResult<DiarizationOutput> {
        (**self).diarize(audio)
    }
}

/// Tools may print either `{"turns": [..]}` or a bare turn list.
#[derive(Deserialize)]
#[serde(untagged)]
enum DiarizeReply {
    Wrapped(DiarizationOutput),
    Bare(Vec<SpeakerTurn>),
}

/// Order turns by start time and reject inverted or unlabeled ones.
pub fn normalize_turns(mut turns: Vec<SpeakerTurn>) -> StageResult<DiarizationOutput> {
    if let Some(bad) = turns
        .iter()
        .find(|t| !(t.start.is_finite() && t.end.is_finite()) || t.end < t.start)
    {
        return Err(StageError::invalid_output(format!(
            "turn {} has invalid range {}..{}",
            bad.label, bad.start, bad.end
        )));
    }
    if turns.iter().any(|t| t.label.trim().is_empty()) {
        return Err(StageError::invalid_output("turn without a speaker label"));
    }

    turns.retain(|t| t.end > t.start);
    turns.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));
    Ok(DiarizationOutput { turns })
}

/// Diarizer backed by an external tool printing JSON turns.
#[derive(Debug, Clone)]
pub struct CommandDiarizer {
    command: ToolCommand,
    runner: ToolRunner,
}

impl CommandDiarizer {
    pub fn new(command: ToolCommand) -> Self {
        Self {
            command,
            runner: ToolRunner::new(),
        }
    }

    /// Run the tool through `runner` (so it shows up in the run log).
    pub fn with_runner(mut self, runner: ToolRunner) -> Self {
        self.runner = runner;
        self
    }
}

impl Diarizer for CommandDiarizer {
    fn name(&self) -> &str {
        &self.command.program
    }

    fn diarize(&self, audio: &PreparedAudio) -> StageResult<DiarizationOutput> {
        let input = audio.path.to_string_lossy();
        let args = render_args(&self.command.args, &[("input", &input)]);
        let reply: DiarizeReply = self.runner.run_json::<(), _>(
            &self.command.program,
            &args,
            None,
            self.command.timeout(),
        )?;
        let turns = match reply {
            DiarizeReply::Wrapped(output) => output.turns,
            DiarizeReply::Bare(turns) => turns,
        };
        normalize_turns(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_are_sorted_and_empty_ones_dropped() {
        let output = normalize_turns(vec![
            SpeakerTurn::new(5.0, 9.0, "SPEAKER_01"),
            SpeakerTurn::new(0.0, 5.0, "SPEAKER_00"),
            SpeakerTurn::new(9.0, 9.0, "SPEAKER_00"),
        ])
        .unwrap();
        assert_eq!(output.turns.len(), 2);
        assert_eq!(output.turns[0].label, "SPEAKER_00");
    }

    #[test]
    fn inverted_turn_is_rejected() {
        let err = normalize_turns(vec![SpeakerTurn::new(3.0, 1.0, "SPEAKER_00")]).unwrap_err();
        assert!(matches!(err, StageError::InvalidOutput(_)));
    }

    #[test]
    fn bare_and_wrapped_replies_parse() {
        let bare: DiarizeReply =
            serde_json::from_str(r#"[{"start":0,"end":1,"speaker":"A"}]"#).unwrap();
        assert!(matches!(bare, DiarizeReply::Bare(ref t) if t.len() == 1));

        let wrapped: DiarizeReply =
            serde_json::from_str(r#"{"turns":[{"start":0,"end":1,"label":"A"}]}"#).unwrap();
        assert!(matches!(wrapped, DiarizeReply::Wrapped(ref o) if o.turns.len() == 1));
    }

    #[cfg(unix)]
    #[test]
    fn command_output_is_parsed() {
        let diarizer = CommandDiarizer::new(ToolCommand::new(
            "sh",
            &["-c", r#"echo '[{"start":1.0,"end":2.0,"speaker":"B"},{"start":0.0,"end":1.0,"speaker":"A"}]'"#],
            10,
        ));
        let audio = PreparedAudio {
            path: "/tmp/a.wav".into(),
            info: crate::models::AudioInfo {
                duration_secs: 2.0,
                sample_rate: 16_000,
                channels: 1,
                codec: "pcm_s16le".to_string(),
            },
        };
        let output = diarizer.diarize(&audio).unwrap();
        assert_eq!(output.labels(), vec!["A".to_string(), "B".to_string()]);
    }
}
