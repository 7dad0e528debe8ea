//! Voice embedding adapters.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ToolCommand;
use crate::orchestrator::{StageError, StageResult};
use crate::process::{render_args, ToolRunner};

use super::types::{PreparedAudio, SpeakerTurn};

/// Extracts one voice print per diarized speaker cluster.
pub trait VoiceEmbedder: Send + Sync {
    fn name(&self) -> &str;

    /// Embed the speech of `label`, found in `turns`.
    fn embed(
        &self,
        audio: &PreparedAudio,
        label: &str,
        turns: &[SpeakerTurn],
    ) -> StageResult<Vec<f32>>;
}

impl<T: VoiceEmbedder> VoiceEmbedder for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn embed(
        &self,
        audio: &PreparedAudio,
        label: &str,
        turns: &[SpeakerTurn],
    ) -> StageResult<Vec<f32>> {
        (**self).embed(audio, label, turns)
    }
}

/// Reject empty or non-finite vectors.
pub fn validate_embedding(label: &str, vector: &[f32]) -> StageResult<()> {
    if vector.is_empty() {
        return Err(StageError::invalid_output(format!(
            "empty embedding for {}",
            label
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(StageError::invalid_output(format!(
            "non-finite embedding for {}",
            label
        )));
    }
    Ok(())
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    label: &'a str,
    turns: &'a [SpeakerTurn],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedReply {
    Wrapped { embedding: Vec<f32> },
    Bare(Vec<f32>),
}

/// Embedder backed by an external tool.
///
/// The tool receives `{"label", "turns"}` on stdin and prints either
/// `{"embedding": [..]}` or a bare number list.
#[derive(Debug, Clone)]
pub struct CommandEmbedder {
    command: ToolCommand,
    runner: ToolRunner,
}

impl CommandEmbedder {
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

impl VoiceEmbedder for CommandEmbedder {
    fn name(&self) -> &str {
        &self.command.program
    }

    fn embed(
        &self,
        audio: &PreparedAudio,
        label: &str,
        turns: &[SpeakerTurn],
    ) -> StageResult<Vec<f32>> {
        let input = audio.path.to_string_lossy();
        let args = render_args(&self.command.args, &[("input", &input), ("label", label)]);
        let reply: EmbedReply = self.runner.run_json(
            &self.command.program,
            &args,
            Some(&EmbedRequest { label, turns }),
            self.command.timeout(),
        )?;
        let vector = match reply {
            EmbedReply::Wrapped { embedding } => embedding,
            EmbedReply::Bare(vector) => vector,
        };
        validate_embedding(label, &vector)?;
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vector_is_invalid() {
        assert!(validate_embedding("SPEAKER_00", &[]).is_err());
        assert!(validate_embedding("SPEAKER_00", &[f32::NAN, 1.0]).is_err());
        assert!(validate_embedding("SPEAKER_00", &[0.1, 0.2]).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn command_reads_wrapped_reply() {
        let embedder = CommandEmbedder::new(ToolCommand::new(
            "sh",
            &["-c", r#"cat > /dev/null; echo '{"embedding":[0.5,0.25]}'"#],
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
        let turns = [SpeakerTurn::new(0.0, 2.0, "SPEAKER_00")];
        let vector = embedder.embed(&audio, "SPEAKER_00", &turns).unwrap();
        assert_eq!(vector, vec![0.5, 0.25]);
    }
}
