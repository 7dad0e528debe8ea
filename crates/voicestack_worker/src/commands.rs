//! Command handlers.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Serialize;
use uuid::Uuid;

use voicestack_core::config::Settings;
use voicestack_core::models::{Job, JobParams, Speaker};
use voicestack_core::orchestrator::{JobRunner, JobService, Worker};
use voicestack_core::store::{CancelOutcome, Catalog};
use voicestack_core::transcript::{format_txt, SpeakerNames};

use crate::cli::{summarize_override, Commands, SpeakerAction};

/// Everything a command needs: settings, catalog and output mode.
pub struct App {
    pub settings: Settings,
    pub config_path: PathBuf,
    pub catalog: Arc<Catalog>,
    pub json: bool,
}

impl App {
    fn service(&self) -> JobService {
        JobService::new(Arc::clone(&self.catalog))
    }

    pub fn dispatch(&self, command: Commands) -> Result<ExitCode> {
        match command {
            Commands::Run { once, workers } => self.run(once, workers),
            Commands::Enqueue {
                input,
                model,
                language,
                threshold,
                no_summary,
                summarize,
            } => {
                let params = JobParams {
                    model,
                    language,
                    similarity_threshold: threshold,
                    summarize: summarize_override(no_summary, summarize),
                };
                let job = self
                    .service()
                    .enqueue(&input, params)
                    .with_context(|| format!("cannot queue {}", input.display()))?;
                self.emit(&job, || format!("Queued job {}", job.id))
            }
            Commands::Status { job_id } => {
                let job = self.service().status(job_id)?;
                self.emit(&job, || describe_job(&job))
            }
            Commands::List => {
                let jobs = self.service().list()?;
                self.emit(&jobs, || {
                    jobs.iter()
                        .map(|j| {
                            format!(
                                "{}  {:<9}  {:>3}%  {}",
                                j.id,
                                j.status.as_str(),
                                j.progress,
                                j.current_stage.map(|s| s.as_str()).unwrap_or("-")
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                })
            }
            Commands::Cancel { job_id } => {
                let outcome = self.service().cancel(job_id)?;
                let message = match outcome {
                    CancelOutcome::CancelledWhileQueued => {
                        "cancelled before it started".to_string()
                    }
                    CancelOutcome::Requested => "will stop after its current stage".to_string(),
                    CancelOutcome::AlreadyTerminal(status) => {
                        format!("already {}; nothing to cancel", status)
                    }
                };
                let value = serde_json::json!({ "job_id": job_id, "result": message });
                self.emit(&value, || format!("Job {} {}", job_id, message))
            }
            Commands::Transcript { job_id } => self.transcript(job_id),
            Commands::Speakers { action } => self.speakers(action),
        }
    }

    fn run(&self, once: bool, workers: Option<usize>) -> Result<ExitCode> {
        let runner = JobRunner::from_settings(self.settings.clone(), Arc::clone(&self.catalog))
            .context("cannot open the accelerator lock store")?
            .with_settings_file(&self.config_path);

        let count = workers.unwrap_or(self.settings.pipeline.worker_count as usize);
        let worker = Worker::new(runner, count, self.settings.pipeline.poll_interval());

        if !once {
            worker.run_until_shutdown();
            return Ok(ExitCode::SUCCESS);
        }

        let outcomes = worker.drain();
        let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
        self.emit(&outcomes, || {
            let mut lines: Vec<String> = outcomes
                .iter()
                .map(|o| {
                    let error = o
                        .error
                        .as_ref()
                        .map(|e| format!(" ({})", e))
                        .unwrap_or_default();
                    format!("{}  {}{}", o.job_id, o.status, error)
                })
                .collect();
            lines.push(format!("{} job(s) run, {} not successful", outcomes.len(), failed));
            lines.join("\n")
        })?;
        Ok(if failed == 0 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }

    fn transcript(&self, job_id: Uuid) -> Result<ExitCode> {
        let service = self.service();
        let transcript = service.transcript(job_id)?;
        let names: SpeakerNames = service
            .speakers()?
            .into_iter()
            .map(|s| (s.id, s.label()))
            .collect();
        self.emit(&transcript, || {
            let mut text = String::new();
            if let Some(ref title) = transcript.title {
                text.push_str(&format!("# {}\n\n", title));
            }
            text.push_str(format_txt(&transcript.segments, &names).trim_end());
            text
        })
    }

    fn speakers(&self, action: SpeakerAction) -> Result<ExitCode> {
        let service = self.service();
        match action {
            SpeakerAction::List => {
                let speakers = service.speakers()?;
                self.emit(&speakers, || {
                    speakers
                        .iter()
                        .map(describe_speaker)
                        .collect::<Vec<_>>()
                        .join("\n")
                })
            }
            SpeakerAction::Merge { source, target } => {
                let report = service.merge_speakers(source, target)?;
                self.emit(&report, || {
                    format!(
                        "Merged {} into {}: {} segments, {} embeddings, {} job(s)",
                        report.source,
                        report.target,
                        report.segments_moved,
                        report.embeddings_moved,
                        report.affected_jobs.len()
                    )
                })
            }
            SpeakerAction::Rename { id, name, trusted } => {
                let speaker = service.rename_speaker(id, name.as_deref(), trusted)?;
                self.emit(&speaker, || describe_speaker(&speaker))
            }
        }
    }

    /// Print `value` as JSON or the text from `text`.
    fn emit<T: Serialize + ?Sized>(
        &self,
        value: &T,
        text: impl FnOnce() -> String,
    ) -> Result<ExitCode> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            let text = text();
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn describe_job(job: &Job) -> String {
    let mut lines = vec![
        format!("Job {}", job.id),
        format!("  status:    {} ({}%)", job.status, job.progress),
    ];
    if let Some(stage) = job.current_stage {
        lines.push(format!("  stage:     {}", stage));
    }
    if !job.completed_stages.is_empty() {
        let done: Vec<&str> = job.completed_stages.iter().map(|s| s.as_str()).collect();
        lines.push(format!("  completed: {}", done.join(", ")));
    }
    if let Some(ref engine) = job.asr_engine {
        lines.push(format!("  asr:       {}", engine));
    }
    if let Some(ref error) = job.error {
        lines.push(format!("  error:     {}", error));
    }
    if let Some(id) = job.transcript_id {
        lines.push(format!("  transcript: {}", id));
    }
    if let Some(ref path) = job.log_path {
        lines.push(format!("  log:       {}", path.display()));
    }
    lines.join("\n")
}

fn describe_speaker(speaker: &Speaker) -> String {
    let confidence = speaker
        .match_confidence
        .map(|c| format!("{:.3}", c))
        .unwrap_or_else(|| "new".to_string());
    format!(
        "{}  {:<24}  {}{}",
        speaker.id,
        speaker.label(),
        confidence,
        if speaker.trusted { "  trusted" } else { "" }
    )
}
