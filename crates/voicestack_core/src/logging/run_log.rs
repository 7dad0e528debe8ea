//! Per-job append-only run log.
//!
//! Each job gets one `_pipeline.log` in its artifact directory. The log:
//! - Is opened in append mode and never truncated (reruns and merge audits append)
//! - Flushes every line so other processes see entries in order
//! - Mirrors each line to `tracing` with the job id as a field
//! - Forwards lines to an optional observer callback
//! - Maintains a tail buffer for failure diagnosis

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::types::{LogConfig, LogLevel, LogObserver, MessagePrefix};
use crate::models::Stage;

/// Per-job run log with file, tracing and observer output.
pub struct RunLog {
    job_id: Uuid,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    observer: Mutex<Option<LogObserver>>,
    config: LogConfig,
    tail_buffer: Mutex<VecDeque<String>>,
}

impl RunLog {
    /// Open (or create) the run log at `log_path` for appending.
    pub fn open(
        job_id: Uuid,
        log_path: impl Into<PathBuf>,
        config: LogConfig,
        observer: Option<LogObserver>,
    ) -> std::io::Result<Self> {
        let log_path = log_path.into();
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let capacity = config.error_tail.max(1);
        Ok(Self {
            job_id,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            observer: Mutex::new(observer),
            config,
            tail_buffer: Mutex::new(VecDeque::with_capacity(capacity)),
        })
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn info(&self, message: &str) {
        self.write(MessagePrefix::None, message);
    }

    pub fn warn(&self, message: &str) {
        self.write(MessagePrefix::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.write(MessagePrefix::Error, message);
    }

    /// External command about to run.
    pub fn command(&self, command: &str) {
        self.write(MessagePrefix::Command, command);
    }

    pub fn audit(&self, message: &str) {
        self.write(MessagePrefix::Audit, message);
    }

    pub fn stage_started(&self, stage: Stage) {
        self.write(MessagePrefix::Stage, stage.as_str());
    }

    pub fn stage_done(&self, stage: Stage, elapsed: Duration) {
        self.write(
            MessagePrefix::Done,
            &format!("{} ({} ms)", stage, elapsed.as_millis()),
        );
    }

    pub fn stage_skipped(&self, stage: Stage, reason: &str) {
        self.write(MessagePrefix::Skipped, &format!("{}: {}", stage, reason));
    }

    pub fn stage_failed(&self, stage: Stage, message: &str) {
        self.write(MessagePrefix::Error, &format!("{}: {}", stage, message));
    }

    /// Replay the tail buffer under a header (typically after a failure).
    pub fn show_tail(&self, header: &str) {
        let lines: Vec<String> = self.tail_buffer.lock().iter().cloned().collect();
        if lines.is_empty() {
            return;
        }
        let mut writer = self.file_writer.lock();
        if let Some(ref mut writer) = *writer {
            let _ = writeln!(writer, "[{}/tail]", header);
            for line in &lines {
                let _ = writeln!(writer, "  {}", line);
            }
            let _ = writer.flush();
        }
    }

    /// Current tail buffer contents.
    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Close the file handle. Later writes only reach tracing and the observer.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn write(&self, prefix: MessagePrefix, message: &str) {
        let body = prefix.format(message);
        let stamped = format!(
            "[{}] {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            body
        );

        {
            let mut writer = self.file_writer.lock();
            if let Some(ref mut writer) = *writer {
                let _ = writeln!(writer, "{}", stamped);
                let _ = writer.flush();
            }
        }

        {
            let mut buffer = self.tail_buffer.lock();
            if buffer.len() >= self.config.error_tail.max(1) {
                buffer.pop_front();
            }
            buffer.push_back(body.clone());
        }

        match prefix.level() {
            LogLevel::Error => tracing::error!(job_id = %self.job_id, "{}", body),
            LogLevel::Warn => tracing::warn!(job_id = %self.job_id, "{}", body),
            LogLevel::Debug | LogLevel::Trace => tracing::debug!(job_id = %self.job_id, "{}", body),
            LogLevel::Info => tracing::info!(job_id = %self.job_id, "{}", body),
        }

        if let Some(ref observer) = *self.observer.lock() {
            observer(if self.config.show_timestamps {
                &stamped
            } else {
                &body
            });
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.close();
    }
}

/// Append a single audit line to an existing run log.
pub fn append_audit(job_id: Uuid, log_path: &Path, message: &str) -> std::io::Result<()> {
    let log = RunLog::open(job_id, log_path, LogConfig::default(), None)?;
    log.audit(message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn lines_are_timestamped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job").join("_pipeline.log");
        let log = RunLog::open(Uuid::new_v4(), &path, LogConfig::default(), None).unwrap();

        log.stage_started(Stage::Transcribe);
        log.stage_done(Stage::Transcribe, Duration::from_millis(42));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("=== transcribe ==="));
        assert!(lines[1].ends_with("[DONE] transcribe (42 ms)"));
    }

    #[test]
    fn file_lines_keep_timestamps_when_console_drops_them() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("_pipeline.log");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: LogObserver = Arc::new(move |line: &str| sink.lock().push(line.to_string()));
        let config = LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        };

        let log = RunLog::open(Uuid::new_v4(), &path, config, Some(observer)).unwrap();
        log.command("ffmpeg -i talk.wav");

        assert_eq!(*seen.lock(), vec!["$ ffmpeg -i talk.wav"]);
        let content = fs::read_to_string(&path).unwrap();
        let line = content.lines().next().unwrap();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] $ ffmpeg -i talk.wav"));
    }

    #[test]
    fn reopening_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("_pipeline.log");
        let job_id = Uuid::new_v4();

        {
            let log = RunLog::open(job_id, &path, LogConfig::default(), None).unwrap();
            log.info("first run");
        }
        append_audit(job_id, &path, "speaker merged").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("first run"));
        assert!(content.contains("[AUDIT] speaker merged"));
    }

    #[test]
    fn observer_sees_every_line() {
        let dir = tempdir().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let observer: LogObserver = Arc::new(move |_line| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let log = RunLog::open(
            Uuid::new_v4(),
            dir.path().join("_pipeline.log"),
            LogConfig::default(),
            Some(observer),
        )
        .unwrap();
        log.info("one");
        log.warn("two");
        log.stage_failed(Stage::Align, "boom");

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn tail_buffer_maintains_limit() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            error_tail: 3,
            show_timestamps: false,
        };
        let log = RunLog::open(Uuid::new_v4(), dir.path().join("_pipeline.log"), config, None)
            .unwrap();

        for i in 0..6 {
            log.info(&format!("Line {}", i));
        }

        assert_eq!(log.get_tail(), vec!["Line 3", "Line 4", "Line 5"]);
    }
}
