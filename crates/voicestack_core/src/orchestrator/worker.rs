//! Worker loop: N threads claiming and running queued jobs.
//!
//! Each thread claims the oldest QUEUED job, runs it to a terminal state and
//! claims the next. Threads only share the runner; the accelerator lock
//! keeps their inference stages apart, while light stages overlap freely.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::pipeline::CancelHandle;
use super::runner::{JobOutcome, JobRunner};
use crate::config::PipelineSettings;

/// Longest single sleep while idle, so shutdown is noticed promptly.
const SHUTDOWN_CHECK: Duration = Duration::from_millis(100);

/// Pool of worker threads over a shared [`JobRunner`].
pub struct Worker {
    runner: Arc<JobRunner>,
    worker_count: usize,
    poll_interval: Duration,
    shutdown: CancelHandle,
}

impl Worker {
    pub fn new(runner: JobRunner, worker_count: usize, poll_interval: Duration) -> Self {
        Self {
            runner: Arc::new(runner),
            worker_count: worker_count.max(1),
            poll_interval,
            shutdown: CancelHandle::new(),
        }
    }

    /// Thread count and idle poll interval from `[pipeline]`.
    pub fn from_settings(runner: JobRunner, settings: &PipelineSettings) -> Self {
        Self::new(
            runner,
            settings.worker_count as usize,
            settings.poll_interval(),
        )
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Handle that stops the loop after the jobs in progress finish.
    pub fn shutdown_handle(&self) -> CancelHandle {
        self.shutdown.clone()
    }

    /// Run at most one queued job on the calling thread.
    pub fn run_once(&self) -> Option<JobOutcome> {
        match self.runner.run_next() {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Failed to claim a job: {}", e);
                None
            }
        }
    }

    /// Run queued jobs on every thread until the queue is empty.
    ///
    /// Returns outcomes in completion order.
    pub fn drain(&self) -> Vec<JobOutcome> {
        let outcomes = Mutex::new(Vec::new());
        thread::scope(|scope| {
            for index in 0..self.worker_count {
                let outcomes = &outcomes;
                scope.spawn(move || {
                    tracing::debug!(worker = index, "Worker draining queue");
                    while !self.shutdown.is_cancelled() {
                        match self.run_once() {
                            Some(outcome) => outcomes.lock().push(outcome),
                            None => break,
                        }
                    }
                });
            }
        });
        outcomes.into_inner()
    }

    /// Poll for jobs until shutdown is requested.
    pub fn run_until_shutdown(&self) {
        tracing::info!(
            workers = self.worker_count,
            poll_ms = self.poll_interval.as_millis() as u64,
            "Worker started"
        );
        thread::scope(|scope| {
            for index in 0..self.worker_count {
                scope.spawn(move || self.poll_loop(index));
            }
        });
        tracing::info!("Worker stopped");
    }

    fn poll_loop(&self, index: usize) {
        while !self.shutdown.is_cancelled() {
            match self.run_once() {
                Some(outcome) => tracing::info!(
                    worker = index,
                    job_id = %outcome.job_id,
                    status = %outcome.status,
                    "Job done"
                ),
                None => self.idle(),
            }
        }
    }

    fn idle(&self) {
        let mut remaining = self.poll_interval;
        while !remaining.is_zero() && !self.shutdown.is_cancelled() {
            let step = remaining.min(SHUTDOWN_CHECK);
            thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }
}
