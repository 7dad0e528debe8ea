//! External tool runner.
//!
//! Tools run with piped stdout/stderr drained on reader threads, an optional
//! JSON document on stdin and an optional wall-clock limit after which the
//! child is killed. A [`ToolRunner`] also echoes each command line to a job's
//! run log before spawning it.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::process::{Command, Stdio};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::orchestrator::{StageError, StageResult};

/// Lines of stderr kept in failure messages.
const STDERR_TAIL_LINES: usize = 20;

/// Captured output of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Shell-like rendering for logs.
pub fn render_command(program: &str, args: &[String]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            rendered.push('\'');
            rendered.push_str(arg);
            rendered.push('\'');
        } else {
            rendered.push_str(arg);
        }
    }
    rendered
}

/// Substitute `{key}` placeholders in argument templates.
///
/// Unknown placeholders are left as-is.
pub fn render_args(templates: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    templates
        .iter()
        .map(|template| {
            vars.iter().fold(template.clone(), |arg, (key, value)| {
                arg.replace(&format!("{{{}}}", key), value)
            })
        })
        .collect()
}

/// Receives each rendered command line before it runs.
pub type CommandLog = Arc<dyn Fn(&str) + Send + Sync>;

/// Runs external tools for one job.
#[derive(Clone, Default)]
pub struct ToolRunner {
    log: Option<CommandLog>,
}

impl fmt::Debug for ToolRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRunner")
            .field("logged", &self.log.is_some())
            .finish()
    }
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send every command line to `log` (the run log's `$ ...` entries).
    pub fn with_log(mut self, log: CommandLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> StageResult<ToolOutput> {
        if let Some(ref log) = self.log {
            log(&render_command(program, args));
        }
        run_tool(program, args, stdin, timeout)
    }

    /// Run a tool that takes an optional JSON document on stdin and prints JSON.
    pub fn run_json<I, T>(
        &self,
        program: &str,
        args: &[String],
        input: Option<&I>,
        timeout: Option<Duration>,
    ) -> StageResult<T>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = input
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| StageError::parse_error(format!("{} input", program), e.to_string()))?;

        let output = self.run(program, args, payload.as_deref(), timeout)?;
        if output.stdout.trim().is_empty() {
            return Err(StageError::empty_output(program));
        }
        serde_json::from_str(&output.stdout)
            .map_err(|e| StageError::parse_error(format!("{} output", program), e.to_string()))
    }
}

/// Run `program`, failing on spawn errors, non-zero exit or timeout.
pub fn run_tool(
    program: &str,
    args: &[String],
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> StageResult<ToolOutput> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    tracing::debug!("Running: {}", render_command(program, args));
    let started_at = Instant::now();

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            StageError::tool_missing(program)
        } else {
            StageError::io_error(format!("spawning {}", program), e)
        }
    })?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let data = input.to_vec();
            thread::spawn(move || {
                // Tools that ignore stdin close the pipe early
                let _ = pipe.write_all(&data);
            });
        }
    }

    let stdout_rx = drain(child.stdout.take());
    let stderr_rx = drain(child.stderr.take());

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => return Err(StageError::io_error(format!("waiting for {}", program), e)),
        }

        if let Some(limit) = timeout {
            if started_at.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!("{} killed after {:?}", program, limit);
                return Err(StageError::timeout(program, limit));
            }
        }

        thread::sleep(Duration::from_millis(20));
    };

    let collect = |rx: mpsc::Receiver<Vec<u8>>| {
        rx.recv_timeout(Duration::from_secs(5))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    };
    let stdout = collect(stdout_rx);
    let stderr = collect(stderr_rx);

    if !status.success() {
        return Err(StageError::command_failed(
            program,
            status.code().unwrap_or(-1),
            stderr_tail(&stderr),
        ));
    }

    Ok(ToolOutput {
        stdout,
        stderr,
        elapsed: started_at.elapsed(),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            let _ = tx.send(buf);
        });
    } else {
        let _ = tx.send(Vec::new());
    }
    rx
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
