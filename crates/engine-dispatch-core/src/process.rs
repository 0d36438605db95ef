//! Process spawning with optional wall-clock timeout.
//!
//! This module provides:
//! - [`ProcessLauncher`] and [`RunningProcess`]: the two-phase process primitive
//! - [`TokioLauncher`]: the default launcher built on `tokio::process`
//! - [`ProcessRequest`], [`StdinMode`], [`OutputMode`]: per-call stdio policy
//! - [`ProcessOutput`] and [`ExitOutcome`]: what a finished process reports
//!
//! Spawning and waiting are separate calls so that a missing engine binary
//! (spawn fails) can be told apart from an engine that dies mid-run (wait
//! fails or times out).

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::command::CommandLine;

/// Where a child's stdin comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdinMode {
    /// No input (`/dev/null`).
    #[default]
    Null,
    /// Inherit the caller's stdin.
    Inherit,
    /// Feed these bytes, then close the pipe.
    Bytes(Vec<u8>),
    /// Read from a file.
    File(PathBuf),
}

/// What happens to a child's stdout or stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Capture into the [`ProcessOutput`].
    Capture,
    /// Pass through to the caller's stream.
    Inherit,
    /// Discard.
    Null,
}

impl OutputMode {
    fn to_stdio(self) -> Stdio {
        match self {
            Self::Capture => Stdio::piped(),
            Self::Inherit => Stdio::inherit(),
            Self::Null => Stdio::null(),
        }
    }
}

/// A request to run one process.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// The argument vector; the first token is the program.
    pub command: CommandLine,
    /// Stdin source. Defaults to [`StdinMode::Null`].
    pub stdin: StdinMode,
    /// Stdout handling. Defaults to [`OutputMode::Capture`].
    pub stdout: OutputMode,
    /// Stderr handling. Defaults to [`OutputMode::Inherit`].
    pub stderr: OutputMode,
    /// Working directory for the child.
    pub working_dir: Option<PathBuf>,
}

impl ProcessRequest {
    /// Create a request with the default stdio policy.
    pub fn new(command: CommandLine) -> Self {
        Self {
            command,
            stdin: StdinMode::Null,
            stdout: OutputMode::Capture,
            stderr: OutputMode::Inherit,
            working_dir: None,
        }
    }

    /// Capture both stdout and stderr (used for build steps).
    pub fn captured(command: CommandLine) -> Self {
        Self {
            stderr: OutputMode::Capture,
            ..Self::new(command)
        }
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited normally with this code.
    Exited(i32),
    /// Killed by this signal.
    Signaled(i32),
    /// Killed after exceeding its timeout.
    TimedOut,
}

impl ExitOutcome {
    /// Exit code, shell style: a signal `n` reports `128 + n`.
    ///
    /// `None` for a timed-out process.
    pub fn code(self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(code),
            Self::Signaled(signal) => Some(128 + signal),
            Self::TimedOut => None,
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt as _;
            if let Some(signal) = status.signal() {
                return Self::Signaled(signal);
            }
        }

        Self::Exited(1)
    }
}

/// Everything a finished process reports.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Captured stdout (empty unless captured).
    pub stdout: Vec<u8>,
    /// Captured stderr (empty unless captured).
    pub stderr: Vec<u8>,
    /// How the process ended.
    pub outcome: ExitOutcome,
    /// Time from spawn to exit.
    pub duration: Duration,
}

impl ProcessOutput {
    /// Captured stdout as text (lossy).
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Captured stderr as text (lossy).
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Returns `true` if the process was killed for exceeding its timeout.
    pub fn timed_out(&self) -> bool {
        self.outcome == ExitOutcome::TimedOut
    }
}

/// Starts processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Spawn the requested process.
    ///
    /// An error here means the program could not be started at all.
    async fn spawn(&self, request: &ProcessRequest) -> io::Result<Box<dyn RunningProcess>>;
}

/// A spawned process that has not been waited on yet.
#[async_trait]
pub trait RunningProcess: Send {
    /// Wait for the process to exit, killing it once `timeout` elapses.
    ///
    /// A timeout is reported as [`ExitOutcome::TimedOut`], not as an error.
    async fn wait(&mut self, timeout: Option<Duration>) -> io::Result<ProcessOutput>;
}

/// [`ProcessLauncher`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn spawn(&self, request: &ProcessRequest) -> io::Result<Box<dyn RunningProcess>> {
        let (program, args) = request.command.split_program().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty command line")
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdout(request.stdout.to_stdio());
        cmd.stderr(request.stderr.to_stdio());
        cmd.kill_on_drop(true);

        let mut input = None;
        match &request.stdin {
            StdinMode::Null => {
                cmd.stdin(Stdio::null());
            }
            StdinMode::Inherit => {
                cmd.stdin(Stdio::inherit());
            }
            StdinMode::Bytes(bytes) => {
                cmd.stdin(Stdio::piped());
                input = Some(bytes.clone());
            }
            StdinMode::File(path) => {
                cmd.stdin(std::fs::File::open(path)?);
            }
        }

        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn()?;
        debug!(pid = ?child.id(), command = %request.command, "Process spawned");

        Ok(Box::new(TokioProcess {
            child: Some(child),
            input,
            started: Instant::now(),
        }))
    }
}

struct TokioProcess {
    child: Option<Child>,
    input: Option<Vec<u8>>,
    started: Instant,
}

#[async_trait]
impl RunningProcess for TokioProcess {
    async fn wait(&mut self, timeout: Option<Duration>) -> io::Result<ProcessOutput> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| io::Error::other("process already waited on"))?;

        if let (Some(bytes), Some(mut stdin)) = (self.input.take(), child.stdin.take()) {
            tokio::spawn(async move {
                // The child may exit without reading; a broken pipe is fine.
                let _ = stdin.write_all(&bytes).await;
            });
        }

        let output = child.wait_with_output();
        let output = match timeout {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(result) => result?,
                Err(_) => {
                    // Dropping the future drops the child, and kill_on_drop
                    // kills it.
                    warn!(timeout_ms = limit.as_millis(), "Process timed out, killed");
                    return Ok(ProcessOutput {
                        stdout: Vec::new(),
                        stderr: Vec::new(),
                        outcome: ExitOutcome::TimedOut,
                        duration: self.started.elapsed(),
                    });
                }
            },
            None => output.await?,
        };

        Ok(ProcessOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            outcome: ExitOutcome::from_status(output.status),
            duration: self.started.elapsed(),
        })
    }
}
