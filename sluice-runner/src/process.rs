//! Subprocess execution
//!
//! Every external collaborator (git, the Python toolchain, the test runner,
//! the platform CLI) is reached through [`CommandRunner`]. [`ProcessRunner`]
//! is the real implementation:
//! - The child gets the run's environment and nothing else
//! - stdout/stderr are streamed into the run log line by line
//! - A cancelled run token or an exceeded step timeout kills the child

use async_trait::async_trait;
use sluice_core::domain::log::LogLevel;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::cancel::RunToken;
use crate::context::RunContext;
use crate::step::StepError;

const STDERR_TAIL_LINES: usize = 20;

/// A command to run as one step of a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Step name, used in logs and errors
    pub step: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(step: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turns a non-zero exit into [`StepError::Failed`]
    pub fn check(self, spec: &CommandSpec) -> Result<CommandOutput, StepError> {
        if self.is_success() {
            return Ok(self);
        }

        let lines: Vec<&str> = self.stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");

        Err(StepError::Failed {
            step: spec.step.clone(),
            exit_code: self.exit_code,
            stderr: tail,
        })
    }
}

/// Executes commands on behalf of a run
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `spec` to completion.
    ///
    /// A non-zero exit is NOT an error here; callers decide what it means.
    async fn run(
        &self,
        spec: &CommandSpec,
        ctx: &RunContext,
        token: &RunToken,
    ) -> Result<CommandOutput, StepError>;
}

/// Runs commands as local subprocesses
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

enum Outcome {
    Exited(String, String, std::io::Result<std::process::ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        ctx: &RunContext,
        token: &RunToken,
    ) -> Result<CommandOutput, StepError> {
        if token.is_cancelled() {
            return Err(StepError::Cancelled {
                step: spec.step.clone(),
            });
        }

        ctx.log_info(format!("$ {}", spec));
        debug!("Run {} executing: {}", ctx.run_id, spec);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .env_clear()
            .envs(ctx.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|source| StepError::Spawn {
            step: spec.step.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let outcome = {
            let io = async {
                let (out, err, status) = tokio::join!(
                    read_lines(stdout, ctx, LogLevel::Info),
                    read_lines(stderr, ctx, LogLevel::Warning),
                    child.wait()
                );
                Outcome::Exited(out, err, status)
            };

            tokio::select! {
                outcome = io => outcome,
                _ = token.cancelled() => Outcome::Cancelled,
                timeout = deadline(self.timeout) => Outcome::TimedOut(timeout),
            }
        };

        match outcome {
            Outcome::Exited(stdout, stderr, status) => {
                let status = status.map_err(|source| StepError::Spawn {
                    step: spec.step.clone(),
                    source,
                })?;
                // Killed by a signal: no exit code
                let exit_code = status.code().unwrap_or(-1);

                if exit_code != 0 {
                    debug!(
                        "Run {} step '{}' exited with code {}",
                        ctx.run_id, spec.step, exit_code
                    );
                }

                Ok(CommandOutput {
                    exit_code,
                    stdout: ctx.redact(&stdout),
                    stderr: ctx.redact(&stderr),
                })
            }
            Outcome::Cancelled => {
                kill(&mut child, ctx, &spec.step).await;
                Err(StepError::Cancelled {
                    step: spec.step.clone(),
                })
            }
            Outcome::TimedOut(timeout) => {
                kill(&mut child, ctx, &spec.step).await;
                Err(StepError::TimedOut {
                    step: spec.step.clone(),
                    timeout,
                })
            }
        }
    }
}

/// Streams a child pipe into the run log, returning everything read
async fn read_lines<R>(reader: Option<R>, ctx: &RunContext, level: LogLevel) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return String::new();
    };

    let mut collected = String::new();
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !line.trim().is_empty() {
                    ctx.log(level, &line);
                }
                collected.push_str(&line);
                collected.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read output for run {}: {}", ctx.run_id, e);
                break;
            }
        }
    }

    collected
}

async fn deadline(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(timeout) => {
            tokio::time::sleep(timeout).await;
            timeout
        }
        None => std::future::pending().await,
    }
}

async fn kill(child: &mut tokio::process::Child, ctx: &RunContext, step: &str) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill step '{}' of run {}: {}", step, ctx.run_id, e);
    }
    ctx.log_warning(format!("Step '{}' was stopped", step));
}
