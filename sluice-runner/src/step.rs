//! Step errors and the retry policy
//!
//! Retries are off unless configured. Only failures of the command itself
//! are retried; cancellation, timeouts and missing secrets never are.

use sluice_core::domain::secret::SecretError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::cancel::RunToken;
use crate::context::RunContext;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Why a step did not complete
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Step '{step}' exited with code {exit_code}")]
    Failed {
        step: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Step '{step}' could not be started: {source}")]
    Spawn {
        step: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Run was cancelled during step '{step}'")]
    Cancelled { step: String },

    #[error("Step '{step}' timed out after {}s", timeout.as_secs())]
    TimedOut { step: String, timeout: Duration },

    #[error(transparent)]
    MissingSecret(#[from] SecretError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

impl StepError {
    /// Name of the step the error belongs to, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            StepError::Failed { step, .. }
            | StepError::Spawn { step, .. }
            | StepError::Cancelled { step }
            | StepError::TimedOut { step, .. } => Some(step.as_str()),
            StepError::MissingSecret(_) | StepError::Workspace(_) => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StepError::Failed { .. } | StepError::Spawn { .. })
    }
}

/// How often a failed step may be attempted again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Fail on the first error
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Total attempts, the first one included
    pub fn attempts(&self) -> u64 {
        u64::from(self.max_retries) + 1
    }

    /// Delay before the first retry, never above the backoff cap
    pub fn initial_delay(&self) -> Duration {
        self.backoff.min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Runs `op` under `policy`, backing off exponentially between attempts.
///
/// A cancellation observed while backing off ends the step immediately.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    ctx: &RunContext,
    token: &RunToken,
    step: &str,
    mut op: F,
) -> Result<T, StepError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StepError>>,
{
    let attempts = policy.attempts();
    let mut attempt: u64 = 0;
    let mut delay = policy.initial_delay();

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(
                    "Run {} step '{}' failed (attempt {}/{}): {}",
                    ctx.run_id,
                    step,
                    attempt,
                    attempts,
                    e
                );
                ctx.log_warning(format!(
                    "Step '{}' failed (attempt {}/{}), retrying in {} ms",
                    step,
                    attempt,
                    attempts,
                    delay.as_millis()
                ));

                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(StepError::Cancelled { step: step.to_string() });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                delay = (delay * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }
}
