//! Run domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::event::TriggerEvent;
use crate::domain::workflow::WorkflowKind;
use crate::gate::ConcurrencyKey;

/// A single execution of a workflow
///
/// Structure shared between orchestrator (records) and runner (produces the result).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub workflow: WorkflowKind,
    pub key: ConcurrencyKey,
    pub trigger: TriggerEvent,
    pub status: RunStatus,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub result: Option<RunResult>,
}

impl Run {
    /// Creates a queued run
    pub fn queued(id: Uuid, workflow: WorkflowKind, key: ConcurrencyKey, trigger: TriggerEvent) -> Self {
        Self {
            id,
            workflow,
            key,
            trigger,
            status: RunStatus::Queued,
            requested_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
        }
    }
}

/// Run execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Queued | RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "Queued"),
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Succeeded => write!(f, "Succeeded"),
            RunStatus::Failed => write!(f, "Failed"),
            RunStatus::Cancelled => write!(f, "Cancelled"),
            RunStatus::TimedOut => write!(f, "TimedOut"),
        }
    }
}

/// Which phase of a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Checkout, runtime install or dependency install
    Provisioning,
    /// Assertion failure or collection error in the test suite
    Test,
    /// Alias update or serve command
    Deployment,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Provisioning => write!(f, "provisioning"),
            FailureKind::Test => write!(f, "test"),
            FailureKind::Deployment => write!(f, "deployment"),
        }
    }
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub failure: Option<FailureKind>,
    pub failed_step: Option<String>,
    pub error_message: Option<String>,
}

impl RunResult {
    pub fn succeeded() -> Self {
        Self {
            status: RunStatus::Succeeded,
            failure: None,
            failed_step: None,
            error_message: None,
        }
    }

    pub fn failed(kind: FailureKind, step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            failure: Some(kind),
            failed_step: Some(step.into()),
            error_message: Some(message.into()),
        }
    }

    pub fn cancelled(step: Option<String>) -> Self {
        Self {
            status: RunStatus::Cancelled,
            failure: None,
            failed_step: step,
            error_message: Some("Run was cancelled".to_string()),
        }
    }

    pub fn timed_out(kind: FailureKind, step: impl Into<String>) -> Self {
        let step = step.into();
        Self {
            status: RunStatus::TimedOut,
            failure: Some(kind),
            error_message: Some(format!("Step '{}' timed out", step)),
            failed_step: Some(step),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::TimedOut.is_terminal());
    }

    #[test]
    fn test_run_result_constructors() {
        let ok = RunResult::succeeded();
        assert!(ok.is_success());
        assert!(ok.failure.is_none());

        let failed = RunResult::failed(FailureKind::Test, "pytest", "exit code 1");
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.failure, Some(FailureKind::Test));
        assert_eq!(failed.failed_step.as_deref(), Some("pytest"));

        let timed_out = RunResult::timed_out(FailureKind::Deployment, "serve");
        assert_eq!(timed_out.status, RunStatus::TimedOut);
        assert!(timed_out.error_message.unwrap().contains("serve"));
    }
}
