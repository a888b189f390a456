//! Run DTOs for the orchestrator API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{FailureKind, Run, RunStatus};
use crate::domain::workflow::WorkflowKind;

/// Request to start a workflow by hand
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Revision to check out (defaults to the repository's default branch head)
    #[serde(default)]
    pub revision: Option<String>,
}

/// Lightweight run summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub workflow: WorkflowKind,
    pub key: String,
    pub trigger: String,
    pub status: RunStatus,
    pub failure: Option<FailureKind>,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<Run> for RunSummary {
    fn from(run: Run) -> Self {
        Self {
            id: run.id,
            workflow: run.workflow,
            key: run.key.to_string(),
            trigger: run.trigger.to_string(),
            status: run.status,
            failure: run.result.as_ref().and_then(|r| r.failure),
            requested_at: run.requested_at,
            completed_at: run.completed_at,
        }
    }
}

/// Response to an accepted event: the runs it started (possibly none)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAccepted {
    pub runs: Vec<RunSummary>,
}
