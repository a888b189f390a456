//! Trigger gate
//!
//! Pure decision logic for incoming events: which workflows start, and under
//! which concurrency group each run is placed. Enforcing the group (cancelling
//! the superseded run) happens in the orchestrator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::event::TriggerEvent;
use crate::domain::workflow::{WorkflowDefinition, WorkflowKind};

/// Concurrency group a run belongs to
///
/// At most one run per key is active at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyKey(String);

impl ConcurrencyKey {
    /// `head_ref_or_run_id + ":" + workflow_name`
    ///
    /// Pull requests group by head reference so that a new commit supersedes
    /// the previous run; everything else groups by its own run id.
    pub fn derive(event: &TriggerEvent, run_id: Uuid, workflow_name: &str) -> Self {
        let prefix = match event.head_ref() {
            Some(head_ref) if !head_ref.is_empty() => head_ref.to_string(),
            _ => run_id.to_string(),
        };
        Self(format!("{}:{}", prefix, workflow_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConcurrencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConcurrencyKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A run the gate decided to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub run_id: Uuid,
    pub workflow: WorkflowKind,
    pub key: ConcurrencyKey,
}

/// Evaluates `event` against every workflow and returns one admission per
/// workflow that accepts it, each with a fresh run id.
pub fn evaluate(event: &TriggerEvent, workflows: &[WorkflowDefinition]) -> Vec<Admission> {
    evaluate_with(event, workflows, Uuid::new_v4)
}

/// Same as [`evaluate`] with a caller-supplied run id source
pub fn evaluate_with(
    event: &TriggerEvent,
    workflows: &[WorkflowDefinition],
    mut next_run_id: impl FnMut() -> Uuid,
) -> Vec<Admission> {
    workflows
        .iter()
        .filter(|workflow| workflow.accepts(event))
        .map(|workflow| {
            let run_id = next_run_id();
            Admission {
                run_id,
                workflow: workflow.kind,
                key: ConcurrencyKey::derive(event, run_id, workflow.name()),
            }
        })
        .collect()
}
