//! Workflow domain types
//!
//! The two workflows this service knows about, and the rules deciding which
//! trigger events start them.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::event::{PullRequestAction, TriggerEvent};
use crate::domain::secret::{FAL_KEY_ID, FAL_KEY_SECRET};

/// Which pipeline a run belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Provision, then run the test suite
    Integration,
    /// Provision, then publish and warm the serving function
    Deploy,
}

impl WorkflowKind {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowKind::Integration => "integration",
            WorkflowKind::Deploy => "deploy",
        }
    }
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integration" => Ok(WorkflowKind::Integration),
            "deploy" => Ok(WorkflowKind::Deploy),
            other => Err(format!(
                "Unknown workflow '{}' (expected 'integration' or 'deploy')",
                other
            )),
        }
    }
}

/// Trigger rules and requirements for a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub kind: WorkflowKind,

    /// Branch whose pushes start the workflow (`None` = pushes never start it)
    pub push_branch: Option<String>,

    /// Pull-request actions that start the workflow
    pub pull_request_actions: Vec<PullRequestAction>,

    /// Whether an operator may start the workflow by name
    pub manual_dispatch: bool,

    /// Secret names injected into the run environment
    pub required_secrets: Vec<String>,
}

impl WorkflowDefinition {
    /// Integration pipeline: push to the main line or an active pull request
    pub fn integration(main_branch: impl Into<String>) -> Self {
        Self {
            kind: WorkflowKind::Integration,
            push_branch: Some(main_branch.into()),
            pull_request_actions: vec![
                PullRequestAction::Assigned,
                PullRequestAction::Opened,
                PullRequestAction::Synchronize,
                PullRequestAction::Reopened,
            ],
            manual_dispatch: false,
            required_secrets: vec![FAL_KEY_ID.to_string(), FAL_KEY_SECRET.to_string()],
        }
    }

    /// Deployment pipeline: manual dispatch only
    pub fn deploy() -> Self {
        Self {
            kind: WorkflowKind::Deploy,
            push_branch: None,
            pull_request_actions: Vec::new(),
            manual_dispatch: true,
            required_secrets: vec![FAL_KEY_ID.to_string(), FAL_KEY_SECRET.to_string()],
        }
    }

    /// Both workflows, in the order they are evaluated
    pub fn defaults(main_branch: impl Into<String>) -> Vec<Self> {
        vec![Self::integration(main_branch), Self::deploy()]
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Decides whether `event` starts this workflow
    pub fn accepts(&self, event: &TriggerEvent) -> bool {
        match event {
            TriggerEvent::Push { branch, .. } => match (&self.push_branch, branch) {
                (Some(wanted), Some(branch)) => wanted == branch,
                _ => false,
            },
            TriggerEvent::PullRequest { action, .. } => {
                self.pull_request_actions.contains(action)
            }
            TriggerEvent::ManualDispatch { workflow, .. } => {
                self.manual_dispatch && workflow.eq_ignore_ascii_case(self.name())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(branch: &str) -> TriggerEvent {
        TriggerEvent::Push {
            branch: Some(branch.to_string()),
            revision: None,
        }
    }

    fn pull_request(action: &str) -> TriggerEvent {
        TriggerEvent::PullRequest {
            action: PullRequestAction::from(action),
            head_ref: "feature".to_string(),
            revision: None,
        }
    }

    fn dispatch(workflow: &str) -> TriggerEvent {
        TriggerEvent::ManualDispatch {
            workflow: workflow.to_string(),
            revision: None,
        }
    }

    #[test]
    fn test_integration_push_only_on_main() {
        let integration = WorkflowDefinition::integration("main");
        assert!(integration.accepts(&push("main")));
        assert!(!integration.accepts(&push("develop")));
        assert!(!integration.accepts(&push("main-backup")));
        assert!(!integration.accepts(&TriggerEvent::Push {
            branch: None,
            revision: None,
        }));
    }

    #[test]
    fn test_integration_pull_request_actions() {
        let integration = WorkflowDefinition::integration("main");
        for action in ["assigned", "opened", "synchronize", "reopened"] {
            assert!(integration.accepts(&pull_request(action)), "{}", action);
        }
        for action in ["closed", "edited", "labeled", "unassigned", "something_new"] {
            assert!(!integration.accepts(&pull_request(action)), "{}", action);
        }
    }

    #[test]
    fn test_integration_is_not_dispatchable() {
        let integration = WorkflowDefinition::integration("main");
        assert!(!integration.accepts(&dispatch("integration")));
    }

    #[test]
    fn test_deploy_only_on_manual_dispatch() {
        let deploy = WorkflowDefinition::deploy();
        assert!(deploy.accepts(&dispatch("deploy")));
        assert!(deploy.accepts(&dispatch("Deploy")));
        assert!(!deploy.accepts(&dispatch("integration")));
        assert!(!deploy.accepts(&push("main")));
        for action in ["assigned", "opened", "synchronize", "reopened"] {
            assert!(!deploy.accepts(&pull_request(action)));
        }
    }

    #[test]
    fn test_workflow_kind_from_str() {
        assert_eq!(
            "deploy".parse::<WorkflowKind>().unwrap(),
            WorkflowKind::Deploy
        );
        assert_eq!(
            "Integration".parse::<WorkflowKind>().unwrap(),
            WorkflowKind::Integration
        );
        assert!("release".parse::<WorkflowKind>().is_err());
    }
}
