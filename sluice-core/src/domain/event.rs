//! Trigger event domain types
//!
//! A trigger event is the immutable input that decides which pipelines start.

use serde::{Deserialize, Serialize};

/// An incoming event that may start one or more pipeline runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// A push to a branch (or a tag, in which case `branch` is `None`)
    Push {
        branch: Option<String>,
        revision: Option<String>,
    },

    /// A pull-request lifecycle event
    PullRequest {
        action: PullRequestAction,
        head_ref: String,
        revision: Option<String>,
    },

    /// An operator asking for a workflow by name
    ManualDispatch {
        workflow: String,
        revision: Option<String>,
    },
}

impl TriggerEvent {
    /// Revision to check out for runs started by this event
    pub fn revision(&self) -> Option<&str> {
        match self {
            TriggerEvent::Push { revision, .. }
            | TriggerEvent::PullRequest { revision, .. }
            | TriggerEvent::ManualDispatch { revision, .. } => revision.as_deref(),
        }
    }

    /// Pull-request head reference, if this is a pull-request event
    pub fn head_ref(&self) -> Option<&str> {
        match self {
            TriggerEvent::PullRequest { head_ref, .. } => Some(head_ref.as_str()),
            _ => None,
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerEvent::Push { .. } => "push",
            TriggerEvent::PullRequest { .. } => "pull_request",
            TriggerEvent::ManualDispatch { .. } => "manual_dispatch",
        }
    }
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerEvent::Push { branch, .. } => match branch {
                Some(branch) => write!(f, "push to {}", branch),
                None => write!(f, "push (no branch)"),
            },
            TriggerEvent::PullRequest {
                action, head_ref, ..
            } => write!(f, "pull request {} ({})", action, head_ref),
            TriggerEvent::ManualDispatch { workflow, .. } => {
                write!(f, "manual dispatch of {}", workflow)
            }
        }
    }
}

/// Pull-request lifecycle action as reported by the repository host
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PullRequestAction {
    Assigned,
    Unassigned,
    Opened,
    Edited,
    Closed,
    Reopened,
    Synchronize,
    Labeled,
    Unlabeled,
    ReadyForReview,
    ConvertedToDraft,
    ReviewRequested,
    /// Any action this service does not know about
    Other(String),
}

impl PullRequestAction {
    pub fn as_str(&self) -> &str {
        match self {
            PullRequestAction::Assigned => "assigned",
            PullRequestAction::Unassigned => "unassigned",
            PullRequestAction::Opened => "opened",
            PullRequestAction::Edited => "edited",
            PullRequestAction::Closed => "closed",
            PullRequestAction::Reopened => "reopened",
            PullRequestAction::Synchronize => "synchronize",
            PullRequestAction::Labeled => "labeled",
            PullRequestAction::Unlabeled => "unlabeled",
            PullRequestAction::ReadyForReview => "ready_for_review",
            PullRequestAction::ConvertedToDraft => "converted_to_draft",
            PullRequestAction::ReviewRequested => "review_requested",
            PullRequestAction::Other(other) => other.as_str(),
        }
    }
}

impl From<String> for PullRequestAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "assigned" => PullRequestAction::Assigned,
            "unassigned" => PullRequestAction::Unassigned,
            "opened" => PullRequestAction::Opened,
            "edited" => PullRequestAction::Edited,
            "closed" => PullRequestAction::Closed,
            "reopened" => PullRequestAction::Reopened,
            "synchronize" => PullRequestAction::Synchronize,
            "labeled" => PullRequestAction::Labeled,
            "unlabeled" => PullRequestAction::Unlabeled,
            "ready_for_review" => PullRequestAction::ReadyForReview,
            "converted_to_draft" => PullRequestAction::ConvertedToDraft,
            "review_requested" => PullRequestAction::ReviewRequested,
            _ => PullRequestAction::Other(value),
        }
    }
}

impl From<&str> for PullRequestAction {
    fn from(value: &str) -> Self {
        PullRequestAction::from(value.to_string())
    }
}

impl From<PullRequestAction> for String {
    fn from(action: PullRequestAction) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for PullRequestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
