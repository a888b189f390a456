//! Repository-host webhook payloads
//!
//! Only the fields the gate consumes are modelled: the pushed ref and
//! revision, and for pull requests the action and head reference.

use serde::Deserialize;
use thiserror::Error;

use crate::domain::event::{PullRequestAction, TriggerEvent};

/// Event-name header sent with every delivery
pub const EVENT_HEADER: &str = "X-GitHub-Event";

const BRANCH_PREFIX: &str = "refs/heads/";
const TAG_PREFIX: &str = "refs/tags/";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Malformed {event} payload: {source}")]
    Malformed {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// `push` delivery
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub after: Option<String>,
}

/// `pull_request` delivery
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    pub action: String,
    pub pull_request: PullRequestBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestBody {
    pub head: PullRequestHead,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestHead {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub sha: Option<String>,
}

/// `workflow_dispatch` delivery
///
/// `workflow` is the path of the workflow file, e.g. `.github/workflows/deploy.yml`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDispatchPayload {
    pub workflow: String,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
}

/// Branch name of a `refs/heads/...` ref, `None` for tags and other refs
pub fn branch_from_ref(git_ref: &str) -> Option<String> {
    git_ref.strip_prefix(BRANCH_PREFIX).map(str::to_string)
}

/// Branch or tag name of a ref, usable as a checkout target; other refs pass through
pub fn revision_from_ref(git_ref: &str) -> String {
    git_ref
        .strip_prefix(BRANCH_PREFIX)
        .or_else(|| git_ref.strip_prefix(TAG_PREFIX))
        .unwrap_or(git_ref)
        .to_string()
}

/// Workflow name from a workflow file path (`.github/workflows/deploy.yml` -> `deploy`)
pub fn workflow_from_path(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = file
        .strip_suffix(".yml")
        .or_else(|| file.strip_suffix(".yaml"))
        .unwrap_or(file);
    stem.to_string()
}

/// Turns a delivery into a trigger event.
///
/// Event names the gate does not care about return `Ok(None)`.
pub fn parse_event(event_name: &str, body: &[u8]) -> Result<Option<TriggerEvent>, WebhookError> {
    let malformed = |source| WebhookError::Malformed {
        event: event_name.to_string(),
        source,
    };

    match event_name {
        "push" => {
            let payload: PushPayload = serde_json::from_slice(body).map_err(malformed)?;
            Ok(Some(TriggerEvent::Push {
                branch: branch_from_ref(&payload.git_ref),
                revision: payload.after,
            }))
        }
        "pull_request" => {
            let payload: PullRequestPayload = serde_json::from_slice(body).map_err(malformed)?;
            Ok(Some(TriggerEvent::PullRequest {
                action: PullRequestAction::from(payload.action),
                head_ref: payload.pull_request.head.git_ref,
                revision: payload.pull_request.head.sha,
            }))
        }
        "workflow_dispatch" => {
            let payload: WorkflowDispatchPayload =
                serde_json::from_slice(body).map_err(malformed)?;
            Ok(Some(TriggerEvent::ManualDispatch {
                workflow: workflow_from_path(&payload.workflow),
                revision: payload.git_ref.as_deref().map(revision_from_ref),
            }))
        }
        _ => Ok(None),
    }
}
