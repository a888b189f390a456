//! Run Service
//!
//! Turns trigger events into runs: evaluates the workflows, admits each run
//! through the concurrency gate, executes it in the background and records
//! its logs and terminal result.

use sluice_core::domain::event::TriggerEvent;
use sluice_core::domain::log::{LogEntry, LogLevel};
use sluice_core::domain::run::{Run, RunResult};
use sluice_core::domain::workflow::{WorkflowDefinition, WorkflowKind};
use sluice_core::gate;
use sluice_runner::{PipelineExecutor, RunContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::repository::RunRepository;
use crate::repository::run::DEFAULT_RETENTION;
use crate::service::gate::{ConcurrencyGate, GateEntry, GatePass};

const LOG_FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Tunables of a [`RunService`]
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    /// Runs kept in history before the oldest finished ones are dropped
    pub run_retention: usize,
    pub log_flush_interval: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            run_retention: DEFAULT_RETENTION,
            log_flush_interval: LOG_FLUSH_INTERVAL,
        }
    }
}

/// Service error type
#[derive(Debug)]
pub enum RunError {
    NotFound(Uuid),
    UnknownWorkflow(String),
    NotDispatchable(String),
    InvalidState(String),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::NotFound(id) => write!(f, "Run {} not found", id),
            RunError::UnknownWorkflow(name) => write!(f, "Unknown workflow '{}'", name),
            RunError::NotDispatchable(name) => {
                write!(f, "Workflow '{}' cannot be started manually", name)
            }
            RunError::InvalidState(msg) => f.write_str(msg),
        }
    }
}

#[derive(Clone)]
pub struct RunService {
    inner: Arc<Inner>,
}

struct Inner {
    repository: RunRepository,
    gate: ConcurrencyGate,
    executor: PipelineExecutor,
    workflows: Vec<WorkflowDefinition>,
    log_flush_interval: Duration,
}

/// Background task moving a run's buffered logs into the repository
struct LogFlusher {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl LogFlusher {
    /// Stops the task after its final drain and waits for it
    async fn finish(self, ctx: &RunContext, repository: &RunRepository, run_id: Uuid) {
        let _ = self.stop.send(());

        if let Err(e) = self.handle.await {
            error!("Log flusher for run {} failed: {}", run_id, e);
            repository.add_logs(run_id, ctx.drain_logs()).await;
        }
    }
}

impl RunService {
    pub fn with_settings(
        executor: PipelineExecutor,
        workflows: Vec<WorkflowDefinition>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repository: RunRepository::with_retention(settings.run_retention),
                gate: ConcurrencyGate::new(),
                executor,
                workflows,
                log_flush_interval: settings.log_flush_interval,
            }),
        }
    }

    /// Starts one run per workflow accepting `event`; returns them queued
    pub async fn handle_event(&self, event: TriggerEvent) -> Vec<Run> {
        let admissions = gate::evaluate(&event, &self.inner.workflows);

        if admissions.is_empty() {
            debug!("No workflow accepts {}", event);
            return Vec::new();
        }

        let mut runs = Vec::with_capacity(admissions.len());
        for admission in admissions {
            let Some(workflow) = self.find_workflow(admission.workflow) else {
                continue;
            };

            let run = Run::queued(
                admission.run_id,
                admission.workflow,
                admission.key.clone(),
                event.clone(),
            );
            self.inner.repository.insert(run.clone()).await;

            let entry = self.inner.gate.admit(&admission.key, run.id);
            info!(
                "Run {} queued: {} for {} (group {})",
                run.id, run.workflow, event, run.key
            );

            tokio::spawn(self.clone().execute_run(workflow.clone(), run.clone(), entry));
            runs.push(run);
        }

        runs
    }

    /// Starts `workflow` by hand at `revision`
    pub async fn dispatch(&self, workflow: &str, revision: Option<String>) -> Result<Run, RunError> {
        let kind: WorkflowKind = workflow
            .parse()
            .map_err(|_| RunError::UnknownWorkflow(workflow.to_string()))?;

        let definition = self
            .find_workflow(kind)
            .ok_or_else(|| RunError::UnknownWorkflow(workflow.to_string()))?;

        if !definition.manual_dispatch {
            return Err(RunError::NotDispatchable(kind.name().to_string()));
        }

        let event = TriggerEvent::ManualDispatch {
            workflow: kind.name().to_string(),
            revision,
        };

        self.handle_event(event)
            .await
            .into_iter()
            .find(|run| run.workflow == kind)
            .ok_or_else(|| RunError::NotDispatchable(kind.name().to_string()))
    }

    pub async fn get_run(&self, id: Uuid) -> Result<Run, RunError> {
        self.inner
            .repository
            .find_by_id(id)
            .await
            .ok_or(RunError::NotFound(id))
    }

    pub async fn list_runs(&self) -> Vec<Run> {
        self.inner.repository.list_all().await
    }

    pub async fn get_logs(&self, id: Uuid) -> Result<Vec<LogEntry>, RunError> {
        self.inner
            .repository
            .find_logs(id)
            .await
            .ok_or(RunError::NotFound(id))
    }

    /// Requests cancellation; the run stops at its next step boundary
    pub async fn cancel(&self, id: Uuid) -> Result<Run, RunError> {
        let run = self.get_run(id).await?;

        if run.status.is_terminal() {
            return Err(RunError::InvalidState(format!(
                "Cannot cancel run {} in state {}",
                id, run.status
            )));
        }

        if self.inner.gate.cancel(id) {
            info!("Cancellation requested for run {}", id);
        } else {
            debug!("Run {} was already superseded", id);
        }

        Ok(run)
    }

    fn find_workflow(&self, kind: WorkflowKind) -> Option<&WorkflowDefinition> {
        self.inner.workflows.iter().find(|w| w.kind == kind)
    }

    async fn execute_run(self, workflow: WorkflowDefinition, run: Run, entry: GateEntry) {
        let pass = entry.acquire().await;
        let token = pass.token().clone();
        let repository = &self.inner.repository;

        let result = if token.is_cancelled() {
            info!("Run {} cancelled before it started", run.id);
            RunResult {
                error_message: Some("Cancelled before start (superseded or cancelled)".to_string()),
                ..RunResult::cancelled(None)
            }
        } else {
            repository.mark_running(run.id).await;

            match self.inner.executor.prepare(run.id, &workflow) {
                Err(result) => result,
                Ok(ctx) => {
                    let ctx = Arc::new(ctx);
                    let flusher = self.spawn_log_flusher(run.id, Arc::clone(&ctx));

                    let result = self
                        .inner
                        .executor
                        .execute(&workflow, &run.trigger, &ctx, &token)
                        .await;

                    flusher.finish(&ctx, repository, run.id).await;
                    return self.finish(run.id, result, pass).await;
                }
            }
        };

        // Never reached the executor: record why
        if let Some(message) = &result.error_message {
            repository
                .add_logs(run.id, vec![LogEntry::new(LogLevel::Error, message.clone())])
                .await;
        }

        self.finish(run.id, result, pass).await;
    }

    async fn finish(&self, run_id: Uuid, result: RunResult, pass: GatePass) {
        match self.inner.repository.complete(run_id, result).await {
            Some(done) => info!("Run {} finished: {}", done.id, done.status),
            None => error!("Run {} vanished before completion", run_id),
        }

        self.inner.gate.release(pass);
    }

    /// Moves buffered log entries into the repository at a fixed interval.
    ///
    /// The task is only ever stopped between flushes, so drained entries
    /// always reach the repository.
    fn spawn_log_flusher(&self, run_id: Uuid, ctx: Arc<RunContext>) -> LogFlusher {
        let service = self.clone();
        let interval = self.inner.log_flush_interval;
        let (stop, mut stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);

            loop {
                let last = tokio::select! {
                    _ = ticker.tick() => false,
                    _ = &mut stopped => true,
                };

                let logs = ctx.drain_logs();
                if !logs.is_empty() {
                    debug!("Flushing {} log entries for run {}", logs.len(), run_id);
                    service.inner.repository.add_logs(run_id, logs).await;
                }

                if last {
                    break;
                }
            }
        });

        LogFlusher { stop, handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRunner, service, service_with_settings, wait_terminal};
    use sluice_core::domain::event::PullRequestAction;
    use sluice_core::domain::run::{FailureKind, RunStatus};

    fn pull_request(action: &str) -> TriggerEvent {
        TriggerEvent::PullRequest {
            action: PullRequestAction::from(action),
            head_ref: "feature".to_string(),
            revision: None,
        }
    }

    #[tokio::test]
    async fn test_push_to_main_runs_integration() {
        let (service, _) = service(FakeRunner::default());
        let runs = service
            .handle_event(TriggerEvent::Push {
                branch: Some("main".to_string()),
                revision: None,
            })
            .await;

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].workflow, WorkflowKind::Integration);

        let run = wait_terminal(&service, runs[0].id).await;
        assert_eq!(run.status, RunStatus::Succeeded);
        let logs = service.get_logs(run.id).await.unwrap();
        assert!(logs.iter().any(|e| e.message == "All tests passed"));
    }

    #[tokio::test]
    async fn test_unaccepted_events_start_nothing() {
        let (service, _) = service(FakeRunner::default());
        assert!(service.handle_event(pull_request("closed")).await.is_empty());
        assert!(
            service
                .handle_event(TriggerEvent::Push {
                    branch: Some("feature".to_string()),
                    revision: None,
                })
                .await
                .is_empty()
        );
        assert!(service.list_runs().await.is_empty());
    }

    #[tokio::test]
    async fn test_newer_pull_request_run_supersedes_older() {
        let (service, _) = service(FakeRunner {
            hang_step: Some("tests"),
            ..Default::default()
        });

        let first = service.handle_event(pull_request("opened")).await.remove(0);
        // Let the first run reach its test step
        for _ in 0..200 {
            if service.get_run(first.id).await.unwrap().status == RunStatus::Running {
                break;
            }
            time::sleep(Duration::from_millis(5)).await;
        }

        let second = service
            .handle_event(pull_request("synchronize"))
            .await
            .remove(0);
        assert_eq!(first.key, second.key);

        let first = wait_terminal(&service, first.id).await;
        assert_eq!(first.status, RunStatus::Cancelled);

        // The second run also hangs in tests until cancelled by hand
        service.cancel(second.id).await.unwrap();
        let second = wait_terminal(&service, second.id).await;
        assert_eq!(second.status, RunStatus::Cancelled);
        assert!(second.started_at.unwrap() >= first.completed_at.unwrap());
    }

    #[tokio::test]
    async fn test_dispatch() {
        let (service, runner) = service(FakeRunner::default());

        let err = service.dispatch("integration", None).await.unwrap_err();
        assert!(matches!(err, RunError::NotDispatchable(_)));
        let err = service.dispatch("release", None).await.unwrap_err();
        assert!(matches!(err, RunError::UnknownWorkflow(_)));

        let run = service
            .dispatch("deploy", Some("abc123".to_string()))
            .await
            .unwrap();
        assert_eq!(run.workflow, WorkflowKind::Deploy);
        assert!(run.key.as_str().starts_with(&run.id.to_string()));

        let run = wait_terminal(&service, run.id).await;
        assert_eq!(run.status, RunStatus::Succeeded);
        let steps = runner.steps();
        assert!(steps.ends_with(&["update-alias".to_string(), "serve".to_string()]));
    }

    #[tokio::test]
    async fn test_failed_run_records_failure() {
        let (service, _) = service(FakeRunner {
            fail_step: Some("install-dev-dependencies"),
            ..Default::default()
        });

        let run = service.dispatch("deploy", None).await.unwrap();
        let run = wait_terminal(&service, run.id).await;

        assert_eq!(run.status, RunStatus::Failed);
        let result = run.result.unwrap();
        assert_eq!(result.failure, Some(FailureKind::Provisioning));
        assert_eq!(result.failed_step.as_deref(), Some("install-dev-dependencies"));
    }

    #[tokio::test]
    async fn test_no_log_entry_lost_while_flushing() {
        let (service, runner) = service_with_settings(
            FakeRunner {
                step_delay: Some(Duration::from_millis(2)),
                ..Default::default()
            },
            ServiceSettings {
                log_flush_interval: Duration::from_millis(1),
                ..Default::default()
            },
        );

        let run = service.dispatch("deploy", None).await.unwrap();

        // Keep the log store busy with readers while the run flushes
        let reader = {
            let service = service.clone();
            let id = run.id;
            tokio::spawn(async move {
                loop {
                    let _ = service.get_logs(id).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let run = wait_terminal(&service, run.id).await;
        reader.abort();
        assert_eq!(run.status, RunStatus::Succeeded);

        let logs = service.get_logs(run.id).await.unwrap();
        let steps = runner.steps();
        assert!(!steps.is_empty());
        for step in steps {
            let line = format!("{} finished", step);
            assert!(
                logs.iter().any(|e| e.message == line),
                "missing output of {}",
                step
            );
        }
    }

    #[tokio::test]
    async fn test_cancel_finished_run_is_rejected() {
        let (service, _) = service(FakeRunner::default());
        let run = service.dispatch("deploy", None).await.unwrap();
        wait_terminal(&service, run.id).await;

        let err = service.cancel(run.id).await.unwrap_err();
        assert!(matches!(err, RunError::InvalidState(_)));
        let err = service.cancel(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RunError::NotFound(_)));
    }
}
