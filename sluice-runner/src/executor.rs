//! Pipeline executor
//!
//! Ties a run together as one blocking, fail-fast chain:
//! prepare (workspace + secrets) → provision → test or deploy.
//! No step starts before its predecessor succeeded, and every step boundary
//! checks the run token. Errors are mapped onto the failure taxonomy and
//! become the run's terminal result; nothing is swallowed.

use sluice_core::domain::event::TriggerEvent;
use sluice_core::domain::run::{FailureKind, RunResult, RunStatus};
use sluice_core::domain::secret::CredentialSet;
use sluice_core::domain::workflow::{WorkflowDefinition, WorkflowKind};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cancel::RunToken;
use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::deploy::DeploymentRunner;
use crate::integration::IntegrationRunner;
use crate::platform::{FalCli, Platform};
use crate::process::{CommandRunner, ProcessRunner};
use crate::provision::Provisioner;
use crate::step::StepError;
use crate::workspace::Workspace;

const PREPARE_STEP: &str = "prepare";

/// Executes workflow runs
pub struct PipelineExecutor {
    config: RunnerConfig,
    credentials: CredentialSet,
    provisioner: Provisioner,
    integration: IntegrationRunner,
    deployment: DeploymentRunner,
}

impl PipelineExecutor {
    /// Executor running real subprocesses against the real platform CLI
    pub fn new(config: RunnerConfig, credentials: CredentialSet) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new(config.step_timeout));
        let platform: Arc<dyn Platform> =
            Arc::new(FalCli::new(config.platform_bin.clone(), Arc::clone(&runner)));
        Self::with_components(config, credentials, runner, platform)
    }

    pub fn with_components(
        config: RunnerConfig,
        credentials: CredentialSet,
        runner: Arc<dyn CommandRunner>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            provisioner: Provisioner::new(config.clone(), Arc::clone(&runner)),
            integration: IntegrationRunner::new(config.clone(), runner),
            deployment: DeploymentRunner::new(config.clone(), platform),
            config,
            credentials,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Creates the run's fresh workspace and context holding exactly the
    /// secrets `workflow` declares.
    pub fn prepare(&self, run_id: Uuid, workflow: &WorkflowDefinition) -> Result<RunContext, RunResult> {
        let secrets = self
            .credentials
            .select(&workflow.required_secrets)
            .map_err(|e| failure_result(FailureKind::Provisioning, StepError::from(e)))?;

        let workspace = Workspace::create(&self.config.workspace_base, run_id)
            .map_err(|e| failure_result(FailureKind::Provisioning, StepError::from(e)))?;

        Ok(RunContext::new(run_id, workspace, secrets))
    }

    /// Runs `workflow` for `trigger` inside `ctx`; the workspace is destroyed
    /// before returning, whatever the outcome.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        trigger: &TriggerEvent,
        ctx: &RunContext,
        token: &RunToken,
    ) -> RunResult {
        info!(
            "Executing {} run {} for {}",
            workflow.name(),
            ctx.run_id,
            trigger
        );
        ctx.log_info(format!("Starting {} pipeline for {}", workflow.name(), trigger));

        let result = self.run_chain(workflow.kind, trigger, ctx, token).await;

        match result.status {
            RunStatus::Succeeded => {
                info!("Run {} succeeded", ctx.run_id);
                ctx.log_info("Pipeline completed successfully");
            }
            status => {
                let message = result.error_message.as_deref().unwrap_or("unknown error");
                error!("Run {} finished with status {}: {}", ctx.run_id, status, message);
                ctx.log_error(format!("Pipeline {}: {}", status, message));
            }
        }

        if let Err(e) = ctx.workspace.cleanup() {
            warn!("Failed to remove workspace of run {}: {}", ctx.run_id, e);
            ctx.log_warning(format!("Failed to remove workspace: {}", e));
        }

        result
    }

    async fn run_chain(
        &self,
        kind: WorkflowKind,
        trigger: &TriggerEvent,
        ctx: &RunContext,
        token: &RunToken,
    ) -> RunResult {
        if let Err(e) = self
            .provisioner
            .provision(ctx, token, trigger.revision())
            .await
        {
            return failure_result(FailureKind::Provisioning, e);
        }

        let action = match kind {
            WorkflowKind::Integration => self
                .integration
                .run_tests(ctx, token)
                .await
                .map_err(|e| failure_result(FailureKind::Test, e)),
            WorkflowKind::Deploy => self
                .deployment
                .deploy(ctx, token)
                .await
                .map_err(|e| failure_result(FailureKind::Deployment, e)),
        };

        match action {
            Ok(()) => RunResult::succeeded(),
            Err(result) => result,
        }
    }
}

/// Maps a step error onto the run's terminal result
fn failure_result(kind: FailureKind, error: StepError) -> RunResult {
    let step = error.step().unwrap_or(PREPARE_STEP).to_string();

    match error {
        StepError::Cancelled { .. } => RunResult::cancelled(Some(step)),
        StepError::TimedOut { .. } => RunResult::timed_out(kind, step),
        other => {
            let mut message = other.to_string();
            if let StepError::Failed { stderr, .. } = &other {
                if !stderr.trim().is_empty() {
                    message = format!("{}\n{}", message, stderr.trim());
                }
            }
            if kind == FailureKind::Deployment {
                message.push_str(
                    "\nNo rollback was performed; the alias is left as the platform applied it",
                );
            }
            RunResult::failed(kind, step, message)
        }
    }
}
