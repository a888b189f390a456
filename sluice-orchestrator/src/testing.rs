//! Test doubles shared by the orchestrator's unit tests

use async_trait::async_trait;
use sluice_core::domain::run::Run;
use sluice_core::domain::secret::{CredentialSet, FAL_KEY_ID, FAL_KEY_SECRET};
use sluice_core::domain::workflow::WorkflowDefinition;
use sluice_runner::platform::FalCli;
use sluice_runner::{
    CommandOutput, CommandRunner, CommandSpec, PipelineExecutor, RunContext, RunToken,
    RunnerConfig, StepError,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::service::{RunService, ServiceSettings};

/// Succeeds after `step_delay`, except for `hang_step` which waits for
/// cancellation and `fail_step` which exits 1. Every step logs one line.
#[derive(Default)]
pub struct FakeRunner {
    pub hang_step: Option<&'static str>,
    pub fail_step: Option<&'static str>,
    pub step_delay: Option<Duration>,
    pub steps: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        ctx: &RunContext,
        token: &RunToken,
    ) -> Result<CommandOutput, StepError> {
        self.steps.lock().unwrap().push(spec.step.clone());

        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }

        if self.hang_step == Some(spec.step.as_str()) {
            token.cancelled().await;
            return Err(StepError::Cancelled {
                step: spec.step.clone(),
            });
        }

        let exit_code = if self.fail_step == Some(spec.step.as_str()) { 1 } else { 0 };
        ctx.log_info(format!("{} finished", spec.step));
        Ok(CommandOutput {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// A run service with the default workflows executing against `runner`
pub fn service(runner: FakeRunner) -> (RunService, Arc<FakeRunner>) {
    service_with_settings(runner, ServiceSettings::default())
}

pub fn service_with_settings(
    runner: FakeRunner,
    settings: ServiceSettings,
) -> (RunService, Arc<FakeRunner>) {
    let runner = Arc::new(runner);
    let mut config = RunnerConfig::new("https://example.com/repo.git");
    config.workspace_base =
        std::env::temp_dir().join(format!("sluice-orchestrator-{}", Uuid::new_v4()));
    let credentials = CredentialSet::new()
        .with(FAL_KEY_ID, "id")
        .with(FAL_KEY_SECRET, "secret");
    let platform = Arc::new(FalCli::new("fal", runner.clone()));
    let executor = PipelineExecutor::with_components(config, credentials, runner.clone(), platform);

    (
        RunService::with_settings(executor, WorkflowDefinition::defaults("main"), settings),
        runner,
    )
}

/// Polls until run `id` reaches a terminal status
pub async fn wait_terminal(service: &RunService, id: Uuid) -> Run {
    for _ in 0..200 {
        let run = service.get_run(id).await.unwrap();
        if run.status.is_terminal() {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {} did not finish", id);
}
