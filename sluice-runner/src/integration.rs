//! Integration runner
//!
//! Runs the test suite of a provisioned workspace. Tests exercise the
//! platform with live credentials, so the step is never retried.

use std::sync::Arc;
use tracing::info;

use crate::cancel::RunToken;
use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::process::{CommandRunner, CommandSpec};
use crate::step::StepError;

pub const STEP_TESTS: &str = "tests";

pub struct IntegrationRunner {
    config: RunnerConfig,
    runner: Arc<dyn CommandRunner>,
}

impl IntegrationRunner {
    pub fn new(config: RunnerConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn command(&self, ctx: &RunContext) -> CommandSpec {
        CommandSpec::new(STEP_TESTS, ctx.workspace.venv_bin("pytest").to_string_lossy())
            .args(["-vvv", self.config.tests_dir.as_str()])
            .current_dir(ctx.workspace.path())
    }

    /// Exit code 0 means every test passed; anything else is a failure
    pub async fn run_tests(&self, ctx: &RunContext, token: &RunToken) -> Result<(), StepError> {
        if token.is_cancelled() {
            return Err(StepError::Cancelled {
                step: STEP_TESTS.to_string(),
            });
        }

        let spec = self.command(ctx);
        ctx.log_info(format!("Starting step: {}", spec.step));

        let output = self.runner.run(&spec, ctx, token).await?;
        info!(
            "Run {} test suite finished with exit code {}",
            ctx.run_id, output.exit_code
        );
        output.check(&spec)?;

        ctx.log_info("All tests passed");
        Ok(())
    }
}
