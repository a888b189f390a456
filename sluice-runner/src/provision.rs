//! Environment provisioner
//!
//! Produces a ready-to-use execution environment in the run's workspace:
//! 1. checkout of the repository at the triggering revision
//! 2. the pinned Python runtime, as a virtual environment
//! 3. the package, installed in editable mode
//! 4. the development dependency list
//!
//! Steps run strictly in order; the first failure ends provisioning.

use std::sync::Arc;
use tracing::info;

use crate::cancel::RunToken;
use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::process::{CommandRunner, CommandSpec};
use crate::step::{RetryPolicy, StepError, retry};

pub const STEP_CHECKOUT: &str = "checkout";
pub const STEP_CHECKOUT_REVISION: &str = "checkout-revision";
pub const STEP_SETUP_PYTHON: &str = "setup-python";
pub const STEP_INSTALL_PACKAGE: &str = "install-package";
pub const STEP_INSTALL_DEV_DEPENDENCIES: &str = "install-dev-dependencies";

pub struct Provisioner {
    config: RunnerConfig,
    runner: Arc<dyn CommandRunner>,
}

impl Provisioner {
    pub fn new(config: RunnerConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// The ordered provisioning commands for a run
    pub fn plan(&self, ctx: &RunContext, revision: Option<&str>) -> Vec<CommandSpec> {
        let workspace = ctx.workspace.path();
        let mut steps = Vec::with_capacity(5);

        steps.push(
            CommandSpec::new(STEP_CHECKOUT, "git")
                .args(["clone", "--quiet", self.config.repository.as_str()])
                .arg(workspace.to_string_lossy()),
        );

        if let Some(revision) = revision {
            steps.push(
                CommandSpec::new(STEP_CHECKOUT_REVISION, "git")
                    .args(["checkout", "--quiet", "--detach", revision])
                    .current_dir(workspace),
            );
        }

        steps.push(
            CommandSpec::new(STEP_SETUP_PYTHON, &self.config.python)
                .args(["-m", "venv", ".venv"])
                .current_dir(workspace),
        );

        steps.push(
            CommandSpec::new(
                STEP_INSTALL_PACKAGE,
                ctx.workspace.venv_bin("pip").to_string_lossy(),
            )
            .args(["install", "-e", "."])
            .current_dir(workspace),
        );

        steps.push(
            CommandSpec::new(
                STEP_INSTALL_DEV_DEPENDENCIES,
                ctx.workspace.venv_bin("pip").to_string_lossy(),
            )
            .args(["install", "-r", self.config.dev_requirements.as_str()])
            .current_dir(workspace),
        );

        steps
    }

    /// Runs every provisioning step, stopping at the first failure
    pub async fn provision(
        &self,
        ctx: &RunContext,
        token: &RunToken,
        revision: Option<&str>,
    ) -> Result<(), StepError> {
        let policy: RetryPolicy = self.config.provision_policy();
        let steps = self.plan(ctx, revision);

        info!(
            "Provisioning run {} (python {}, {} steps)",
            ctx.run_id,
            self.config.python_version,
            steps.len()
        );

        for spec in &steps {
            if token.is_cancelled() {
                return Err(StepError::Cancelled {
                    step: spec.step.clone(),
                });
            }

            ctx.log_info(format!("Starting step: {}", spec.step));

            retry(&policy, ctx, token, &spec.step, || async move {
                // A failed clone may leave a partial checkout behind
                if spec.step == STEP_CHECKOUT {
                    remove_partial_checkout(ctx)?;
                }
                self.runner.run(spec, ctx, token).await?.check(spec)
            })
            .await?;

            ctx.log_info(format!("Step '{}' completed", spec.step));
        }

        Ok(())
    }
}

fn remove_partial_checkout(ctx: &RunContext) -> Result<(), StepError> {
    match std::fs::remove_dir_all(ctx.workspace.path()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StepError::Workspace(e)),
    }
}
