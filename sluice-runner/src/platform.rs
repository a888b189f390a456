//! Serverless platform seam
//!
//! The platform owns the alias; this crate only calls it. Alias updates are
//! remote operations with the platform's own atomicity, so nothing here
//! locks or tracks alias state locally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::cancel::RunToken;
use crate::context::RunContext;
use crate::process::{CommandRunner, CommandSpec};
use crate::step::StepError;

pub const STEP_UPDATE_ALIAS: &str = "update-alias";
pub const STEP_SERVE: &str = "serve";

/// Who may call the served function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    Shared,
    Private,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Shared => "shared",
            AuthMode::Private => "private",
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shared" => Ok(AuthMode::Shared),
            "private" => Ok(AuthMode::Private),
            other => Err(format!(
                "Unknown auth mode '{}' (expected 'shared' or 'private')",
                other
            )),
        }
    }
}

/// The function entry point to serve and the alias it is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeTarget {
    pub module_path: String,
    pub entry_point: String,
    pub alias: String,
    pub auth: AuthMode,
}

/// Operations the deployment pipeline needs from the platform
#[async_trait]
pub trait Platform: Send + Sync {
    /// Points `alias` at the newly built function with a minimum keep-alive window
    async fn update_alias(
        &self,
        alias: &str,
        keep_alive_seconds: u64,
        ctx: &RunContext,
        token: &RunToken,
    ) -> Result<(), StepError>;

    /// Starts serving `target`
    async fn serve(
        &self,
        target: &ServeTarget,
        ctx: &RunContext,
        token: &RunToken,
    ) -> Result<(), StepError>;
}

/// Drives the platform through its CLI, installed in the run's virtual environment
pub struct FalCli {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl FalCli {
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    fn program(&self, ctx: &RunContext) -> String {
        // Bare names resolve to the venv copy installed by the dev requirements
        if self.program.contains('/') {
            self.program.clone()
        } else {
            ctx.workspace.venv_bin(&self.program).to_string_lossy().into_owned()
        }
    }

    pub fn alias_update_command(&self, alias: &str, keep_alive_seconds: u64, ctx: &RunContext) -> CommandSpec {
        CommandSpec::new(STEP_UPDATE_ALIAS, self.program(ctx))
            .args(["fn", "alias", "update", alias])
            .arg("--keep-alive")
            .arg(keep_alive_seconds.to_string())
            .current_dir(ctx.workspace.path())
    }

    pub fn serve_command(&self, target: &ServeTarget, ctx: &RunContext) -> CommandSpec {
        CommandSpec::new(STEP_SERVE, self.program(ctx))
            .args([
                "fn",
                "serve",
                target.module_path.as_str(),
                target.entry_point.as_str(),
                "--alias",
                target.alias.as_str(),
                "--auth",
                target.auth.as_str(),
            ])
            .current_dir(ctx.workspace.path())
    }
}

#[async_trait]
impl Platform for FalCli {
    async fn update_alias(
        &self,
        alias: &str,
        keep_alive_seconds: u64,
        ctx: &RunContext,
        token: &RunToken,
    ) -> Result<(), StepError> {
        let spec = self.alias_update_command(alias, keep_alive_seconds, ctx);
        self.runner.run(&spec, ctx, token).await?.check(&spec)?;
        Ok(())
    }

    async fn serve(
        &self,
        target: &ServeTarget,
        ctx: &RunContext,
        token: &RunToken,
    ) -> Result<(), StepError> {
        let spec = self.serve_command(target, ctx);
        self.runner.run(&spec, ctx, token).await?.check(&spec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeploySettings;
    use crate::testing::{ScriptedRunner, test_context};

    #[test]
    fn test_auth_mode_parsing() {
        assert_eq!("shared".parse::<AuthMode>().unwrap(), AuthMode::Shared);
        assert_eq!("PRIVATE".parse::<AuthMode>().unwrap(), AuthMode::Private);
        assert!("public".parse::<AuthMode>().is_err());
    }

    #[test]
    fn test_commands() {
        let ctx = test_context();
        let fal = FalCli::new("fal", Arc::new(ScriptedRunner::new()));

        let alias = fal.alias_update_command("lora", 60, &ctx);
        assert!(alias.program.ends_with(".venv/bin/fal"));
        assert_eq!(
            alias.args,
            vec!["fn", "alias", "update", "lora", "--keep-alive", "60"]
        );

        let serve = fal.serve_command(&DeploySettings::default().serve_target(), &ctx);
        assert_eq!(
            serve.args,
            vec![
                "fn",
                "serve",
                "text_to_image/model.py",
                "generate_image",
                "--alias",
                "lora",
                "--auth",
                "shared"
            ]
        );
    }

    #[test]
    fn test_absolute_program_is_kept() {
        let ctx = test_context();
        let fal = FalCli::new("/opt/fal/bin/fal", Arc::new(ScriptedRunner::new()));
        assert_eq!(fal.alias_update_command("lora", 60, &ctx).program, "/opt/fal/bin/fal");
    }

    #[tokio::test]
    async fn test_failed_alias_update_is_an_error() {
        let ctx = test_context();
        let runner = Arc::new(ScriptedRunner::new().exits(STEP_UPDATE_ALIAS, &[1]));
        let fal = FalCli::new("fal", runner);

        let err = fal
            .update_alias("lora", 60, &ctx, &RunToken::detached())
            .await
            .unwrap_err();
        assert_eq!(err.step(), Some(STEP_UPDATE_ALIAS));
    }
}
