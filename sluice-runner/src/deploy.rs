//! Deployment runner
//!
//! Publishes the checked-out revision: first the alias is repointed with its
//! keep-alive window, then the entry point is served under that alias.
//! There is no rollback; a failed serve leaves the alias as the platform left it.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cancel::RunToken;
use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::platform::{Platform, STEP_SERVE, STEP_UPDATE_ALIAS};
use crate::step::{StepError, retry};

pub struct DeploymentRunner {
    config: RunnerConfig,
    platform: Arc<dyn Platform>,
}

impl DeploymentRunner {
    pub fn new(config: RunnerConfig, platform: Arc<dyn Platform>) -> Self {
        Self { config, platform }
    }

    pub async fn deploy(&self, ctx: &RunContext, token: &RunToken) -> Result<(), StepError> {
        let settings = &self.config.deploy;
        let policy = self.config.deploy_policy();
        let target = settings.serve_target();

        if token.is_cancelled() {
            return Err(StepError::Cancelled {
                step: STEP_UPDATE_ALIAS.to_string(),
            });
        }

        ctx.log_info(format!(
            "Updating alias '{}' (keep-alive {})",
            settings.alias, settings.keep_alive_seconds
        ));
        retry(&policy, ctx, token, STEP_UPDATE_ALIAS, || {
            self.platform
                .update_alias(&settings.alias, settings.keep_alive_seconds, ctx, token)
        })
        .await?;

        if token.is_cancelled() {
            warn!(
                "Run {} cancelled after alias '{}' was updated",
                ctx.run_id, settings.alias
            );
            return Err(StepError::Cancelled {
                step: STEP_SERVE.to_string(),
            });
        }

        ctx.log_info(format!(
            "Serving {}::{} as '{}' ({} auth)",
            target.module_path, target.entry_point, target.alias, target.auth
        ));
        retry(&policy, ctx, token, STEP_SERVE, || {
            self.platform.serve(&target, ctx, token)
        })
        .await?;

        info!("Run {} deployed alias '{}'", ctx.run_id, target.alias);
        ctx.log_info(format!("Alias '{}' is serving", target.alias));
        Ok(())
    }
}
