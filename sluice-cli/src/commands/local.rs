//! Local execution
//!
//! Runs one workflow in-process with the runner library, the same chain the
//! orchestrator executes. Configuration and credentials come from the
//! environment; Ctrl-C cancels the run at its next step boundary.

use anyhow::{Result, anyhow, bail};
use colored::*;
use sluice_core::domain::event::TriggerEvent;
use sluice_core::domain::secret::CredentialSet;
use sluice_core::domain::workflow::{WorkflowDefinition, WorkflowKind};
use sluice_runner::{Epoch, PipelineExecutor, RunContext, RunnerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::commands::display::{print_log_entry, print_result};

const LOG_PRINT_INTERVAL: Duration = Duration::from_millis(200);

pub async fn run_local(workflow: &str, revision: Option<String>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let kind: WorkflowKind = workflow.parse().map_err(|e: String| anyhow!(e))?;
    let definition = definition_for(kind);

    let config = RunnerConfig::from_env()?;
    config.validate()?;

    let trigger = TriggerEvent::ManualDispatch {
        workflow: kind.name().to_string(),
        revision,
    };
    let executor = PipelineExecutor::new(config, CredentialSet::from_env());
    let run_id = Uuid::new_v4();

    println!(
        "{}",
        format!("Running {} locally (run {})", kind, run_id).bold()
    );
    println!("{}", "─".repeat(80).dimmed());

    let result = match executor.prepare(run_id, &definition) {
        Err(result) => result,
        Ok(ctx) => {
            let ctx = Arc::new(ctx);
            let epoch = Epoch::new();
            let token = epoch.issue();

            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("{}", "Interrupted, cancelling run...".yellow());
                    epoch.bump();
                }
            });
            let printer = spawn_log_printer(Arc::clone(&ctx));

            let result = executor.execute(&definition, &trigger, &ctx, &token).await;

            printer.abort();
            interrupt.abort();
            for entry in ctx.drain_logs() {
                print_log_entry(&entry);
            }
            result
        }
    };

    println!("{}", "─".repeat(80).dimmed());
    print_result(&result);

    if !result.is_success() {
        bail!("{} run finished with status {}", kind, result.status);
    }

    Ok(())
}

/// Local runs execute whatever workflow was asked for, regardless of triggers
fn definition_for(kind: WorkflowKind) -> WorkflowDefinition {
    match kind {
        WorkflowKind::Integration => WorkflowDefinition::integration("main"),
        WorkflowKind::Deploy => WorkflowDefinition::deploy(),
    }
}

fn spawn_log_printer(ctx: Arc<RunContext>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LOG_PRINT_INTERVAL);

        loop {
            ticker.tick().await;
            for entry in ctx.drain_logs() {
                print_log_entry(&entry);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_for_declares_credentials() {
        for kind in [WorkflowKind::Integration, WorkflowKind::Deploy] {
            let definition = definition_for(kind);
            assert_eq!(definition.kind, kind);
            assert_eq!(definition.required_secrets.len(), 2);
        }
    }
}
