//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod display;
mod local;
mod run;
mod trigger;

pub use run::RunCommands;

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start a manually dispatchable workflow on the orchestrator
    Dispatch {
        /// Workflow name (e.g. deploy)
        workflow: String,

        /// Revision to check out
        #[arg(long)]
        revision: Option<String>,
    },
    /// Replay a repository-host webhook delivery from a JSON file
    Webhook {
        /// Event name (push, pull_request, workflow_dispatch)
        event: String,

        /// Path to the delivery body
        payload: PathBuf,
    },
    /// Run inspection and cancellation
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Execute a workflow in-process, without an orchestrator
    Local {
        /// Workflow name (integration or deploy)
        workflow: String,

        /// Revision to check out
        #[arg(long)]
        revision: Option<String>,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Dispatch { workflow, revision } => {
            trigger::dispatch(config, &workflow, revision).await
        }
        Commands::Webhook { event, payload } => trigger::webhook(config, &event, &payload).await,
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Local { workflow, revision } => local::run_local(&workflow, revision).await,
    }
}
