//! Run command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use sluice_client::OrchestratorClient;

use crate::commands::display::{print_log_entry, print_run_details, print_run_summary};
use crate::config::Config;
use crate::id_resolver::resolve_run_id;

#[derive(Subcommand)]
pub enum RunCommands {
    /// List all runs, newest first
    List,
    /// Show run details
    Get {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Show run logs
    Logs {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Cancel a queued or running run
    Cancel {
        /// Run ID or unambiguous prefix
        id: String,
    },
}

pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        RunCommands::List => list_runs(&client).await,
        RunCommands::Get { id } => get_run(&client, &id).await,
        RunCommands::Logs { id } => get_run_logs(&client, &id).await,
        RunCommands::Cancel { id } => cancel_run(&client, &id).await,
    }
}

async fn list_runs(client: &OrchestratorClient) -> Result<()> {
    let runs = client.list_runs().await?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
    } else {
        println!("{}", format!("Found {} run(s):", runs.len()).bold());
        println!();
        for run in &runs {
            print_run_summary(run);
        }
    }

    Ok(())
}

async fn get_run(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_run_id(client, id).await?;
    let run = client.get_run(uuid).await?;

    print_run_details(&run);

    Ok(())
}

async fn get_run_logs(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_run_id(client, id).await?;
    let logs = client.get_run_logs(uuid).await?;

    if logs.is_empty() {
        println!("{}", "No logs found for this run.".yellow());
    } else {
        println!("{}", format!("Logs for run {}:", uuid).bold());
        println!("{}", "─".repeat(80).dimmed());
        for log in &logs {
            print_log_entry(log);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    Ok(())
}

async fn cancel_run(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_run_id(client, id).await?;

    match client.cancel_run(uuid).await {
        Ok(_) => {
            println!("{}", format!("✓ Cancellation requested for run {}", uuid).green());
            println!(
                "{}",
                "  The run stops at its next step boundary.".dimmed()
            );
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            println!("{}", format!("Run {} has already finished.", uuid).yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
