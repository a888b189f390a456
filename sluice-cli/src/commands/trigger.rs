//! Trigger command handlers

use anyhow::{Context, Result};
use colored::*;
use sluice_client::OrchestratorClient;
use std::path::Path;

use crate::commands::display::{print_run_details, print_run_summary};
use crate::config::Config;

pub async fn dispatch(config: &Config, workflow: &str, revision: Option<String>) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    let run = client
        .dispatch(workflow, revision)
        .await
        .with_context(|| format!("Failed to dispatch workflow '{}'", workflow))?;

    println!("{}", format!("✓ Dispatched {}", workflow).green());
    println!();
    print_run_details(&run);

    Ok(())
}

pub async fn webhook(config: &Config, event: &str, payload: &Path) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    let body = std::fs::read_to_string(payload)
        .with_context(|| format!("Failed to read payload file: {}", payload.display()))?;
    let body: serde_json::Value = serde_json::from_str(&body)
        .with_context(|| format!("Payload is not valid JSON: {}", payload.display()))?;

    let accepted = client
        .send_event(event, &body)
        .await
        .context("Failed to deliver webhook")?;

    if accepted.runs.is_empty() {
        println!("{}", format!("No workflow accepts this {} event.", event).yellow());
    } else {
        println!(
            "{}",
            format!("Started {} run(s):", accepted.runs.len()).bold()
        );
        println!();
        for run in &accepted.runs {
            print_run_summary(run);
        }
    }

    Ok(())
}
