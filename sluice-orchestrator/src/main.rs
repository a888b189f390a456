use sluice_core::domain::workflow::WorkflowDefinition;
use sluice_runner::PipelineExecutor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod repository;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

use config::Config;
use service::{RunService, ServiceSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sluice_orchestrator=debug,sluice_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sluice Orchestrator...");

    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!(
        "Repository: {}, main branch: {}, {} credential(s) configured",
        config.runner.repository,
        config.main_branch,
        config.credentials.len()
    );

    let workflows = WorkflowDefinition::defaults(config.main_branch.clone());
    let executor = PipelineExecutor::new(config.runner.clone(), config.credentials.clone());
    let service = RunService::with_settings(
        executor,
        workflows,
        ServiceSettings {
            run_retention: config.run_retention,
            ..Default::default()
        },
    );

    // Build router with all API endpoints
    let app = api::create_router(service);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
