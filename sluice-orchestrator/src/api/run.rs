//! Run API Handlers
//!
//! Inspection and cancellation of runs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use sluice_core::domain::log::LogEntry;
use sluice_core::domain::run::Run;
use sluice_core::dto::run::RunSummary;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::RunService;

/// GET /runs
/// List all runs, newest first
pub async fn list_runs(State(service): State<RunService>) -> Json<Vec<RunSummary>> {
    tracing::debug!("Listing runs");

    let runs = service.list_runs().await;
    Json(runs.into_iter().map(RunSummary::from).collect())
}

/// GET /run/{id}
pub async fn get_run(State(service): State<RunService>, Path(id): Path<Uuid>) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run: {}", id);

    Ok(Json(service.get_run(id).await?))
}

/// GET /run/{id}/logs
pub async fn get_run_logs(
    State(service): State<RunService>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    tracing::debug!("Getting logs for run: {}", id);

    Ok(Json(service.get_logs(id).await?))
}

/// POST /run/{id}/cancel
/// Request cancellation; the run reports `Cancelled` once it has stopped
pub async fn cancel_run(
    State(service): State<RunService>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Run>)> {
    tracing::info!("Cancelling run: {}", id);

    let run = service.cancel(id).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

#[cfg(test)]
mod tests {
    use crate::api::create_router;
    use crate::testing::{FakeRunner, service, wait_terminal};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use sluice_core::domain::log::LogEntry;
    use sluice_core::dto::run::RunSummary;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn get(uri: String) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_run_endpoints() {
        let (service, _) = service(FakeRunner::default());
        let run = service.dispatch("deploy", None).await.unwrap();
        wait_terminal(&service, run.id).await;
        let app = create_router(service);

        let response = app.clone().oneshot(get("/runs".to_string())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let runs: Vec<RunSummary> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, run.id);

        let response = app
            .clone()
            .oneshot(get(format!("/run/{}", run.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get(format!("/run/{}/logs", run.id)))
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let logs: Vec<LogEntry> = serde_json::from_slice(&bytes).unwrap();
        assert!(!logs.is_empty());

        // Already finished
        let cancel = Request::post(format!("/run/{}/cancel", run.id))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(cancel).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(get(format!("/run/{}", Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_running_run() {
        let (service, _) = service(FakeRunner {
            hang_step: Some("serve"),
            ..Default::default()
        });
        let run = service.dispatch("deploy", None).await.unwrap();
        let app = create_router(service.clone());

        let cancel = Request::post(format!("/run/{}/cancel", run.id))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(cancel).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let run = wait_terminal(&service, run.id).await;
        assert_eq!(
            run.status,
            sluice_core::domain::run::RunStatus::Cancelled
        );
    }
}
