//! Trigger API Handlers
//!
//! Repository-host webhooks and manual dispatch.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use sluice_core::domain::run::Run;
use sluice_core::dto::run::{DispatchRequest, EventAccepted, RunSummary};
use sluice_core::dto::webhook::{self, EVENT_HEADER};

use crate::api::error::{ApiError, ApiResult};
use crate::service::RunService;

/// POST /webhook
/// Accept a repository-host delivery; responds with the runs it started
pub async fn receive_webhook(
    State(service): State<RunService>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<EventAccepted>)> {
    let event_name = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {} header", EVENT_HEADER)))?;

    let event = webhook::parse_event(event_name, &body)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let runs = match event {
        Some(event) => {
            tracing::info!("Received {} event: {}", event.kind(), event);
            service.handle_event(event).await
        }
        None => {
            tracing::debug!("Ignoring '{}' delivery", event_name);
            Vec::new()
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            runs: runs.into_iter().map(RunSummary::from).collect(),
        }),
    ))
}

/// POST /workflow/{name}/dispatch
/// Start a manually dispatchable workflow
pub async fn dispatch_workflow(
    State(service): State<RunService>,
    Path(name): Path<String>,
    Json(req): Json<DispatchRequest>,
) -> ApiResult<(StatusCode, Json<Run>)> {
    tracing::info!("Dispatching workflow: {}", name);

    let run = service.dispatch(&name, req.revision).await?;

    Ok((StatusCode::ACCEPTED, Json(run)))
}

#[cfg(test)]
mod tests {
    use crate::api::create_router;
    use crate::testing::{FakeRunner, service};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use sluice_core::dto::run::EventAccepted;
    use tower::ServiceExt;

    fn webhook(event: &str, body: &str) -> Request<Body> {
        Request::post("/webhook")
            .header("X-GitHub-Event", event)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn accepted(response: axum::response::Response) -> EventAccepted {
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_pull_request_webhook_starts_integration() {
        let (service, _) = service(FakeRunner::default());
        let app = create_router(service);

        let body = r#"{"action": "opened", "pull_request": {"head": {"ref": "feature", "sha": "abc"}}}"#;
        let response = app.oneshot(webhook("pull_request", body)).await.unwrap();

        let accepted = accepted(response).await;
        assert_eq!(accepted.runs.len(), 1);
        assert_eq!(accepted.runs[0].key, "feature:integration");
    }

    #[tokio::test]
    async fn test_unhandled_event_is_accepted_without_runs() {
        let (service, _) = service(FakeRunner::default());
        let app = create_router(service);

        let response = app.oneshot(webhook("issues", "{}")).await.unwrap();
        assert!(accepted(response).await.runs.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_errors() {
        let (service, _) = service(FakeRunner::default());
        let app = create_router(service);

        let missing_header = Request::post("/webhook")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.clone().oneshot(missing_header).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(webhook("push", "not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dispatch_endpoint() {
        let (service, _) = service(FakeRunner::default());
        let app = create_router(service);

        let request = |name: &str| {
            Request::post(format!("/workflow/{}/dispatch", name))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"revision": "abc"}"#))
                .unwrap()
        };

        let response = app.clone().oneshot(request("deploy")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app.clone().oneshot(request("integration")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(request("release")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
