//! HTTP routes for relay management.

use super::engine::RelayEngine;
use super::error::RelayError;
use super::types::{RelayMode, RelaySummary};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state for the admin routes
pub struct AdminState {
    pub engine: Arc<RelayEngine>,
    /// Bearer token required on every route but /health
    pub auth_token: Option<String>,
}

/// Request to start a relay
#[derive(Debug, Deserialize)]
pub struct StartRelayRequest {
    pub source_id: String,
    pub target_id: String,
    #[serde(default = "default_mode")]
    pub mode: RelayMode,
}

fn default_mode() -> RelayMode {
    RelayMode::WebhookProxy
}

/// Relay list response
#[derive(Debug, Serialize)]
pub struct RelaysResponse {
    pub relays: Vec<RelaySummary>,
}

/// Stop response
#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub source_id: String,
    pub removed: bool,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_relays: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
        .into_response()
}

/// Create the relay routes
pub fn routes(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/relays", get(list_handler).post(start_handler))
        .route("/relays/{source_id}", delete(stop_handler))
        .with_state(state)
}

fn authorize(state: &AdminState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.auth_token else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ))
    }
}

fn error_status(err: &RelayError) -> (StatusCode, &'static str) {
    match err {
        RelayError::AlreadyActive { .. } => (StatusCode::CONFLICT, "already_active"),
        RelayError::InvalidChannel { .. } => (StatusCode::BAD_REQUEST, "invalid_channel"),
        RelayError::EndpointProvisionFailure { .. } => {
            (StatusCode::BAD_GATEWAY, "endpoint_provision_failure")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

/// GET /health
async fn health_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_relays: state.engine.registry().len().await,
    })
}

/// GET /relays - List active relays
async fn list_handler(State(state): State<Arc<AdminState>>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    Json(RelaysResponse {
        relays: state.engine.list_relays().await,
    })
    .into_response()
}

/// POST /relays - Start a relay
async fn start_handler(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Json(request): Json<StartRelayRequest>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    match state
        .engine
        .start_relay(&request.source_id, &request.target_id, request.mode)
        .await
    {
        Ok(summary) => (StatusCode::CREATED, Json(summary)).into_response(),
        Err(e) => {
            let (status, code) = error_status(&e);
            error_response(status, code, e.to_string())
        }
    }
}

/// DELETE /relays/{source_id} - Stop a relay
async fn stop_handler(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
    Path(source_id): Path<String>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    let removed = state.engine.stop_relay(&source_id).await;
    let status = if removed {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (status, Json(StopResponse { source_id, removed })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::registry::RelayRegistry;
    use crate::relay::store::ConfigStore;
    use crate::test_utils::MockPlatform;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn app(auth_token: Option<&str>) -> (Router, Arc<MockPlatform>, TempDir) {
        let dir = tempdir().unwrap();
        let platform = MockPlatform::new();
        platform.add_channel("1");
        platform.add_channel("2");
        let store = ConfigStore::new(dir.path().join("mirror_config.json"));
        let engine = RelayEngine::new(RelayRegistry::new(platform.clone(), store, "Mirror Bot"));
        let state = Arc::new(AdminState {
            engine,
            auth_token: auth_token.map(str::to_string),
        });
        (routes(state), platform, dir)
    }

    fn start_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/relays")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_start_list_stop() {
        let (app, _platform, _dir) = app(None);

        let response = app
            .clone()
            .oneshot(start_request(
                r#"{"source_id": "1", "target_id": "2", "mode": "direct"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/relays").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["relays"][0]["source_id"], "1");
        assert_eq!(body["relays"][0]["mode"], "direct");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/relays/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/relays/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (app, _platform, _dir) = app(None);
        let body = r#"{"source_id": "1", "target_id": "2"}"#;

        let first = app.clone().oneshot(start_request(body)).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.clone().oneshot(start_request(body)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(second).await["error"], "already_active");

        let invalid = app
            .oneshot(start_request(r#"{"source_id": "5", "target_id": "2"}"#))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bearer_token_required() {
        let (app, _platform, _dir) = app(Some("s3cret"));

        let denied = app
            .clone()
            .oneshot(Request::builder().uri("/relays").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/relays")
                    .header(header::AUTHORIZATION, "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let health = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }
}
