//! Operator HTTP API.
//!
//! | method | path | body |
//! |---|---|---|
//! | GET | `/health` | |
//! | GET | `/api/nodes` | |
//! | GET | `/api/ota/sessions` | |
//! | GET | `/api/ota/history` | |
//! | GET | `/api/stats` | |
//! | POST | `/api/ota/trigger` | `{"node_id": N}` |
//! | POST | `/api/ota/auto` | `{"enabled": bool}` |
//! | POST | `/api/ota/auto/toggle` | |
//! | POST | `/api/ota/manifest/refresh` | |
//!
//! Failures are reported as `{"error": "<message>", "code": "<reason>"}`.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use meshota_errors::{ErrorCategory, OtaError};
use meshota_gateway::{GatewayHandle, ServiceError};
use meshota_protocol::NodeId;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

/// Body of `POST /api/ota/trigger`
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    /// Node to update
    pub node_id: NodeId,
}

/// Body of `POST /api/ota/auto`
#[derive(Debug, Deserialize)]
pub struct AutoUpdateRequest {
    /// New state of the switch
    pub enabled: bool,
}

/// A [`ServiceError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Ota(e) => match e {
                OtaError::NodeUnknown(_) => StatusCode::NOT_FOUND,
                OtaError::SessionAlreadyActive(_) => StatusCode::CONFLICT,
                other => match other.category() {
                    ErrorCategory::Manifest | ErrorCategory::Transfer => StatusCode::BAD_GATEWAY,
                    ErrorCategory::Session | ErrorCategory::Node => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                },
            },
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            ServiceError::Stopped => "service_stopped",
            ServiceError::Ota(e) => e.reason(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!("API request failed ({}): {}", status, self.0);
        let body = json!({ "error": self.0.to_string(), "code": self.code() });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

/// Build the operator router over a gateway handle.
pub fn router(handle: GatewayHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/nodes", get(nodes))
        .route("/api/ota/sessions", get(sessions))
        .route("/api/ota/history", get(history))
        .route("/api/stats", get(stats))
        .route("/api/ota/trigger", post(trigger))
        .route("/api/ota/auto", post(set_auto))
        .route("/api/ota/auto/toggle", post(toggle_auto))
        .route("/api/ota/manifest/refresh", post(refresh_manifest))
        .with_state(handle)
}

/// `GET /health`
pub async fn health(State(handle): State<GatewayHandle>) -> ApiResult {
    let stats = handle.stats().await?;
    Ok(Json(json!({
        "status": "ok",
        "gateway_id": stats.gateway_id,
        "auto_update_enabled": stats.auto_update_enabled,
        "manifest_version": stats.manifest_version,
        "active_sessions": stats.active_sessions,
    }))
    .into_response())
}

/// `GET /api/nodes`
pub async fn nodes(State(handle): State<GatewayHandle>) -> ApiResult {
    Ok(Json(handle.nodes().await?).into_response())
}

/// `GET /api/ota/sessions`
pub async fn sessions(State(handle): State<GatewayHandle>) -> ApiResult {
    Ok(Json(handle.sessions().await?).into_response())
}

/// `GET /api/ota/history`
pub async fn history(State(handle): State<GatewayHandle>) -> ApiResult {
    Ok(Json(handle.history().await?).into_response())
}

/// `GET /api/stats`
pub async fn stats(State(handle): State<GatewayHandle>) -> ApiResult {
    Ok(Json(handle.stats().await?).into_response())
}

/// `POST /api/ota/trigger`
pub async fn trigger(
    State(handle): State<GatewayHandle>,
    Json(req): Json<TriggerRequest>,
) -> ApiResult {
    let session_id = handle.trigger(req.node_id).await?;
    info!("Session {} started for node {} via API", session_id, req.node_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "session_id": session_id, "node_id": req.node_id })),
    )
        .into_response())
}

/// `POST /api/ota/auto`
pub async fn set_auto(
    State(handle): State<GatewayHandle>,
    Json(req): Json<AutoUpdateRequest>,
) -> ApiResult {
    let enabled = handle.set_auto_update(req.enabled).await?;
    Ok(Json(json!({ "auto_update_enabled": enabled })).into_response())
}

/// `POST /api/ota/auto/toggle`
pub async fn toggle_auto(State(handle): State<GatewayHandle>) -> ApiResult {
    let enabled = handle.toggle_auto_update().await?;
    info!("Automatic updates {}", if enabled { "enabled" } else { "disabled" });
    Ok(Json(json!({ "auto_update_enabled": enabled })).into_response())
}

/// `POST /api/ota/manifest/refresh`
pub async fn refresh_manifest(State(handle): State<GatewayHandle>) -> ApiResult {
    Ok(Json(handle.refresh_manifest().await?).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ServiceError::Stopped, StatusCode::SERVICE_UNAVAILABLE, "service_stopped"),
            (
                ServiceError::Ota(OtaError::NodeUnknown(7)),
                StatusCode::NOT_FOUND,
                "node_unknown",
            ),
            (
                ServiceError::Ota(OtaError::SessionAlreadyActive(7)),
                StatusCode::CONFLICT,
                "session_already_active",
            ),
            (
                ServiceError::Ota(OtaError::ManifestUnavailable("offline".into())),
                StatusCode::BAD_GATEWAY,
                "manifest_unavailable",
            ),
        ];
        for (err, status, code) in cases {
            let err = ApiError(err);
            assert_eq!(err.status(), status);
            assert_eq!(err.code(), code);
        }
    }
}
