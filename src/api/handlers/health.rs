//! Handlers for liveness and readiness probes.

use axum::{Json, extract::State, http::StatusCode};

use crate::api::dto::health::{CheckStatus, HealthChecks, HealthResponse};
use crate::state::AppState;

/// Liveness probe.
///
/// # Endpoint
///
/// `GET /healthz`
///
/// Always 200 while the process serves requests.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe.
///
/// # Endpoint
///
/// `GET /readyz`
///
/// # Response Codes
///
/// - **200 OK**: Registry answers
/// - **503 Service Unavailable**: Registry unreachable
///
/// # Response
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "checks": {
///     "registry": { "status": "ok", "message": "Registry reachable" }
///   }
/// }
/// ```
pub async fn readiness_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let registry_check = check_registry(&state).await;
    let healthy = registry_check.status == "ok";

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            registry: registry_check,
        },
    };

    if healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

async fn check_registry(state: &AppState) -> CheckStatus {
    if state.redirect_service.is_ready().await {
        CheckStatus {
            status: "ok".to_string(),
            message: Some("Registry reachable".to_string()),
        }
    } else {
        CheckStatus {
            status: "error".to_string(),
            message: Some("Registry unreachable".to_string()),
        }
    }
}
