//! Router configuration for the two listeners.
//!
//! # Redirect listener
//!
//! - `GET /{path}` - Short path redirect (public)
//!
//! # Probe listener
//!
//! - `GET /healthz` - Liveness
//! - `GET /readyz`  - Readiness (registry ping)

use crate::api::handlers::{liveness_handler, readiness_handler, redirect_handler};
use crate::api::middleware::tracing;
use crate::state::AppState;
use axum::Router;
use axum::routing::get;

/// Constructs the public redirect router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/{path}", get(redirect_handler))
        .with_state(state)
        .layer(tracing::layer())
}

/// Constructs the probe router served on the health listener.
pub fn probe_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .with_state(state)
        .layer(tracing::probe_layer())
}
