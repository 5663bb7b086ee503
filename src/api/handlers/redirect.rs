//! Handler for short path redirects.

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::application::services::RedirectOutcome;
use crate::error::AppError;
use crate::state::AppState;
use crate::utils::short_path::is_short_path;

/// Redirects a short path to its target URL and counts the click.
///
/// # Endpoint
///
/// `GET /{path}`
///
/// # Request Flow
///
/// 1. Reject anything that is not a well-formed short path (no lookup)
/// 2. Read the mapping entry from the registry
/// 3. Increment the click counter for the path
/// 4. Return 302 Found with `Location` set to the target URL
///
/// # Errors
///
/// - 404 Not Found if no mapping entry exists
/// - 500 Internal Server Error if the registry cannot be read; the body
///   carries no registry details
pub async fn redirect_handler(
    Path(segment): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let short_path = format!("/{segment}");

    if !is_short_path(&short_path) {
        record("not_found");
        return Err(not_found(&short_path));
    }

    match state.redirect_service.resolve(&short_path).await {
        Ok(RedirectOutcome::Found(target_url)) => {
            record("found");
            Ok((StatusCode::FOUND, [(header::LOCATION, target_url)]).into_response())
        }
        Ok(RedirectOutcome::NotFound) => {
            record("not_found");
            Err(not_found(&short_path))
        }
        Err(e) => {
            record("error");
            error!(path = %short_path, error = %e, "Registry lookup failed");
            Err(AppError::internal("Internal server error", json!({})))
        }
    }
}

fn not_found(short_path: &str) -> AppError {
    AppError::not_found("Short URL not found", json!({ "path": short_path }))
}

fn record(outcome: &'static str) {
    metrics::counter!("url_shortener_redirects_total", "outcome" => outcome).increment(1);
}
