//! Error types for the HTTP surface and the reconciliation engine.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;

use crate::domain::entities::ResourceId;
use crate::domain::repositories::{RegistryError, ResourceStoreError};
use crate::utils::target_url::TargetUrlError;

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorInfo,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
    details: Value,
}

/// Errors rendered as JSON HTTP responses.
///
/// Internal errors never carry store details to the client.
#[derive(Debug)]
pub enum AppError {
    NotFound { message: String, details: Value },
    Internal { message: String, details: Value },
}

impl AppError {
    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }
    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            AppError::NotFound { message, details } => {
                (StatusCode::NOT_FOUND, "not_found", message, details)
            }
            AppError::Internal { message, details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                message,
                details,
            ),
        };

        let body = ErrorBody {
            error: ErrorInfo {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Reasons a reconciliation attempt failed.
///
/// Every variant except [`ReconcileError::Validation`] is transient and is
/// retried by the controller with backoff.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The desired state is malformed; retrying cannot help until the spec
    /// is corrected.
    #[error("Invalid target URL '{url}': {source}")]
    Validation {
        url: String,
        #[source]
        source: TargetUrlError,
    },

    /// Every short path candidate for the URL is held by another target.
    #[error("No free short path for '{url}'")]
    PathExhausted { url: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The status kept changing underneath every write attempt.
    #[error("Status of {0} was modified concurrently")]
    StatusConflict(ResourceId),

    #[error("Reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Returns true if re-running the reconciliation may succeed without a
    /// spec change.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation { .. })
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::PathExhausted { .. } => "path_exhausted",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::StatusConflict(_) => "status_conflict",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<RegistryError> for ReconcileError {
    fn from(e: RegistryError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

impl From<ResourceStoreError> for ReconcileError {
    fn from(e: ResourceStoreError) -> Self {
        match e {
            ResourceStoreError::Conflict(id) => Self::StatusConflict(id),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_only_validation_is_permanent() {
        let validation = ReconcileError::Validation {
            url: "not-a-url".to_string(),
            source: TargetUrlError::MissingHost,
        };
        assert!(!validation.is_retryable());
        assert_eq!(validation.kind(), "validation");

        assert!(ReconcileError::StoreUnavailable("down".to_string()).is_retryable());
        assert!(ReconcileError::StatusConflict("a/b".into()).is_retryable());
        assert!(
            ReconcileError::PathExhausted {
                url: "https://example.com".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_registry_errors_map_to_store_unavailable() {
        let err: ReconcileError = RegistryError::Timeout(Duration::from_millis(10)).into();
        assert!(matches!(err, ReconcileError::StoreUnavailable(_)));
    }

    #[test]
    fn test_store_conflict_maps_to_status_conflict() {
        let err: ReconcileError = ResourceStoreError::Conflict("a/b".into()).into();
        assert!(matches!(err, ReconcileError::StatusConflict(id) if id.as_str() == "a/b"));

        let err: ReconcileError = ResourceStoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.kind(), "store_unavailable");
    }

    #[test]
    fn test_internal_error_response() {
        let response = AppError::internal("Internal server error", serde_json::json!({}))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_response() {
        let response =
            AppError::not_found("Short path not found", serde_json::json!({})).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
