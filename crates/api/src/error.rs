use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use galilee_reconcile::ReconcileError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Classified operation results travel as
/// [`OutcomeResponse`](crate::response::OutcomeResponse); this type covers
/// infrastructure faults and HTTP-level rejections.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The reconciliation service could not reach a backend.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Reconcile(err) => classify_reconcile_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a backend fault into an HTTP status, error code, and message.
///
/// - Directory and hypervisor faults map to 503; their detail stays in the log.
/// - Cache faults map to 500 with a sanitized message.
fn classify_reconcile_error(err: &ReconcileError) -> (StatusCode, &'static str, String) {
    match err {
        ReconcileError::Directory(e) => {
            tracing::error!(error = %e, "Directory unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "DIRECTORY_UNAVAILABLE",
                "The directory service is unavailable".to_string(),
            )
        }
        ReconcileError::Hypervisor(e) => {
            tracing::error!(error = %e, "Hypervisor unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "HYPERVISOR_UNAVAILABLE",
                "The hypervisor management endpoint is unavailable".to_string(),
            )
        }
        ReconcileError::Cache(e) => {
            tracing::error!(error = %e, "Cache error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
