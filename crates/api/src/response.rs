//! Outcome envelope for API handlers.
//!
//! Every reconciled operation responds with
//! `{ "status", "message", "kind"?, "data"? }`. The HTTP status follows the
//! outcome status so clients can branch without parsing the body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use galilee_core::outcome::{OperationOutcome, OperationStatus};
use serde::Serialize;

/// An [`OperationOutcome`] on its way to the client.
#[derive(Debug)]
pub struct OutcomeResponse<T> {
    outcome: OperationOutcome<T>,
    created: bool,
}

impl<T> OutcomeResponse<T> {
    pub fn ok(outcome: OperationOutcome<T>) -> Self {
        Self {
            outcome,
            created: false,
        }
    }

    /// Success answers `201 Created` instead of `200 OK`.
    pub fn created(outcome: OperationOutcome<T>) -> Self {
        Self {
            outcome,
            created: true,
        }
    }
}

impl<T> From<OperationOutcome<T>> for OutcomeResponse<T> {
    fn from(outcome: OperationOutcome<T>) -> Self {
        Self::ok(outcome)
    }
}

/// HTTP status for an outcome status.
pub fn status_code(status: OperationStatus, created: bool) -> StatusCode {
    match status {
        OperationStatus::Success if created => StatusCode::CREATED,
        OperationStatus::Success => StatusCode::OK,
        OperationStatus::PartialFailure => StatusCode::MULTI_STATUS,
        OperationStatus::ExternalFailure => StatusCode::BAD_GATEWAY,
        OperationStatus::ValidationError => StatusCode::BAD_REQUEST,
        OperationStatus::NotFound => StatusCode::NOT_FOUND,
    }
}

impl<T: Serialize> IntoResponse for OutcomeResponse<T> {
    fn into_response(self) -> Response {
        let status = status_code(self.outcome.status, self.created);
        (status, Json(self.outcome)).into_response()
    }
}
