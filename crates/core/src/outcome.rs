//! Classified results of a reconciled operation.
//!
//! Every externally visible operation reports one [`OperationStatus`] plus a
//! human-readable message. `PartialFailure` is reserved for the case where
//! the external system accepted a mutation but the local cache did not.

use serde::Serialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    /// External mutation succeeded, cache mutation failed.
    PartialFailure,
    /// External mutation rejected; cache untouched.
    ExternalFailure,
    /// Input rejected before any external call.
    ValidationError,
    /// A referenced external or cached entity does not exist.
    NotFound,
}

/// Finer-grained reason attached to non-success outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ImmutableAttribute,
    NoCapacity,
    TooManyDevices,
    DeviceNotFound,
    NameCollision,
    AlreadyExists,
    AlreadyInState,
    Timeout,
    Rejected,
    IncompleteProvisioning,
    CacheWrite,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationOutcome<T> {
    pub status: OperationStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(rename = "data", skip_serializing_if = "Option::is_none")]
    pub record: Option<T>,
}

impl<T> OperationOutcome<T> {
    pub fn success(message: impl Into<String>, record: T) -> Self {
        Self {
            status: OperationStatus::Success,
            message: message.into(),
            kind: None,
            record: Some(record),
        }
    }

    /// External system now holds state the cache does not mirror.
    pub fn partial_failure(message: impl Into<String>) -> Self {
        Self::failed(
            OperationStatus::PartialFailure,
            Some(FailureKind::CacheWrite),
            message,
        )
    }

    pub fn external_failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::failed(OperationStatus::ExternalFailure, Some(kind), message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::failed(OperationStatus::ValidationError, None, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::failed(OperationStatus::NotFound, None, message)
    }

    fn failed(status: OperationStatus, kind: Option<FailureKind>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            kind,
            record: None,
        }
    }

    /// Attach a failure kind to a non-success outcome.
    pub fn with_kind(mut self, kind: FailureKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }
}

impl<T> From<CoreError> for OperationOutcome<T> {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { .. } => Self::not_found(err.to_string()),
            CoreError::ImmutableAttribute(_) => Self::failed(
                OperationStatus::ValidationError,
                Some(FailureKind::ImmutableAttribute),
                err.to_string(),
            ),
            CoreError::Conflict(_) => Self::failed(
                OperationStatus::ValidationError,
                Some(FailureKind::AlreadyExists),
                err.to_string(),
            ),
            CoreError::Validation(_) => Self::validation(err.to_string()),
        }
    }
}
