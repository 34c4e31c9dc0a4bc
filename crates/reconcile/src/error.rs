//! Infrastructure faults and the classification of adapter errors into
//! operation outcomes.

use galilee_core::outcome::{FailureKind, OperationOutcome};
use galilee_db::StoreError;
use galilee_directory::DirectoryError;
use galilee_hypervisor::HypervisorError;

/// Faults that abort an operation without a classified outcome.
///
/// Everything an operator could act on per request (rejections, missing
/// entities, partial failures) is an [`OperationOutcome`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Hypervisor(#[from] HypervisorError),

    /// A cache read (or a pull-sync write) failed.
    #[error(transparent)]
    Cache(#[from] StoreError),
}

pub type ReconcileResult<T> = Result<OperationOutcome<T>, ReconcileError>;

/// Classify a directory error. Connectivity stays an error; everything
/// else becomes an outcome with the cache untouched.
pub(crate) fn directory_failure<T>(err: DirectoryError) -> ReconcileResult<T> {
    if err.is_connectivity() || matches!(err, DirectoryError::Config(_)) {
        return Err(err.into());
    }
    let message = err.to_string();
    tracing::warn!(error = %message, "Directory operation rejected");
    Ok(match err {
        DirectoryError::NoSuchObject(_) => OperationOutcome::not_found(message),
        DirectoryError::AlreadyExists(_) => {
            OperationOutcome::external_failure(FailureKind::AlreadyExists, message)
        }
        DirectoryError::ImmutableAttribute(_) => {
            OperationOutcome::validation(message).with_kind(FailureKind::ImmutableAttribute)
        }
        DirectoryError::Unsupported(_) => OperationOutcome::validation(message),
        DirectoryError::IncompleteProvisioning { .. } => {
            OperationOutcome::external_failure(FailureKind::IncompleteProvisioning, message)
        }
        _ => OperationOutcome::external_failure(FailureKind::Rejected, message),
    })
}

/// Classify a hypervisor error. Transport, session and cancellation
/// faults stay errors.
pub(crate) fn hypervisor_failure<T>(err: HypervisorError) -> ReconcileResult<T> {
    if err.is_connectivity()
        || matches!(err, HypervisorError::Cancelled(_) | HypervisorError::Config(_))
    {
        return Err(err.into());
    }
    let message = err.to_string();
    tracing::warn!(error = %message, "Hypervisor operation rejected");
    let external = |kind| OperationOutcome::external_failure(kind, message.clone());
    Ok(match &err {
        HypervisorError::NotFound { .. } => OperationOutcome::not_found(message.clone()),
        HypervisorError::InvalidRequest(_) => OperationOutcome::validation(message.clone()),
        HypervisorError::NameCollision(_) => external(FailureKind::NameCollision),
        HypervisorError::NoCapacity(_) => external(FailureKind::NoCapacity),
        HypervisorError::TooManyDevices(_) => external(FailureKind::TooManyDevices),
        HypervisorError::DeviceNotFound(_) => external(FailureKind::DeviceNotFound),
        HypervisorError::AlreadyInState(_) => external(FailureKind::AlreadyInState),
        HypervisorError::Timeout { .. } => external(FailureKind::Timeout),
        _ => external(FailureKind::Rejected),
    })
}

/// The external system changed but the cache did not follow.
///
/// Logged at error level with `inconsistency = true` so operators can find
/// every drifted entity.
pub(crate) fn partial_failure<T>(operation: &str, key: &str, err: &StoreError) -> OperationOutcome<T> {
    tracing::error!(
        inconsistency = true,
        operation,
        key,
        error = %err,
        "External change applied but the cache write failed"
    );
    OperationOutcome::partial_failure(format!(
        "{operation} of '{key}' succeeded externally but the local cache was not updated \
         ({err}); the cache no longer mirrors the external system"
    ))
}

/// Like [`partial_failure`] for a cache row that disappeared mid-operation.
pub(crate) fn partial_missing_row<T>(operation: &str, key: &str) -> OperationOutcome<T> {
    tracing::error!(
        inconsistency = true,
        operation,
        key,
        "External change applied but the cached row is gone"
    );
    OperationOutcome::partial_failure(format!(
        "{operation} of '{key}' succeeded externally but no cached row was found to update"
    ))
}

/// Like [`partial_failure`] when the external system could not be read
/// back after the write.
pub(crate) fn partial_readback<T>(operation: &str, key: &str, reason: &str) -> OperationOutcome<T> {
    tracing::error!(
        inconsistency = true,
        operation,
        key,
        reason,
        "External change applied but its result could not be read back"
    );
    OperationOutcome::partial_failure(format!(
        "{operation} of '{key}' succeeded externally but the local cache was not updated \
         ({reason})"
    ))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use galilee_core::outcome::OperationStatus;

    use super::*;

    #[test]
    fn directory_connectivity_is_an_error() {
        let result = directory_failure::<()>(DirectoryError::Connectivity("down".into()));
        assert_matches!(result, Err(ReconcileError::Directory(_)));
    }

    #[test]
    fn directory_rejection_is_external_failure() {
        let outcome = directory_failure::<()>(DirectoryError::Rejected {
            code: 53,
            message: "unwilling".into(),
        })
        .unwrap();
        assert_eq!(outcome.status, OperationStatus::ExternalFailure);
        assert_eq!(outcome.kind, Some(FailureKind::Rejected));
    }

    #[test]
    fn immutable_attribute_is_validation() {
        let outcome =
            directory_failure::<()>(DirectoryError::ImmutableAttribute("displayName".into()))
                .unwrap();
        assert_eq!(outcome.status, OperationStatus::ValidationError);
        assert_eq!(outcome.kind, Some(FailureKind::ImmutableAttribute));
    }

    #[test]
    fn task_timeout_is_external_failure() {
        let outcome = hypervisor_failure::<()>(HypervisorError::Timeout {
            task: "Deploy VM".into(),
            after: Duration::from_secs(1800),
        })
        .unwrap();
        assert_eq!(outcome.status, OperationStatus::ExternalFailure);
        assert_eq!(outcome.kind, Some(FailureKind::Timeout));
    }

    #[test]
    fn hypervisor_session_failure_is_an_error() {
        let result = hypervisor_failure::<()>(HypervisorError::Connectivity("login".into()));
        assert_matches!(result, Err(ReconcileError::Hypervisor(_)));
    }

    #[test]
    fn partial_failure_names_the_entity() {
        let outcome: OperationOutcome<()> =
            partial_failure("Create user", "jdoe", &StoreError::Unavailable("down".into()));
        assert_eq!(outcome.status, OperationStatus::PartialFailure);
        assert!(outcome.message.contains("jdoe"));
        assert!(outcome.message.contains("succeeded externally"));
    }
}
