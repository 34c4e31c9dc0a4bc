use std::time::Duration;

use galilee_core::config::ConfigError;

/// Errors from the hypervisor adapter.
#[derive(Debug, thiserror::Error)]
pub enum HypervisorError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("Hypervisor unreachable: {0}")]
    Request(#[from] reqwest::Error),

    /// Login refused or the session could not be established.
    #[error("Hypervisor session failed: {0}")]
    Connectivity(String),

    /// The endpoint returned a non-2xx status.
    #[error("Hypervisor API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("The name '{0}' already exists")]
    NameCollision(String),

    #[error("No capacity: {0}")]
    NoCapacity(String),

    #[error("Too many devices: {0}")]
    TooManyDevices(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Virtual machine is already {0}")]
    AlreadyInState(String),

    #[error("Task '{task}' did not finish within {after:?}")]
    Timeout { task: String, after: Duration },

    #[error("Task '{0}' wait cancelled")]
    Cancelled(String),

    #[error("Task '{task}' failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A response did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl HypervisorError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Transport and session failures; these are infrastructure faults.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Connectivity(_))
    }
}

pub type HypervisorResult<T> = Result<T, HypervisorError>;
