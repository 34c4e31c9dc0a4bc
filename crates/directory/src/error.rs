use std::fmt;

use galilee_core::config::ConfigError;

/// LDAP result codes the client distinguishes.
pub mod rc {
    pub const SUCCESS: u32 = 0;
    pub const COMPARE_FALSE: u32 = 5;
    pub const COMPARE_TRUE: u32 = 6;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const UNWILLING_TO_PERFORM: u32 = 53;
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
}

/// The sub-step of a user create that ran after the entry was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    SetPassword,
    EnableAccount,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProvisionStep::SetPassword => "set initial password",
            ProvisionStep::EnableAccount => "enable account",
        })
    }
}

/// Errors from the directory adapter.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Transport or bind failure. Never retried.
    #[error("Directory unreachable: {0}")]
    Connectivity(String),

    #[error("No such directory object: {0}")]
    NoSuchObject(String),

    #[error("Directory entry already exists: {0}")]
    AlreadyExists(String),

    /// Any other non-zero result code.
    #[error("Directory rejected the operation (code {code}): {message}")]
    Rejected { code: u32, message: String },

    #[error("Attribute '{0}' is immutable")]
    ImmutableAttribute(String),

    #[error("Unsupported change: {0}")]
    Unsupported(String),

    /// The entry exists but a follow-up step failed; nothing was rolled back.
    #[error("Entry {dn} was added but the step '{step}' failed: {source}")]
    IncompleteProvisioning {
        dn: String,
        step: ProvisionStep,
        #[source]
        source: Box<DirectoryError>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DirectoryError {
    /// Classify a non-zero LDAP result.
    pub fn from_rc(code: u32, text: &str, dn: &str) -> Self {
        match code {
            rc::NO_SUCH_OBJECT => DirectoryError::NoSuchObject(dn.to_string()),
            rc::ENTRY_ALREADY_EXISTS => DirectoryError::AlreadyExists(dn.to_string()),
            _ => DirectoryError::Rejected {
                code,
                message: text.to_string(),
            },
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, DirectoryError::Connectivity(_))
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;
