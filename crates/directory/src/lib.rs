//! Directory (LDAP / Active Directory) adapter.
//!
//! [`DirectoryClient`] holds the multi-step operations (provisioning,
//! rename/move, quarantine, credential checks) and talks to the server
//! through the [`DirectoryConnection`] seam. [`LdapConnection`] is the
//! `ldap3`-backed implementation.

pub mod client;
pub mod config;
pub mod connection;
pub mod entry;
pub mod error;
pub mod filter;
pub mod ldap;
pub mod password;

#[cfg(feature = "testing")]
pub mod memory;

pub use client::DirectoryClient;
pub use config::DirectoryConfig;
pub use connection::DirectoryConnection;
pub use entry::{DirectoryEntry, EntryKind, OrgUnitAttributes, SearchScope, UserAttributes};
pub use error::{DirectoryError, DirectoryResult, ProvisionStep};
pub use ldap::LdapConnection;
