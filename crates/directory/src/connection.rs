//! The protocol seam between [`DirectoryClient`](crate::DirectoryClient)
//! and a directory server.

use async_trait::async_trait;

use crate::entry::{DirectoryEntry, SearchDepth};
use crate::error::DirectoryResult;

/// Raw directory operations. Each call is attempted exactly once.
///
/// Transport failures surface as
/// [`DirectoryError::Connectivity`](crate::DirectoryError::Connectivity);
/// non-zero result codes as the matching classified variant.
#[async_trait]
pub trait DirectoryConnection: Send + Sync {
    async fn search(
        &self,
        base: &str,
        depth: SearchDepth,
        filter: &str,
        attrs: &[&str],
    ) -> DirectoryResult<Vec<DirectoryEntry>>;

    /// Add an entry. Attributes with no values are skipped.
    async fn add(
        &self,
        dn: &str,
        object_classes: &[&str],
        attrs: &[(String, Vec<String>)],
    ) -> DirectoryResult<()>;

    /// Replace all values of one attribute. An empty `values` clears it.
    async fn modify_replace(&self, dn: &str, attr: &str, values: Vec<Vec<u8>>)
        -> DirectoryResult<()>;

    /// Rename (`new_superior = None`) or move an entry. The old RDN value
    /// is deleted.
    async fn modify_dn(
        &self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<&str>,
    ) -> DirectoryResult<()>;

    async fn compare(&self, dn: &str, attr: &str, value: &str) -> DirectoryResult<bool>;

    async fn delete(&self, dn: &str) -> DirectoryResult<()>;

    /// Bind `principal` on a fresh, short-lived connection to the primary
    /// server. `Ok(false)` means the credentials were refused.
    async fn bind_check(&self, principal: &str, password: &str) -> DirectoryResult<bool>;

    /// Release the long-lived connection.
    async fn close(&self) -> DirectoryResult<()>;
}
