//! Reconciliation settings.

use galilee_core::config::{env_parse, ConfigError};
use galilee_core::sync::SyncPolicy;

#[derive(Debug, Clone, Default)]
pub struct ReconcileConfig {
    /// How pull-sync treats rows that are already cached.
    pub sync_policy: SyncPolicy,
    /// Domain part of new users' principal names. Falls back to the
    /// directory domain when unset.
    pub upn_suffix: Option<String>,
}

impl ReconcileConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var       | Default            |
    /// |---------------|--------------------|
    /// | `SYNC_POLICY` | `insert_only`      |
    /// | `UPN_SUFFIX`  | directory domain   |
    pub fn from_env() -> Result<Self, ConfigError> {
        let upn_suffix = std::env::var("UPN_SUFFIX")
            .ok()
            .map(|s| s.trim().trim_start_matches('@').to_string())
            .filter(|s| !s.is_empty());
        Ok(Self {
            sync_policy: env_parse("SYNC_POLICY", SyncPolicy::InsertOnly)?,
            upn_suffix,
        })
    }
}
