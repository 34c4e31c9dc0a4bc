//! Pull-sync policy shared by the cache store and the reconciliation flows.

use serde::{Deserialize, Serialize};

/// How a pull-sync treats a cache row that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPolicy {
    /// First sync wins; existing rows are left untouched.
    #[default]
    InsertOnly,
    /// Existing rows are refreshed from the external system.
    Overwrite,
}

impl std::str::FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert_only" | "insert-only" => Ok(Self::InsertOnly),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("Unknown sync policy '{other}'")),
        }
    }
}

/// What an upsert did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Inserted,
    Unchanged,
    Refreshed,
}
