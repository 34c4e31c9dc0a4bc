//! Organizational unit cache model and DTOs.

use galilee_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `org_units` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct OrgUnit {
    pub id: DbId,
    pub name: String,
    /// Directory-assigned, never updated.
    pub object_guid: Uuid,
    pub dn: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert / upsert payload keyed by `object_guid`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrgUnit {
    pub name: String,
    pub object_guid: Uuid,
    pub dn: String,
}

/// Rename or move. `dn` changes cascade to every cached descendant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrgUnit {
    pub name: Option<String>,
    pub dn: Option<String>,
}
