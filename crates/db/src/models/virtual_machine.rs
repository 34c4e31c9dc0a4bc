//! Virtual machine cache model and DTOs.

use chrono::NaiveDate;
use galilee_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Guest OS label stored when the hypervisor reports none.
pub const UNKNOWN_GUEST_OS: &str = "unknown";

/// Default lifetime of a newly recorded VM.
pub const DEFAULT_LIFETIME_WEEKS: i64 = 52;

/// A row from the `virtual_machines` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct VirtualMachine {
    pub id: DbId,
    pub name: String,
    pub cpu_count: i32,
    pub memory_mb: i32,
    /// Hypervisor-assigned, never updated. The only join key.
    pub instance_uuid: Uuid,
    pub disk_gb: i32,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub guest_os: String,
    /// Local-only.
    pub owner_id: Option<DbId>,
    /// Local-only.
    pub expiry_date: NaiveDate,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert / upsert payload keyed by `instance_uuid`.
///
/// `owner_id` and `expiry_date` only apply when a row is inserted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewVirtualMachine {
    pub name: String,
    pub cpu_count: i32,
    pub memory_mb: i32,
    pub instance_uuid: Uuid,
    pub disk_gb: i32,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub guest_os: Option<String>,
    pub owner_id: Option<DbId>,
    /// Defaults to today + 52 weeks.
    pub expiry_date: Option<NaiveDate>,
}

/// Patch for hypervisor-derived columns after a reconfigure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateVirtualMachine {
    pub cpu_count: Option<i32>,
    pub memory_mb: Option<i32>,
    pub disk_gb: Option<i32>,
    pub ip_address: Option<String>,
}

/// `today + 52 weeks`, the expiry assigned when none is given.
pub fn default_expiry(today: NaiveDate) -> NaiveDate {
    today + chrono::Duration::weeks(DEFAULT_LIFETIME_WEEKS)
}
