//! Directory user cache model and DTOs.

use galilee_core::account_control::{AccountControl, AccountFlag};
use galilee_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `directory_users` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct DirectoryUser {
    pub id: DbId,
    pub account_name: String,
    pub display_name: String,
    pub user_principal_name: String,
    pub dn: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub member_of: Vec<String>,
    pub bad_password_count: i32,
    pub account_control: i32,
    pub org_unit_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DirectoryUser {
    /// Decoded `account_control` labels.
    pub fn account_flags(&self) -> Vec<AccountFlag> {
        AccountControl::from(self.account_control).flags()
    }
}

/// Insert / upsert payload keyed by `account_name`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDirectoryUser {
    pub account_name: String,
    pub display_name: String,
    pub user_principal_name: String,
    pub dn: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub member_of: Vec<String>,
    #[serde(default)]
    pub bad_password_count: i32,
    pub account_control: i32,
    pub org_unit_id: Option<DbId>,
}

/// A new position in the tree. `dn` and `org_unit_id` are always written
/// together.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Relocation {
    pub dn: String,
    pub org_unit_id: Option<DbId>,
}

/// Patch for a cached user. Identity fields are not patchable; an empty
/// `email` or `phone` clears the column.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDirectoryUser {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub account_control: Option<i32>,
    pub relocate: Option<Relocation>,
}

impl UpdateDirectoryUser {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.phone.is_none()
            && self.account_control.is_none()
            && self.relocate.is_none()
    }
}
