//! Cache row structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `New*` DTO for inserts and pull-sync upserts
//! - An `Update*` DTO (all `Option` fields) for patches

pub mod directory_user;
pub mod org_unit;
pub mod virtual_machine;
