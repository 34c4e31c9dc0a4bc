//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept a sqlx executor (`&PgPool` or an open transaction) as the first
//! argument.

pub mod directory_user_repo;
pub mod org_unit_repo;
pub mod virtual_machine_repo;

pub use directory_user_repo::DirectoryUserRepo;
pub use org_unit_repo::OrgUnitRepo;
pub use virtual_machine_repo::VirtualMachineRepo;
