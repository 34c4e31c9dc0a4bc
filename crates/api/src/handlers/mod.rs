pub mod auth;
pub mod directory;
pub mod org_units;
pub mod sync;
pub mod users;
pub mod vms;
