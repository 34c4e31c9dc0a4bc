//! Reconciliation of the directory and the hypervisor with the local cache.
//!
//! Every flow on [`ReconciliationService`] performs its external mutation
//! first and its cache mutation second. The result is an
//! [`OperationOutcome`](galilee_core::outcome::OperationOutcome); `Err` is
//! kept for infrastructure faults that say nothing about the request.

pub mod config;
pub mod error;
pub mod org_units;
pub mod requests;
pub mod service;
pub mod sync;
pub mod users;
pub mod vms;

pub use config::ReconcileConfig;
pub use error::{ReconcileError, ReconcileResult};
pub use service::{LoginResult, ReconciliationService, Synced, UserRef, VmPowerStatus};
