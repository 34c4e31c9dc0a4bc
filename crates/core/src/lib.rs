//! Shared building blocks for the Galilee backend.
//!
//! Types, error taxonomy and pure helpers used by the directory,
//! hypervisor, cache and reconciliation crates. Nothing in here talks to
//! the network.

pub mod account_control;
pub mod config;
pub mod dn;
pub mod error;
pub mod fields;
pub mod outcome;
pub mod sync;
pub mod types;
