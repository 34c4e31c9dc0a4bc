//! Virtualization cluster adapter.
//!
//! [`HypervisorClient`] runs VM lifecycle operations through a
//! [`HypervisorConnector`]; the production connector speaks the vSphere
//! VI/JSON API ([`vim::VimJsonConnector`]).

pub mod client;
pub mod config;
pub mod devices;
pub mod error;
pub mod model;
pub mod placement;
pub mod session;
pub mod task;
pub mod vim;

#[cfg(feature = "testing")]
pub mod memory;

pub use client::HypervisorClient;
pub use config::HypervisorConfig;
pub use error::{HypervisorError, HypervisorResult};
pub use model::{
    DeployRequest, DesiredPower, DeviceOperation, DeviceRequest, DeviceTarget, Ipv4Assignment,
    PowerState, VmSnapshot,
};
pub use session::{with_session, HypervisorConnector, HypervisorSession};
