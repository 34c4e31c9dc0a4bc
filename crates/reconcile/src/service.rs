//! The service shared by every flow module.

use std::sync::Arc;

use galilee_core::sync::UpsertAction;
use galilee_db::CacheStore;
use galilee_directory::DirectoryClient;
use galilee_hypervisor::{HypervisorClient, PowerState};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ReconcileConfig;

/// Orders every external mutation before its cache mutation and reports
/// drift between the two as a partial failure.
///
/// Cheap to clone. The directory client shares one connection; the
/// hypervisor client opens a session per operation.
#[derive(Clone)]
pub struct ReconciliationService {
    pub(crate) directory: DirectoryClient,
    pub(crate) hypervisor: HypervisorClient,
    pub(crate) cache: Arc<dyn CacheStore>,
    pub(crate) config: Arc<ReconcileConfig>,
}

impl ReconciliationService {
    pub fn new(
        directory: DirectoryClient,
        hypervisor: HypervisorClient,
        cache: Arc<dyn CacheStore>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            directory,
            hypervisor,
            cache,
            config: Arc::new(config),
        }
    }

    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    /// Cancel in-flight task waits and unbind the directory connection.
    pub async fn shutdown(&self) {
        self.hypervisor.shutdown();
        if let Err(e) = self.directory.shutdown().await {
            tracing::warn!(error = %e, "Directory unbind failed during shutdown");
        }
    }
}

/// A pull-synced row and what the upsert did to it.
#[derive(Debug, Clone, Serialize)]
pub struct Synced<T> {
    pub record: T,
    pub action: UpsertAction,
}

/// A directory account as last addressed by an operation.
#[derive(Debug, Clone, Serialize)]
pub struct UserRef {
    pub account_name: String,
    pub dn: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VmPowerStatus {
    pub instance_uuid: Uuid,
    pub name: String,
    pub power_state: PowerState,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LoginResult {
    pub authenticated: bool,
}
