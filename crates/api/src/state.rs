use std::sync::Arc;

use galilee_reconcile::ReconciliationService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the service holds its clients and cache behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Directory, hypervisor and cache orchestration.
    pub service: ReconciliationService,
    pub config: Arc<ServerConfig>,
}
