//! Route definitions for the `/vms` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::vms;
use crate::state::AppState;

/// Routes mounted at `/vms`.
///
/// ```text
/// GET    /                          -> list
/// POST   /                          -> deploy
/// DELETE /{instance_uuid}           -> delete
/// POST   /{instance_uuid}/power     -> power
/// POST   /{instance_uuid}/reset     -> reset
/// POST   /{instance_uuid}/devices   -> reconfigure_devices
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(vms::list).post(vms::deploy))
        .route("/{instance_uuid}", delete(vms::delete))
        .route("/{instance_uuid}/power", post(vms::power))
        .route("/{instance_uuid}/reset", post(vms::reset))
        .route("/{instance_uuid}/devices", post(vms::reconfigure_devices))
}
