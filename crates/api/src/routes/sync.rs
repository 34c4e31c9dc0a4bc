//! Route definitions for pull-sync.

use axum::routing::post;
use axum::Router;

use crate::handlers::sync;
use crate::state::AppState;

/// Routes mounted at `/sync`.
///
/// ```text
/// POST /users/{account_name}       -> user
/// POST /org-units/{object_guid}    -> org_unit
/// POST /vms/{instance_uuid}        -> vm
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{account_name}", post(sync::user))
        .route("/org-units/{object_guid}", post(sync::org_unit))
        .route("/vms/{instance_uuid}", post(sync::vm))
}
