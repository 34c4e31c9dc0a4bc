//! Route definitions for the `/org-units` resource.

use axum::routing::{get, patch};
use axum::Router;

use crate::handlers::org_units;
use crate::state::AppState;

/// Routes mounted at `/org-units`.
///
/// ```text
/// GET    /       -> list
/// POST   /       -> create
/// PATCH  /{id}   -> update
/// DELETE /{id}   -> delete
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(org_units::list).post(org_units::create))
        .route("/{id}", patch(org_units::update).delete(org_units::delete))
}
