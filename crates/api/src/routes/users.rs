//! Route definitions for the `/users` resource.

use axum::routing::{get, patch, post};
use axum::Router;

use crate::handlers::users;
use crate::state::AppState;

/// Routes mounted at `/users`.
///
/// ```text
/// GET    /                                -> list
/// POST   /                                -> create
/// PATCH  /{account_name}                  -> update
/// DELETE /{account_name}                  -> purge
/// POST   /{account_name}/offboard         -> offboard
/// POST   /{account_name}/reset-password   -> reset_password
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(users::list).post(users::create))
        .route("/{account_name}", patch(users::update).delete(users::purge))
        .route("/{account_name}/offboard", post(users::offboard))
        .route("/{account_name}/reset-password", post(users::reset_password))
}
