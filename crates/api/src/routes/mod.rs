pub mod auth;
pub mod directory;
pub mod health;
pub mod org_units;
pub mod sync;
pub mod users;
pub mod vms;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/login                                  verify credentials (POST)
///
/// /users                                       list, create
/// /users/{account_name}                        update (PATCH), purge (DELETE)
/// /users/{account_name}/offboard               disable and quarantine (POST)
/// /users/{account_name}/reset-password         reset password (POST)
///
/// /org-units                                   list, create
/// /org-units/{id}                              update (PATCH), delete
///
/// /vms                                         list, deploy
/// /vms/{instance_uuid}                         destroy (DELETE)
/// /vms/{instance_uuid}/power                   power on/off (POST)
/// /vms/{instance_uuid}/reset                   hard reset (POST)
/// /vms/{instance_uuid}/devices                 reconfigure devices (POST)
///
/// /directory/users                             live search (?scope, ?q)
///
/// /sync/users/{account_name}                   pull from directory (POST)
/// /sync/org-units/{object_guid}                pull from directory (POST)
/// /sync/vms/{instance_uuid}                    pull from hypervisor (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/org-units", org_units::router())
        .nest("/vms", vms::router())
        .nest("/directory", directory::router())
        .nest("/sync", sync::router())
}
