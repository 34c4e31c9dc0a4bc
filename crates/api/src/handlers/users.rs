//! Handlers for the `/users` resource.
//!
//! Users are keyed by account name (`sAMAccountName`) in every path.

use axum::extract::{Path, State};
use galilee_core::fields::FieldChanges;
use galilee_db::models::directory_user::DirectoryUser;
use galilee_reconcile::requests::{CreateUserRequest, PasswordRequest};
use galilee_reconcile::UserRef;

use crate::error::AppResult;
use crate::extract::ValidJson;
use crate::response::OutcomeResponse;
use crate::state::AppState;

/// GET /api/v1/users
pub async fn list(State(state): State<AppState>) -> AppResult<OutcomeResponse<Vec<DirectoryUser>>> {
    Ok(state.service.list_users().await?.into())
}

/// POST /api/v1/users
///
/// Create the account in the directory, then cache it.
pub async fn create(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<CreateUserRequest>,
) -> AppResult<OutcomeResponse<DirectoryUser>> {
    let outcome = state.service.create_user(input).await?;
    Ok(OutcomeResponse::created(outcome))
}

/// PATCH /api/v1/users/{account_name}
///
/// Body is a flat `{ "field": "value" }` map; see the user field policy.
pub async fn update(
    State(state): State<AppState>,
    Path(account_name): Path<String>,
    ValidJson(changes): ValidJson<FieldChanges>,
) -> AppResult<OutcomeResponse<DirectoryUser>> {
    Ok(state.service.update_user(&account_name, &changes).await?.into())
}

/// POST /api/v1/users/{account_name}/offboard
///
/// Disable the account, move it to quarantine and drop the cached row.
pub async fn offboard(
    State(state): State<AppState>,
    Path(account_name): Path<String>,
) -> AppResult<OutcomeResponse<UserRef>> {
    Ok(state.service.offboard_user(&account_name).await?.into())
}

/// DELETE /api/v1/users/{account_name}
pub async fn purge(
    State(state): State<AppState>,
    Path(account_name): Path<String>,
) -> AppResult<OutcomeResponse<UserRef>> {
    Ok(state.service.purge_user(&account_name).await?.into())
}

/// POST /api/v1/users/{account_name}/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    Path(account_name): Path<String>,
    ValidJson(input): ValidJson<PasswordRequest>,
) -> AppResult<OutcomeResponse<UserRef>> {
    Ok(state.service.reset_password(&account_name, input).await?.into())
}
