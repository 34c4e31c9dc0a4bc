//! Credential check against the directory.

use axum::extract::State;
use galilee_reconcile::LoginResult;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extract::ValidJson;
use crate::response::OutcomeResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub account_name: String,
    pub password: String,
}

/// POST /api/v1/auth/login
///
/// Bind as the account with the given password. Wrong credentials answer
/// 401; the password is never logged.
pub async fn login(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<LoginRequest>,
) -> AppResult<OutcomeResponse<LoginResult>> {
    if input.account_name.trim().is_empty() || input.password.is_empty() {
        return Err(AppError::BadRequest(
            "account_name and password are required".to_string(),
        ));
    }
    let outcome = state
        .service
        .verify_login(&input.account_name, &input.password)
        .await?;
    if outcome.record.is_some_and(|r| !r.authenticated) {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }
    Ok(outcome.into())
}
