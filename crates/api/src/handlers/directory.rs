//! Live directory lookups that bypass the cache.

use axum::extract::{Query, State};
use galilee_directory::{SearchScope, UserAttributes};
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::OutcomeResponse;
use crate::state::AppState;

/// Query parameters for the directory search endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// `all`, `active` or `quarantine` (default `active`).
    #[serde(default)]
    pub scope: SearchScope,
    /// Exact account name or mail; blank lists every user in scope.
    #[serde(default)]
    pub q: String,
}

/// GET /api/v1/directory/users?scope=active&q=jdoe
pub async fn search_users(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<OutcomeResponse<Vec<UserAttributes>>> {
    Ok(state
        .service
        .search_directory(params.scope, &params.q)
        .await?
        .into())
}
