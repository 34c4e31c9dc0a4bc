use axum::routing::get;
use axum::Router;

use crate::handlers::directory;
use crate::state::AppState;

/// Routes mounted at `/directory`.
pub fn router() -> Router<AppState> {
    Router::new().route("/users", get(directory::search_users))
}
