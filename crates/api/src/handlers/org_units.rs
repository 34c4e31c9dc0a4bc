//! Handlers for the `/org-units` resource.

use axum::extract::{Path, State};
use galilee_core::fields::FieldChanges;
use galilee_core::types::DbId;
use galilee_db::models::org_unit::OrgUnit;
use galilee_reconcile::requests::CreateOrgUnitRequest;

use crate::error::AppResult;
use crate::extract::ValidJson;
use crate::response::OutcomeResponse;
use crate::state::AppState;

/// GET /api/v1/org-units
pub async fn list(State(state): State<AppState>) -> AppResult<OutcomeResponse<Vec<OrgUnit>>> {
    Ok(state.service.list_org_units().await?.into())
}

/// POST /api/v1/org-units
pub async fn create(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<CreateOrgUnitRequest>,
) -> AppResult<OutcomeResponse<OrgUnit>> {
    let outcome = state.service.create_org_unit(input).await?;
    Ok(OutcomeResponse::created(outcome))
}

/// PATCH /api/v1/org-units/{id}
///
/// Accepts `name` and `parentId`; a blank `parentId` moves the unit to the
/// active base.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    ValidJson(changes): ValidJson<FieldChanges>,
) -> AppResult<OutcomeResponse<OrgUnit>> {
    Ok(state.service.update_org_unit(id, &changes).await?.into())
}

/// DELETE /api/v1/org-units/{id}
///
/// The directory refuses to delete a unit that still has children.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<OutcomeResponse<OrgUnit>> {
    Ok(state.service.delete_org_unit(id).await?.into())
}
