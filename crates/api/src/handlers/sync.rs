//! Pull-sync handlers: read one entity from its source of truth and upsert
//! it into the cache under the configured sync policy.

use axum::extract::{Path, State};
use galilee_db::models::directory_user::DirectoryUser;
use galilee_db::models::org_unit::OrgUnit;
use galilee_db::models::virtual_machine::VirtualMachine;
use galilee_reconcile::Synced;
use uuid::Uuid;

use crate::error::AppResult;
use crate::response::OutcomeResponse;
use crate::state::AppState;

/// POST /api/v1/sync/users/{account_name}
pub async fn user(
    State(state): State<AppState>,
    Path(account_name): Path<String>,
) -> AppResult<OutcomeResponse<Synced<DirectoryUser>>> {
    Ok(state
        .service
        .sync_user_from_directory(&account_name)
        .await?
        .into())
}

/// POST /api/v1/sync/org-units/{object_guid}
pub async fn org_unit(
    State(state): State<AppState>,
    Path(object_guid): Path<Uuid>,
) -> AppResult<OutcomeResponse<Synced<OrgUnit>>> {
    Ok(state
        .service
        .sync_org_unit_from_directory(object_guid)
        .await?
        .into())
}

/// POST /api/v1/sync/vms/{instance_uuid}
pub async fn vm(
    State(state): State<AppState>,
    Path(instance_uuid): Path<Uuid>,
) -> AppResult<OutcomeResponse<Synced<VirtualMachine>>> {
    Ok(state
        .service
        .sync_vm_from_hypervisor(instance_uuid)
        .await?
        .into())
}
