//! Handlers for the `/vms` resource.
//!
//! VMs are addressed by their hypervisor instance UUID.

use axum::extract::{Path, State};
use galilee_db::models::virtual_machine::VirtualMachine;
use galilee_hypervisor::DesiredPower;
use galilee_reconcile::requests::{DeployVmRequest, DeviceChangeRequest};
use galilee_reconcile::VmPowerStatus;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::extract::ValidJson;
use crate::response::OutcomeResponse;
use crate::state::AppState;

/// Request body for the power endpoint.
#[derive(Debug, Deserialize)]
pub struct PowerRequest {
    /// `"ON"` or `"OFF"`.
    pub state: DesiredPower,
}

/// GET /api/v1/vms
pub async fn list(
    State(state): State<AppState>,
) -> AppResult<OutcomeResponse<Vec<VirtualMachine>>> {
    Ok(state.service.list_vms().await?.into())
}

/// POST /api/v1/vms
///
/// Clone from a template and cache the new VM. Blocks until the clone task
/// finishes or times out.
pub async fn deploy(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<DeployVmRequest>,
) -> AppResult<OutcomeResponse<VirtualMachine>> {
    let outcome = state.service.deploy_vm(input).await?;
    Ok(OutcomeResponse::created(outcome))
}

/// POST /api/v1/vms/{instance_uuid}/power
pub async fn power(
    State(state): State<AppState>,
    Path(instance_uuid): Path<Uuid>,
    ValidJson(input): ValidJson<PowerRequest>,
) -> AppResult<OutcomeResponse<VmPowerStatus>> {
    Ok(state
        .service
        .change_vm_power(instance_uuid, input.state)
        .await?
        .into())
}

/// POST /api/v1/vms/{instance_uuid}/reset
pub async fn reset(
    State(state): State<AppState>,
    Path(instance_uuid): Path<Uuid>,
) -> AppResult<OutcomeResponse<Uuid>> {
    Ok(state.service.reset_vm(instance_uuid).await?.into())
}

/// POST /api/v1/vms/{instance_uuid}/devices
///
/// Body is a list of device changes applied in one reconfigure.
pub async fn reconfigure_devices(
    State(state): State<AppState>,
    Path(instance_uuid): Path<Uuid>,
    ValidJson(changes): ValidJson<Vec<DeviceChangeRequest>>,
) -> AppResult<OutcomeResponse<VirtualMachine>> {
    Ok(state
        .service
        .reconfigure_vm_devices(instance_uuid, changes)
        .await?
        .into())
}

/// DELETE /api/v1/vms/{instance_uuid}
pub async fn delete(
    State(state): State<AppState>,
    Path(instance_uuid): Path<Uuid>,
) -> AppResult<OutcomeResponse<Uuid>> {
    Ok(state.service.delete_vm(instance_uuid).await?.into())
}
