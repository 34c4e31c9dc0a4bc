//! Virtual machine flows.

use galilee_core::error::CoreError;
use galilee_core::outcome::OperationOutcome;
use galilee_db::models::virtual_machine::{NewVirtualMachine, UpdateVirtualMachine, VirtualMachine};
use galilee_hypervisor::{DeployRequest, DesiredPower, DeviceRequest, VmSnapshot};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::{hypervisor_failure, partial_failure, partial_missing_row, ReconcileResult};
use crate::requests::{describe, DeployVmRequest, DeviceChangeRequest};
use crate::service::{ReconciliationService, VmPowerStatus};

impl ReconciliationService {
    /// Clone a template, then mirror the new VM.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn deploy_vm(&self, request: DeployVmRequest) -> ReconcileResult<VirtualMachine> {
        if let Err(errors) = request.validate() {
            return Ok(OperationOutcome::validation(describe(&errors)));
        }
        let ip = match request.ipv4() {
            Ok(ip) => ip,
            Err(message) => return Ok(OperationOutcome::validation(message)),
        };

        let deploy = DeployRequest {
            name: request.name.clone(),
            template: request.template,
            cluster: request.cluster,
            cpu_count: request.cpu_count,
            memory_gb: request.memory_gb,
            annotation: request.annotation,
            network: request.network,
            disk_gb: request.disk_gb,
            customization_spec: request.customization_spec,
            ip,
            hostname: request.hostname,
            power_on: request.power_on,
        };
        let vm = match self.hypervisor.deploy_vm(&deploy).await {
            Ok(vm) => vm,
            Err(e) => return hypervisor_failure(e),
        };

        let mut row = new_vm_row(&vm);
        if row.ip_address.is_none() {
            row.ip_address = ip.map(|ip| ip.address.to_string());
        }
        row.owner_id = request.owner_id;
        row.expiry_date = request.expiry_date;

        let key = vm.instance_uuid.to_string();
        match self.cache.insert_vm(&row).await {
            Ok(record) => {
                info!(name = %record.name, instance_uuid = %record.instance_uuid, "VM deployed");
                Ok(OperationOutcome::success(
                    format!("VM '{}' deployed", record.name),
                    record,
                ))
            }
            Err(e) => Ok(partial_failure("Deploy VM", &key, &e)),
        }
    }

    /// Power on or off. The cache holds no power state, so nothing is
    /// written locally.
    #[instrument(skip(self))]
    pub async fn change_vm_power(
        &self,
        instance_uuid: Uuid,
        desired: DesiredPower,
    ) -> ReconcileResult<VmPowerStatus> {
        match self.hypervisor.change_power_state(instance_uuid, desired).await {
            Ok(vm) => Ok(OperationOutcome::success(
                format!("VM '{}' is {desired}", vm.name),
                VmPowerStatus {
                    instance_uuid,
                    name: vm.name,
                    power_state: vm.power_state,
                },
            )),
            Err(e) => hypervisor_failure(e),
        }
    }

    #[instrument(skip(self))]
    pub async fn reset_vm(&self, instance_uuid: Uuid) -> ReconcileResult<Uuid> {
        match self.hypervisor.reset(instance_uuid).await {
            Ok(()) => Ok(OperationOutcome::success("VM reset", instance_uuid)),
            Err(e) => hypervisor_failure(e),
        }
    }

    /// Add, edit or remove devices, then refresh the cached sizing.
    #[instrument(skip(self, changes))]
    pub async fn reconfigure_vm_devices(
        &self,
        instance_uuid: Uuid,
        changes: Vec<DeviceChangeRequest>,
    ) -> ReconcileResult<VirtualMachine> {
        if changes.is_empty() {
            return Ok(OperationOutcome::validation("No device changes given"));
        }
        if self.cache.find_vm(instance_uuid).await?.is_none() {
            return Ok(CoreError::not_found("VM", instance_uuid).into());
        }
        let requests: Vec<DeviceRequest> = changes
            .into_iter()
            .map(|c| DeviceRequest {
                operation: c.operation,
                target: c.target,
            })
            .collect();
        let vm = match self
            .hypervisor
            .reconfigure_devices(instance_uuid, &requests)
            .await
        {
            Ok(vm) => vm,
            Err(e) => return hypervisor_failure(e),
        };

        let update = UpdateVirtualMachine {
            cpu_count: Some(vm.cpu_count),
            memory_mb: Some(vm.memory_mb),
            disk_gb: Some(vm.disk_gb()),
            ip_address: None,
        };
        let key = instance_uuid.to_string();
        match self.cache.update_vm(instance_uuid, &update).await {
            Ok(Some(record)) => Ok(OperationOutcome::success(
                format!("VM '{}' reconfigured", record.name),
                record,
            )),
            Ok(None) => Ok(partial_missing_row("Reconfigure VM", &key)),
            Err(e) => Ok(partial_failure("Reconfigure VM", &key, &e)),
        }
    }

    /// Destroy the VM (powering it off first), then drop the cached row.
    #[instrument(skip(self))]
    pub async fn delete_vm(&self, instance_uuid: Uuid) -> ReconcileResult<Uuid> {
        if let Err(e) = self.hypervisor.destroy(instance_uuid).await {
            return hypervisor_failure(e);
        }
        match self.cache.delete_vm(instance_uuid).await {
            Ok(_) => Ok(OperationOutcome::success("VM destroyed", instance_uuid)),
            Err(e) => Ok(partial_failure("Delete VM", &instance_uuid.to_string(), &e)),
        }
    }

    pub async fn list_vms(&self) -> ReconcileResult<Vec<VirtualMachine>> {
        let vms = self.cache.list_vms().await?;
        Ok(OperationOutcome::success(
            format!("{} cached VMs", vms.len()),
            vms,
        ))
    }
}

/// Cache row for a VM as the hypervisor reports it. Local-only fields are
/// left for the caller.
pub(crate) fn new_vm_row(vm: &VmSnapshot) -> NewVirtualMachine {
    NewVirtualMachine {
        name: vm.name.clone(),
        cpu_count: vm.cpu_count,
        memory_mb: vm.memory_mb,
        instance_uuid: vm.instance_uuid,
        disk_gb: vm.disk_gb(),
        hostname: vm.hostname.clone(),
        ip_address: vm.ip_address.clone(),
        guest_os: vm.guest_os.clone(),
        owner_id: None,
        expiry_date: None,
    }
}
