//! Device change construction.
//!
//! [`NetworkDeviceBuilder`] and [`DiskDeviceBuilder`] each know one device
//! kind. [`DeviceConfigurator`] holds both and turns a list of
//! [`DeviceRequest`]s into the `device_change` list of a config spec.

use crate::config::PORTGROUP_EXTEND_STEP;
use crate::error::{HypervisorError, HypervisorResult};
use crate::model::{
    DeviceChange, DeviceKind, DeviceOperation, DeviceRequest, DeviceSpec, DeviceTarget, DiskSpec,
    DvPort, FileOperation, NetworkInfo, NicBacking, NicSpec, ObjectKind, PowerState, VirtualDevice,
    VmSnapshot, DISK_LABEL_PREFIX, NIC_LABEL_PREFIX,
};
use crate::session::HypervisorSession;
use crate::task::TaskWaiter;

/// SCSI unit reserved for the controller itself.
const RESERVED_SCSI_UNIT: i32 = 7;
/// Units per SCSI controller.
const MAX_SCSI_UNITS: i32 = 16;
/// Adapter type used for newly added NICs.
const NEW_ADAPTER_TYPE: &str = "VirtualE1000";

/// Disk units and distributed ports already handed out by earlier changes
/// of the same batch. None of them show up in the snapshot yet.
#[derive(Debug, Default)]
pub struct Allocations {
    disk_units: Vec<i32>,
    dv_ports: Vec<(String, String)>,
}

impl Allocations {
    fn port_taken(&self, portgroup_key: &str, port_key: &str) -> bool {
        self.dv_ports
            .iter()
            .any(|(pg, key)| pg == portgroup_key && key == port_key)
    }
}

/// Next free unit for a new disk: one past the highest unit in use by a
/// file-backed device or already `claimed`, skipping the reserved
/// controller unit.
pub fn next_disk_unit(devices: &[VirtualDevice], claimed: &[i32]) -> HypervisorResult<i32> {
    let next = devices
        .iter()
        .filter(|d| d.file_backed)
        .filter_map(|d| d.unit_number)
        .chain(claimed.iter().copied())
        .max()
        .map_or(0, |highest| highest + 1);
    let next = if next == RESERVED_SCSI_UNIT { next + 1 } else { next };
    if next >= MAX_SCSI_UNITS {
        return Err(HypervisorError::TooManyDevices(format!(
            "no free SCSI unit (next would be {next})"
        )));
    }
    Ok(next)
}

fn find_by_label<'a>(
    vm: &'a VmSnapshot,
    kind: DeviceKind,
    label: &str,
) -> HypervisorResult<&'a VirtualDevice> {
    vm.devices_of(kind)
        .find(|d| d.label == label)
        .ok_or_else(|| {
            tracing::warn!(vm = %vm.name, label, "Device not found");
            HypervisorError::DeviceNotFound(format!("'{label}' on {}", vm.name))
        })
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Builds network adapter changes. Owns the port-capacity extension logic
/// for distributed portgroups.
#[derive(Debug, Clone)]
pub struct NetworkDeviceBuilder {
    waiter: TaskWaiter,
}

impl NetworkDeviceBuilder {
    pub fn new(waiter: TaskWaiter) -> Self {
        Self { waiter }
    }

    /// `Add` and `Edit` connect an adapter to `portgroup`; `Remove` drops
    /// the adapter labelled `Network adapter <number>`.
    pub async fn build(
        &self,
        session: &dyn HypervisorSession,
        vm: &VmSnapshot,
        operation: DeviceOperation,
        portgroup: Option<&str>,
        number: Option<u32>,
        allocations: &mut Allocations,
    ) -> HypervisorResult<DeviceChange> {
        if operation == DeviceOperation::Remove {
            let number = number.ok_or_else(|| {
                HypervisorError::InvalidRequest("removing an adapter needs its number".into())
            })?;
            let device = find_by_label(
                vm,
                DeviceKind::EthernetCard,
                &format!("{NIC_LABEL_PREFIX}{number}"),
            )?;
            return Ok(DeviceChange {
                operation,
                file_operation: None,
                device: DeviceSpec::Existing(device.clone()),
            });
        }

        let portgroup = portgroup.ok_or_else(|| {
            HypervisorError::InvalidRequest("an adapter change needs a portgroup".into())
        })?;

        let (key, device_type) = match operation {
            DeviceOperation::Edit => {
                let existing = vm.devices_of(DeviceKind::EthernetCard).next().ok_or_else(|| {
                    HypervisorError::DeviceNotFound(format!("no network adapter on {}", vm.name))
                })?;
                (Some(existing.key), existing.type_name.clone())
            }
            _ => (None, NEW_ADAPTER_TYPE.to_string()),
        };

        let backing = self.resolve_backing(session, portgroup, allocations).await?;
        tracing::info!(vm = %vm.name, ?operation, portgroup, "Network adapter change built");

        Ok(DeviceChange {
            operation,
            file_operation: None,
            device: DeviceSpec::Nic(NicSpec {
                key,
                device_type,
                backing,
                start_connected: true,
                connected: vm.power_state == PowerState::PoweredOn,
            }),
        })
    }

    /// Resolve `portgroup` to an adapter backing. On a distributed
    /// portgroup this claims the first port that is free and not yet in
    /// `allocations`, growing the portgroup once when there is none.
    async fn resolve_backing(
        &self,
        session: &dyn HypervisorSession,
        portgroup: &str,
        allocations: &mut Allocations,
    ) -> HypervisorResult<NicBacking> {
        let network = session
            .list_objects(ObjectKind::Network)
            .await?
            .into_iter()
            .find(|n| n.name == portgroup)
            .ok_or_else(|| HypervisorError::not_found("Network", portgroup))?;

        match session.network_info(&network.moref).await? {
            NetworkInfo::Standard { moref, name } => Ok(NicBacking::Network {
                network: moref,
                device_name: name,
            }),
            NetworkInfo::Distributed {
                moref,
                name,
                switch,
                switch_uuid,
                portgroup_key,
                num_ports,
                config_version,
            } => {
                let unclaimed = |ports: Vec<DvPort>| -> Vec<DvPort> {
                    ports
                        .into_iter()
                        .filter(|p| !allocations.port_taken(&p.portgroup_key, &p.key))
                        .collect()
                };
                let mut ports = unclaimed(session.free_dv_ports(&switch, &portgroup_key).await?);
                if ports.is_empty() {
                    tracing::info!(
                        portgroup = %name,
                        extend_by = PORTGROUP_EXTEND_STEP,
                        "No free port; extending portgroup"
                    );
                    let task = session
                        .resize_portgroup(&moref, &config_version, num_ports + PORTGROUP_EXTEND_STEP)
                        .await?;
                    self.waiter.wait(session, &task, "Extend portgroup").await?;
                    ports = unclaimed(session.free_dv_ports(&switch, &portgroup_key).await?);
                }
                let port = ports.into_iter().next().ok_or_else(|| {
                    HypervisorError::NoCapacity(format!("no free port on portgroup '{name}'"))
                })?;
                allocations
                    .dv_ports
                    .push((port.portgroup_key.clone(), port.key.clone()));
                Ok(NicBacking::DistributedPort {
                    switch_uuid: if port.switch_uuid.is_empty() {
                        switch_uuid
                    } else {
                        port.switch_uuid
                    },
                    portgroup_key: port.portgroup_key,
                    port_key: port.key,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Disk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct DiskDeviceBuilder;

impl DiskDeviceBuilder {
    /// `Add` creates a thin, persistent disk of `size_gb` on the first SCSI
    /// controller; `Remove` destroys `Hard disk <number>` and its file.
    pub fn build(
        &self,
        vm: &VmSnapshot,
        operation: DeviceOperation,
        size_gb: Option<i32>,
        number: Option<u32>,
        allocations: &mut Allocations,
    ) -> HypervisorResult<DeviceChange> {
        match operation {
            DeviceOperation::Add => {
                let size_gb = size_gb.filter(|gb| *gb > 0).ok_or_else(|| {
                    HypervisorError::InvalidRequest("a new disk needs a positive size".into())
                })?;
                let unit_number = next_disk_unit(&vm.devices, &allocations.disk_units)?;
                let controller = vm
                    .devices_of(DeviceKind::ScsiController)
                    .next()
                    .ok_or_else(|| {
                        HypervisorError::DeviceNotFound(format!("no SCSI controller on {}", vm.name))
                    })?;
                allocations.disk_units.push(unit_number);
                tracing::info!(vm = %vm.name, size_gb, unit_number, "Disk add built");
                Ok(DeviceChange {
                    operation,
                    file_operation: Some(FileOperation::Create),
                    device: DeviceSpec::Disk(DiskSpec {
                        unit_number,
                        controller_key: controller.key,
                        capacity_kb: i64::from(size_gb) * 1024 * 1024,
                    }),
                })
            }
            DeviceOperation::Remove => {
                let number = number.ok_or_else(|| {
                    HypervisorError::InvalidRequest("removing a disk needs its number".into())
                })?;
                let device = find_by_label(
                    vm,
                    DeviceKind::Disk,
                    &format!("{DISK_LABEL_PREFIX}{number}"),
                )?;
                Ok(DeviceChange {
                    operation,
                    file_operation: Some(FileOperation::Destroy),
                    device: DeviceSpec::Existing(device.clone()),
                })
            }
            DeviceOperation::Edit => Err(HypervisorError::InvalidRequest(
                "disks can only be added or removed".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DeviceConfigurator {
    network: NetworkDeviceBuilder,
    disk: DiskDeviceBuilder,
}

impl DeviceConfigurator {
    pub fn new(network: NetworkDeviceBuilder, disk: DiskDeviceBuilder) -> Self {
        Self { network, disk }
    }

    /// Build one change per request, in request order. Units and ports
    /// claimed by one change are not offered to later ones.
    pub async fn build(
        &self,
        session: &dyn HypervisorSession,
        vm: &VmSnapshot,
        requests: &[DeviceRequest],
    ) -> HypervisorResult<Vec<DeviceChange>> {
        let mut allocations = Allocations::default();
        let mut changes = Vec::with_capacity(requests.len());
        for request in requests {
            let change = match &request.target {
                DeviceTarget::Network { portgroup, number } => {
                    self.network
                        .build(
                            session,
                            vm,
                            request.operation,
                            portgroup.as_deref(),
                            *number,
                            &mut allocations,
                        )
                        .await?
                }
                DeviceTarget::Disk { size_gb, number } => self.disk.build(
                    vm,
                    request.operation,
                    *size_gb,
                    *number,
                    &mut allocations,
                )?,
            };
            changes.push(change);
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use uuid::Uuid;

    use super::*;
    use crate::model::ManagedObjectRef;

    fn device(key: i32, kind: DeviceKind, label: &str, unit: Option<i32>) -> VirtualDevice {
        VirtualDevice {
            key,
            type_name: format!("{kind:?}"),
            label: label.to_string(),
            file_backed: kind == DeviceKind::Disk,
            capacity_kb: (kind == DeviceKind::Disk).then_some(40 * 1024 * 1024),
            kind,
            unit_number: unit,
            controller_key: unit.map(|_| 1000),
            backing: None,
        }
    }

    fn disks(units: impl IntoIterator<Item = i32>) -> Vec<VirtualDevice> {
        units
            .into_iter()
            .map(|u| device(2000 + u, DeviceKind::Disk, &format!("Hard disk {}", u + 1), Some(u)))
            .collect()
    }

    fn vm(devices: Vec<VirtualDevice>) -> VmSnapshot {
        VmSnapshot {
            moref: ManagedObjectRef::new("VirtualMachine", "vm-1"),
            name: "web01".into(),
            instance_uuid: Uuid::nil(),
            cpu_count: 2,
            memory_mb: 4096,
            power_state: PowerState::PoweredOff,
            guest_os: None,
            hostname: None,
            ip_address: None,
            devices,
        }
    }

    #[test]
    fn first_disk_gets_unit_zero() {
        assert_eq!(next_disk_unit(&[], &[]).unwrap(), 0);
    }

    #[test]
    fn unit_seven_is_skipped() {
        assert_eq!(next_disk_unit(&disks(0..=6), &[]).unwrap(), 8);
    }

    #[test]
    fn claimed_units_count_as_used() {
        assert_eq!(next_disk_unit(&disks([0]), &[1, 2]).unwrap(), 3);
        assert_eq!(next_disk_unit(&disks([0]), &[6]).unwrap(), 8);
    }

    #[test]
    fn full_controller_is_too_many_devices() {
        let units = (0..=15).filter(|u| *u != 7);
        assert_matches!(
            next_disk_unit(&disks(units), &[]),
            Err(HypervisorError::TooManyDevices(_))
        );
    }

    #[test]
    fn controller_and_adapters_do_not_take_units() {
        let mut devices = disks([0, 1]);
        devices.push(device(1000, DeviceKind::ScsiController, "SCSI controller 0", Some(7)));
        devices.push(device(4000, DeviceKind::EthernetCard, "Network adapter 1", Some(7)));
        assert_eq!(next_disk_unit(&devices, &[]).unwrap(), 2);
    }

    #[test]
    fn disk_add_uses_controller_and_thin_capacity() {
        let mut devices = disks([0]);
        devices.push(device(1000, DeviceKind::ScsiController, "SCSI controller 0", None));
        let change = DiskDeviceBuilder
            .build(&vm(devices), DeviceOperation::Add, Some(50), None, &mut Allocations::default())
            .unwrap();
        assert_eq!(change.file_operation, Some(FileOperation::Create));
        assert_eq!(
            change.device,
            DeviceSpec::Disk(DiskSpec {
                unit_number: 1,
                controller_key: 1000,
                capacity_kb: 50 * 1024 * 1024,
            })
        );
    }

    #[test]
    fn disk_add_without_controller_fails() {
        assert_matches!(
            DiskDeviceBuilder.build(
                &vm(disks([0])),
                DeviceOperation::Add,
                Some(10),
                None,
                &mut Allocations::default()
            ),
            Err(HypervisorError::DeviceNotFound(_))
        );
    }

    #[test]
    fn disk_remove_by_label() {
        let change = DiskDeviceBuilder
            .build(&vm(disks([0, 1])), DeviceOperation::Remove, None, Some(2), &mut Allocations::default())
            .unwrap();
        assert_eq!(change.file_operation, Some(FileOperation::Destroy));
        assert_matches!(change.device, DeviceSpec::Existing(d) if d.label == "Hard disk 2");

        assert_matches!(
            DiskDeviceBuilder.build(
                &vm(disks([0])),
                DeviceOperation::Remove,
                None,
                Some(9),
                &mut Allocations::default()
            ),
            Err(HypervisorError::DeviceNotFound(_))
        );
    }
}
