//! In-memory inventory implementing [`HypervisorConnector`] and
//! [`HypervisorSession`], with failure injection. Enabled by the `testing`
//! feature.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{HypervisorError, HypervisorResult};
use crate::model::{
    CloneRequest, ClusterPlacement, CustomizationSpec, Datastore, DeviceChange, DeviceKind,
    DeviceOperation, DeviceSpec, DvPort, ManagedObjectRef, NamedObject, NetworkInfo, NicBacking,
    ObjectKind, PowerState, TaskInfo, TaskState, VirtualDevice, VmConfigSpec, VmSnapshot,
    DISK_LABEL_PREFIX, NIC_LABEL_PREFIX,
};
use crate::session::{HypervisorConnector, HypervisorSession};

const GIB: u64 = 1024 * 1024 * 1024;
const SCSI_CONTROLLER_KEY: i32 = 1000;

/// Calls that can be made to fail with an API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOp {
    Connect,
    Logout,
    Lookup,
    Clone,
    PowerOn,
    PowerOff,
    Reset,
    Reconfigure,
    Destroy,
    ResizePortgroup,
}

/// How submitted tasks finish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Apply the change and report success on the first poll.
    #[default]
    Complete,
    /// Stay running forever; nothing is applied.
    Stall,
    /// Report the error state with this message; nothing is applied.
    Fail(String),
}

struct Cluster {
    moref: ManagedObjectRef,
    name: String,
    datastores: Vec<Datastore>,
}

struct Portgroup {
    key: String,
    switch: ManagedObjectRef,
    switch_uuid: String,
    num_ports: i32,
    used_ports: i32,
    config_version: u32,
}

struct Network {
    moref: ManagedObjectRef,
    name: String,
    portgroup: Option<Portgroup>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    vms: Vec<VmSnapshot>,
    clusters: Vec<Cluster>,
    networks: Vec<Network>,
    specs: HashMap<String, Value>,
    tasks: HashMap<String, TaskInfo>,
    failures: Vec<FailOp>,
    task_outcome: TaskOutcome,
    offline: bool,
    sessions_opened: usize,
    logouts: usize,
    operations: Vec<String>,
    last_clone: Option<CloneRequest>,
}

impl State {
    fn next(&mut self, kind: &str, prefix: &str) -> ManagedObjectRef {
        self.next_id += 1;
        ManagedObjectRef::new(kind, format!("{prefix}-{}", self.next_id))
    }

    fn guard(&self, op: FailOp) -> HypervisorResult<()> {
        if self.offline {
            return Err(HypervisorError::Connectivity("endpoint offline".to_string()));
        }
        if self.failures.contains(&op) {
            return Err(HypervisorError::Api {
                status: 500,
                body: format!("injected {op:?} failure"),
            });
        }
        Ok(())
    }

    fn vm_index(&self, vm: &ManagedObjectRef) -> HypervisorResult<usize> {
        self.vms
            .iter()
            .position(|v| &v.moref == vm)
            .ok_or_else(|| HypervisorError::Api {
                status: 500,
                body: format!("ManagedObjectNotFound: {vm}"),
            })
    }

    /// Record a task. Returns whether the change should be applied now.
    fn submit(&mut self, result: Option<ManagedObjectRef>) -> (ManagedObjectRef, bool) {
        let task = self.next("Task", "task");
        let (info, apply) = match &self.task_outcome {
            TaskOutcome::Complete => (
                TaskInfo {
                    state: TaskState::Success,
                    error: None,
                    result,
                },
                true,
            ),
            TaskOutcome::Stall => (
                TaskInfo {
                    state: TaskState::Running,
                    error: None,
                    result: None,
                },
                false,
            ),
            TaskOutcome::Fail(message) => (
                TaskInfo {
                    state: TaskState::Error,
                    error: Some(message.clone()),
                    result: None,
                },
                false,
            ),
        };
        self.tasks.insert(task.value.clone(), info);
        (task, apply)
    }

    fn fail_task(&mut self, message: &str) -> ManagedObjectRef {
        let task = self.next("Task", "task");
        self.tasks.insert(
            task.value.clone(),
            TaskInfo {
                state: TaskState::Error,
                error: Some(message.to_string()),
                result: None,
            },
        );
        task
    }

    fn claim_port(&mut self, portgroup_key: &str) {
        if let Some(pg) = self
            .networks
            .iter_mut()
            .filter_map(|n| n.portgroup.as_mut())
            .find(|pg| pg.key == portgroup_key)
        {
            pg.used_ports += 1;
        }
    }

    fn release_port(&mut self, backing: Option<&NicBacking>) {
        if let Some(NicBacking::DistributedPort { portgroup_key, .. }) = backing {
            if let Some(pg) = self
                .networks
                .iter_mut()
                .filter_map(|n| n.portgroup.as_mut())
                .find(|pg| &pg.key == portgroup_key)
            {
                pg.used_ports -= 1;
            }
        }
    }

    fn apply_config(&mut self, index: usize, spec: &VmConfigSpec) {
        if let Some(n) = spec.num_cpus {
            self.vms[index].cpu_count = n;
        }
        if let Some(n) = spec.memory_mb {
            self.vms[index].memory_mb = n;
        }
        for change in &spec.device_change {
            self.apply_device_change(index, change);
        }
    }

    fn apply_device_change(&mut self, index: usize, change: &DeviceChange) {
        match (&change.operation, &change.device) {
            (DeviceOperation::Add, DeviceSpec::Nic(nic)) => {
                if let NicBacking::DistributedPort { portgroup_key, .. } = &nic.backing {
                    self.claim_port(portgroup_key);
                }
                let vm = &mut self.vms[index];
                let count = vm.devices_of(DeviceKind::EthernetCard).count();
                let key = 4000 + vm.devices.len() as i32;
                vm.devices.push(VirtualDevice {
                    key,
                    type_name: nic.device_type.clone(),
                    label: format!("{NIC_LABEL_PREFIX}{}", count + 1),
                    kind: DeviceKind::EthernetCard,
                    unit_number: None,
                    controller_key: Some(100),
                    file_backed: false,
                    capacity_kb: None,
                    backing: Some(nic.backing.clone()),
                });
            }
            (DeviceOperation::Edit, DeviceSpec::Nic(nic)) => {
                if let NicBacking::DistributedPort { portgroup_key, .. } = &nic.backing {
                    self.claim_port(portgroup_key);
                }
                let previous = self.vms[index]
                    .devices
                    .iter_mut()
                    .find(|d| Some(d.key) == nic.key)
                    .and_then(|d| d.backing.replace(nic.backing.clone()));
                self.release_port(previous.as_ref());
            }
            (DeviceOperation::Add, DeviceSpec::Disk(disk)) => {
                let vm = &mut self.vms[index];
                let count = vm.devices_of(DeviceKind::Disk).count();
                vm.devices.push(VirtualDevice {
                    key: 2000 + disk.unit_number,
                    type_name: "VirtualDisk".to_string(),
                    label: format!("{DISK_LABEL_PREFIX}{}", count + 1),
                    kind: DeviceKind::Disk,
                    unit_number: Some(disk.unit_number),
                    controller_key: Some(disk.controller_key),
                    file_backed: true,
                    capacity_kb: Some(disk.capacity_kb),
                    backing: None,
                });
            }
            (DeviceOperation::Remove, DeviceSpec::Existing(existing)) => {
                let vm = &mut self.vms[index];
                vm.devices.retain(|d| d.key != existing.key);
                self.release_port(existing.backing.as_ref());
            }
            (operation, device) => {
                tracing::warn!(?operation, ?device, "Ignoring unsupported device change");
            }
        }
    }
}

/// A hypervisor endpoint held in memory. Sessions opened from it share its
/// inventory.
#[derive(Clone, Default)]
pub struct MemoryHypervisor {
    state: Arc<Mutex<State>>,
}

impl MemoryHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    // -----------------------------------------------------------------------
    // Failure injection
    // -----------------------------------------------------------------------

    pub fn fail(&self, op: FailOp) {
        self.lock().failures.push(op);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Connecting and every session call fail with a connectivity error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn set_task_outcome(&self, outcome: TaskOutcome) {
        self.lock().task_outcome = outcome;
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    /// A cluster with `(name, free GiB)` datastores.
    pub fn add_cluster(&self, name: &str, datastores: &[(&str, u64)]) -> ManagedObjectRef {
        let mut state = self.lock();
        let moref = state.next("ClusterComputeResource", "domain-c");
        let datastores = datastores
            .iter()
            .map(|(ds_name, free_gb)| Datastore {
                moref: state.next("Datastore", "datastore"),
                name: ds_name.to_string(),
                free_space_bytes: free_gb * GIB,
            })
            .collect();
        state.clusters.push(Cluster {
            moref: moref.clone(),
            name: name.to_string(),
            datastores,
        });
        moref
    }

    pub fn add_network(&self, name: &str) -> ManagedObjectRef {
        let mut state = self.lock();
        let moref = state.next("Network", "network");
        state.networks.push(Network {
            moref: moref.clone(),
            name: name.to_string(),
            portgroup: None,
        });
        moref
    }

    /// A distributed portgroup with `used` of `num_ports` ports connected.
    pub fn add_portgroup(&self, name: &str, num_ports: i32, used: i32) -> ManagedObjectRef {
        let mut state = self.lock();
        let moref = state.next("DistributedVirtualPortgroup", "dvportgroup");
        let switch = state.next("VmwareDistributedVirtualSwitch", "dvs");
        let portgroup = Portgroup {
            key: moref.value.clone(),
            switch_uuid: format!("50 2a {}", switch.value),
            switch,
            num_ports,
            used_ports: used,
            config_version: 1,
        };
        state.networks.push(Network {
            moref: moref.clone(),
            name: name.to_string(),
            portgroup: Some(portgroup),
        });
        moref
    }

    pub fn add_customization_spec(&self, name: &str) {
        self.lock().specs.insert(
            name.to_string(),
            json!({
                "_typeName": "CustomizationSpec",
                "identity": {"_typeName": "CustomizationLinuxPrep", "domain": "corp.example"},
                "globalIPSettings": {"_typeName": "CustomizationGlobalIPSettings"},
                "nicSettingMap": [],
            }),
        );
    }

    /// A powered-off VM with one SCSI controller, a 40 GiB disk and one
    /// adapter. Templates are plain VMs here.
    pub fn add_vm(&self, name: &str, power_state: PowerState) -> Uuid {
        let mut state = self.lock();
        let moref = state.next("VirtualMachine", "vm");
        let network = state.next("Network", "network");
        let instance_uuid = Uuid::new_v4();
        state.vms.push(VmSnapshot {
            moref,
            name: name.to_string(),
            instance_uuid,
            cpu_count: 2,
            memory_mb: 4096,
            power_state,
            guest_os: Some("Ubuntu Linux (64-bit)".to_string()),
            hostname: None,
            ip_address: None,
            devices: vec![
                VirtualDevice {
                    key: SCSI_CONTROLLER_KEY,
                    type_name: "ParaVirtualSCSIController".to_string(),
                    label: "SCSI controller 0".to_string(),
                    kind: DeviceKind::ScsiController,
                    unit_number: Some(3),
                    controller_key: Some(100),
                    file_backed: false,
                    capacity_kb: None,
                    backing: None,
                },
                VirtualDevice {
                    key: 2000,
                    type_name: "VirtualDisk".to_string(),
                    label: format!("{DISK_LABEL_PREFIX}1"),
                    kind: DeviceKind::Disk,
                    unit_number: Some(0),
                    controller_key: Some(SCSI_CONTROLLER_KEY),
                    file_backed: true,
                    capacity_kb: Some(40 * 1024 * 1024),
                    backing: None,
                },
                VirtualDevice {
                    key: 4000,
                    type_name: "VirtualVmxnet3".to_string(),
                    label: format!("{NIC_LABEL_PREFIX}1"),
                    kind: DeviceKind::EthernetCard,
                    unit_number: Some(7),
                    controller_key: Some(100),
                    file_backed: false,
                    capacity_kb: None,
                    backing: Some(NicBacking::Network {
                        network,
                        device_name: "VM Network".to_string(),
                    }),
                },
            ],
        });
        instance_uuid
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn vm(&self, instance_uuid: Uuid) -> Option<VmSnapshot> {
        self.lock()
            .vms
            .iter()
            .find(|v| v.instance_uuid == instance_uuid)
            .cloned()
    }

    pub fn vm_named(&self, name: &str) -> Option<VmSnapshot> {
        self.lock().vms.iter().find(|v| v.name == name).cloned()
    }

    pub fn vm_count(&self) -> usize {
        self.lock().vms.len()
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub fn logouts(&self) -> usize {
        self.lock().logouts
    }

    /// Submitted tasks in order, e.g. `"clone web01"`, `"power_off vm-3"`.
    pub fn operations(&self) -> Vec<String> {
        self.lock().operations.clone()
    }

    /// `(num_ports, used_ports)` of a distributed portgroup.
    pub fn portgroup_ports(&self, name: &str) -> Option<(i32, i32)> {
        self.lock()
            .networks
            .iter()
            .find(|n| n.name == name)
            .and_then(|n| n.portgroup.as_ref())
            .map(|pg| (pg.num_ports, pg.used_ports))
    }

    pub fn last_clone(&self) -> Option<CloneRequest> {
        self.lock().last_clone.clone()
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl HypervisorConnector for MemoryHypervisor {
    async fn connect(&self) -> HypervisorResult<Arc<dyn HypervisorSession>> {
        let mut state = self.lock();
        if state.offline || state.failures.contains(&FailOp::Connect) {
            return Err(HypervisorError::Connectivity("login refused".to_string()));
        }
        state.sessions_opened += 1;
        Ok(Arc::new(MemorySession {
            state: self.state.clone(),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<State>>,
}

impl MemorySession {
    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn power_task(
        &self,
        vm: &ManagedObjectRef,
        op: FailOp,
        label: &str,
        target: PowerState,
    ) -> HypervisorResult<ManagedObjectRef> {
        let mut state = self.lock();
        state.guard(op)?;
        let index = state.vm_index(vm)?;
        state.operations.push(format!("{label} {}", vm.value));
        let (task, apply) = state.submit(None);
        if apply {
            state.vms[index].power_state = target;
        }
        Ok(task)
    }
}

#[async_trait]
impl HypervisorSession for MemorySession {
    async fn list_objects(&self, kind: ObjectKind) -> HypervisorResult<Vec<NamedObject>> {
        let state = self.lock();
        state.guard(FailOp::Lookup)?;
        let named = |moref: &ManagedObjectRef, name: &str| NamedObject {
            moref: moref.clone(),
            name: name.to_string(),
        };
        Ok(match kind {
            ObjectKind::VirtualMachine => {
                state.vms.iter().map(|v| named(&v.moref, &v.name)).collect()
            }
            ObjectKind::ClusterComputeResource => state
                .clusters
                .iter()
                .map(|c| named(&c.moref, &c.name))
                .collect(),
            ObjectKind::Network => state
                .networks
                .iter()
                .map(|n| named(&n.moref, &n.name))
                .collect(),
            ObjectKind::Datastore => state
                .clusters
                .iter()
                .flat_map(|c| c.datastores.iter())
                .map(|d| named(&d.moref, &d.name))
                .collect(),
            ObjectKind::Datacenter => vec![named(
                &ManagedObjectRef::new("Datacenter", "datacenter-1"),
                "Datacenter",
            )],
        })
    }

    async fn find_vm_by_uuid(
        &self,
        instance_uuid: Uuid,
    ) -> HypervisorResult<Option<ManagedObjectRef>> {
        let state = self.lock();
        state.guard(FailOp::Lookup)?;
        Ok(state
            .vms
            .iter()
            .find(|v| v.instance_uuid == instance_uuid)
            .map(|v| v.moref.clone()))
    }

    async fn vm_snapshot(&self, vm: &ManagedObjectRef) -> HypervisorResult<VmSnapshot> {
        let state = self.lock();
        state.guard(FailOp::Lookup)?;
        let index = state.vm_index(vm)?;
        Ok(state.vms[index].clone())
    }

    async fn cluster_placement(
        &self,
        cluster: &ManagedObjectRef,
    ) -> HypervisorResult<ClusterPlacement> {
        let state = self.lock();
        state.guard(FailOp::Lookup)?;
        let found = state
            .clusters
            .iter()
            .find(|c| &c.moref == cluster)
            .ok_or_else(|| HypervisorError::not_found("ClusterComputeResource", cluster.to_string()))?;
        Ok(ClusterPlacement {
            cluster: cluster.clone(),
            datacenter: ManagedObjectRef::new("Datacenter", "datacenter-1"),
            resource_pool: ManagedObjectRef::new("ResourcePool", format!("resgroup-{}", cluster.value)),
            vm_folder: ManagedObjectRef::new("Folder", "group-v1"),
            datastores: found.datastores.clone(),
        })
    }

    async fn network_info(&self, network: &ManagedObjectRef) -> HypervisorResult<NetworkInfo> {
        let state = self.lock();
        state.guard(FailOp::Lookup)?;
        let found = state
            .networks
            .iter()
            .find(|n| &n.moref == network)
            .ok_or_else(|| HypervisorError::not_found("Network", network.to_string()))?;
        Ok(match &found.portgroup {
            None => NetworkInfo::Standard {
                moref: found.moref.clone(),
                name: found.name.clone(),
            },
            Some(pg) => NetworkInfo::Distributed {
                moref: found.moref.clone(),
                name: found.name.clone(),
                switch: pg.switch.clone(),
                switch_uuid: pg.switch_uuid.clone(),
                portgroup_key: pg.key.clone(),
                num_ports: pg.num_ports,
                config_version: pg.config_version.to_string(),
            },
        })
    }

    async fn free_dv_ports(
        &self,
        switch: &ManagedObjectRef,
        portgroup_key: &str,
    ) -> HypervisorResult<Vec<DvPort>> {
        let state = self.lock();
        state.guard(FailOp::Lookup)?;
        let Some(pg) = state
            .networks
            .iter()
            .filter_map(|n| n.portgroup.as_ref())
            .find(|pg| &pg.switch == switch && pg.key == portgroup_key)
        else {
            return Ok(Vec::new());
        };
        Ok((pg.used_ports..pg.num_ports)
            .map(|port| DvPort {
                key: port.to_string(),
                portgroup_key: pg.key.clone(),
                switch_uuid: pg.switch_uuid.clone(),
            })
            .collect())
    }

    async fn resize_portgroup(
        &self,
        portgroup: &ManagedObjectRef,
        config_version: &str,
        num_ports: i32,
    ) -> HypervisorResult<ManagedObjectRef> {
        let mut state = self.lock();
        state.guard(FailOp::ResizePortgroup)?;
        state
            .operations
            .push(format!("resize_portgroup {} {num_ports}", portgroup.value));
        let (task, apply) = state.submit(None);
        if apply {
            if let Some(pg) = state
                .networks
                .iter_mut()
                .find(|n| &n.moref == portgroup)
                .and_then(|n| n.portgroup.as_mut())
                .filter(|pg| pg.config_version.to_string() == config_version)
            {
                pg.num_ports = num_ports;
                pg.config_version += 1;
            }
        }
        Ok(task)
    }

    async fn customization_spec(&self, name: &str) -> HypervisorResult<Option<CustomizationSpec>> {
        let state = self.lock();
        state.guard(FailOp::Lookup)?;
        Ok(state.specs.get(name).cloned().map(CustomizationSpec))
    }

    async fn clone_vm(
        &self,
        template: &ManagedObjectRef,
        request: &CloneRequest,
    ) -> HypervisorResult<ManagedObjectRef> {
        let mut state = self.lock();
        state.guard(FailOp::Clone)?;
        let source = state.vm_index(template)?;
        state.operations.push(format!("clone {}", request.name));
        state.last_clone = Some(request.clone());

        let moref = state.next("VirtualMachine", "vm");
        let (task, apply) = state.submit(Some(moref.clone()));
        if apply {
            let spec = &request.customization.0;
            let text = |ptr: &str| spec.pointer(ptr).and_then(Value::as_str).map(str::to_string);
            let mut vm = state.vms[source].clone();
            vm.moref = moref;
            vm.name = request.name.clone();
            vm.instance_uuid = Uuid::new_v4();
            vm.hostname = text("/identity/hostName/name");
            vm.ip_address = text("/nicSettingMap/0/adapter/ip/ipAddress");
            vm.power_state = if request.power_on {
                PowerState::PoweredOn
            } else {
                PowerState::PoweredOff
            };
            state.vms.push(vm);
            let index = state.vms.len() - 1;
            state.apply_config(index, &request.config);
        }
        Ok(task)
    }

    async fn power_on(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef> {
        self.power_task(vm, FailOp::PowerOn, "power_on", PowerState::PoweredOn)
    }

    async fn power_off(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef> {
        self.power_task(vm, FailOp::PowerOff, "power_off", PowerState::PoweredOff)
    }

    async fn reset(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef> {
        self.power_task(vm, FailOp::Reset, "reset", PowerState::PoweredOn)
    }

    async fn reconfigure(
        &self,
        vm: &ManagedObjectRef,
        spec: &VmConfigSpec,
    ) -> HypervisorResult<ManagedObjectRef> {
        let mut state = self.lock();
        state.guard(FailOp::Reconfigure)?;
        let index = state.vm_index(vm)?;
        state.operations.push(format!("reconfigure {}", vm.value));
        let (task, apply) = state.submit(None);
        if apply {
            state.apply_config(index, spec);
        }
        Ok(task)
    }

    async fn destroy(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef> {
        let mut state = self.lock();
        state.guard(FailOp::Destroy)?;
        let index = state.vm_index(vm)?;
        state.operations.push(format!("destroy {}", vm.value));
        if state.vms[index].power_state == PowerState::PoweredOn {
            return Ok(state.fail_task("The attempted operation cannot be performed in the current state (Powered on)."));
        }
        let (task, apply) = state.submit(None);
        if apply {
            let removed = state.vms.remove(index);
            for device in removed.devices_of(DeviceKind::EthernetCard) {
                state.release_port(device.backing.as_ref());
            }
        }
        Ok(task)
    }

    async fn task_info(&self, task: &ManagedObjectRef) -> HypervisorResult<TaskInfo> {
        let state = self.lock();
        if state.offline {
            return Err(HypervisorError::Connectivity("endpoint offline".to_string()));
        }
        state
            .tasks
            .get(&task.value)
            .cloned()
            .ok_or_else(|| HypervisorError::not_found("Task", task.to_string()))
    }

    async fn logout(&self) -> HypervisorResult<()> {
        let mut state = self.lock();
        state.logouts += 1;
        state.guard(FailOp::Logout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clone_applies_config_and_customization() {
        let hv = MemoryHypervisor::new();
        let template = hv.add_vm("tpl-ubuntu", PowerState::PoweredOff);
        let session = hv.connect().await.unwrap();
        let template_ref = session.find_vm_by_uuid(template).await.unwrap().unwrap();

        let request = CloneRequest {
            name: "web01".into(),
            folder: ManagedObjectRef::new("Folder", "group-v1"),
            resource_pool: ManagedObjectRef::new("ResourcePool", "resgroup-1"),
            datastore: ManagedObjectRef::new("Datastore", "datastore-1"),
            config: VmConfigSpec {
                num_cpus: Some(4),
                memory_mb: Some(8192),
                ..Default::default()
            },
            customization: CustomizationSpec(json!({
                "identity": {"hostName": {"name": "vm-abc1234"}},
                "nicSettingMap": [{"adapter": {"ip": {"ipAddress": "10.0.0.5"}}}],
            })),
            power_on: true,
        };
        let task = session.clone_vm(&template_ref, &request).await.unwrap();
        let info = session.task_info(&task).await.unwrap();
        assert_eq!(info.state, TaskState::Success);

        let vm = hv.vm_named("web01").unwrap();
        assert_eq!(info.result, Some(vm.moref.clone()));
        assert_eq!(vm.cpu_count, 4);
        assert_eq!(vm.memory_mb, 8192);
        assert_eq!(vm.hostname.as_deref(), Some("vm-abc1234"));
        assert_eq!(vm.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(vm.power_state, PowerState::PoweredOn);
        assert_ne!(vm.instance_uuid, template);
    }

    #[tokio::test]
    async fn destroying_a_running_vm_fails_the_task() {
        let hv = MemoryHypervisor::new();
        let uuid = hv.add_vm("db01", PowerState::PoweredOn);
        let session = hv.connect().await.unwrap();
        let vm = session.find_vm_by_uuid(uuid).await.unwrap().unwrap();

        let task = session.destroy(&vm).await.unwrap();
        assert_eq!(session.task_info(&task).await.unwrap().state, TaskState::Error);
        assert!(hv.vm(uuid).is_some());
    }

    #[tokio::test]
    async fn free_ports_track_usage() {
        let hv = MemoryHypervisor::new();
        let pg = hv.add_portgroup("dv-prod", 4, 3);
        let session = hv.connect().await.unwrap();
        let NetworkInfo::Distributed {
            switch,
            portgroup_key,
            ..
        } = session.network_info(&pg).await.unwrap()
        else {
            panic!("expected a distributed portgroup");
        };
        let ports = session.free_dv_ports(&switch, &portgroup_key).await.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].key, "3");
    }

    #[tokio::test]
    async fn offline_endpoint_refuses_login() {
        let hv = MemoryHypervisor::new();
        hv.set_offline(true);
        let err = hv.connect().await.err().unwrap();
        assert!(err.is_connectivity());
        assert_eq!(hv.sessions_opened(), 0);
    }
}
