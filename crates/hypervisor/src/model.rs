//! Inventory objects, device specs and requests.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handle to a hypervisor-side entity (`VirtualMachine:vm-42`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Inventory kinds that are looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    VirtualMachine,
    ClusterComputeResource,
    Datacenter,
    Datastore,
    /// Standard networks and distributed portgroups alike.
    Network,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::VirtualMachine => "VirtualMachine",
            ObjectKind::ClusterComputeResource => "ClusterComputeResource",
            ObjectKind::Datacenter => "Datacenter",
            ObjectKind::Datastore => "Datastore",
            ObjectKind::Network => "Network",
        }
    }
}

/// An inventory object with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedObject {
    pub moref: ManagedObjectRef,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

/// Requested power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DesiredPower {
    On,
    Off,
}

impl DesiredPower {
    pub fn is_satisfied_by(self, state: PowerState) -> bool {
        matches!(
            (self, state),
            (DesiredPower::On, PowerState::PoweredOn) | (DesiredPower::Off, PowerState::PoweredOff)
        )
    }
}

impl fmt::Display for DesiredPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DesiredPower::On => "powered on",
            DesiredPower::Off => "powered off",
        })
    }
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    EthernetCard,
    Disk,
    ScsiController,
    Other,
}

/// One entry of a VM's hardware device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDevice {
    pub key: i32,
    /// API type name, e.g. `VirtualVmxnet3`.
    pub type_name: String,
    /// Display label, e.g. `Hard disk 2`.
    pub label: String,
    pub kind: DeviceKind,
    pub unit_number: Option<i32>,
    pub controller_key: Option<i32>,
    /// Backed by a file on a datastore (disks, mounted images).
    pub file_backed: bool,
    pub capacity_kb: Option<i64>,
    pub backing: Option<NicBacking>,
}

/// Where a network adapter is connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NicBacking {
    Network {
        network: ManagedObjectRef,
        device_name: String,
    },
    DistributedPort {
        switch_uuid: String,
        portgroup_key: String,
        port_key: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceOperation {
    Add,
    Edit,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Create,
    Destroy,
}

/// A network adapter as it should look after the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NicSpec {
    /// Existing device key; `None` for a new adapter.
    pub key: Option<i32>,
    /// API type name of the adapter.
    pub device_type: String,
    pub backing: NicBacking,
    pub start_connected: bool,
    pub connected: bool,
}

/// A new thin-provisioned, persistent disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSpec {
    pub unit_number: i32,
    pub controller_key: i32,
    pub capacity_kb: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSpec {
    Nic(NicSpec),
    Disk(DiskSpec),
    /// An existing device, referenced for removal.
    Existing(VirtualDevice),
}

/// One element of a reconfiguration's device change list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChange {
    pub operation: DeviceOperation,
    pub file_operation: Option<FileOperation>,
    pub device: DeviceSpec,
}

/// Hardware configuration applied on clone or reconfigure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmConfigSpec {
    pub num_cpus: Option<i32>,
    pub num_cores_per_socket: Option<i32>,
    pub memory_mb: Option<i32>,
    pub annotation: Option<String>,
    pub device_change: Vec<DeviceChange>,
}

// ---------------------------------------------------------------------------
// Inventory snapshots
// ---------------------------------------------------------------------------

/// Point-in-time view of a VM, as used by deploy read-back and pull-sync.
#[derive(Debug, Clone, PartialEq)]
pub struct VmSnapshot {
    pub moref: ManagedObjectRef,
    pub name: String,
    pub instance_uuid: Uuid,
    pub cpu_count: i32,
    pub memory_mb: i32,
    pub power_state: PowerState,
    pub guest_os: Option<String>,
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub devices: Vec<VirtualDevice>,
}

impl VmSnapshot {
    /// Total capacity of all virtual disks, in whole GiB.
    pub fn disk_gb(&self) -> i32 {
        let kb: i64 = self
            .devices
            .iter()
            .filter(|d| d.kind == DeviceKind::Disk)
            .filter_map(|d| d.capacity_kb)
            .sum();
        (kb / (1024 * 1024)) as i32
    }

    pub fn devices_of(&self, kind: DeviceKind) -> impl Iterator<Item = &VirtualDevice> {
        self.devices.iter().filter(move |d| d.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datastore {
    pub moref: ManagedObjectRef,
    pub name: String,
    pub free_space_bytes: u64,
}

/// Everything a clone needs to know about its target cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPlacement {
    pub cluster: ManagedObjectRef,
    pub datacenter: ManagedObjectRef,
    pub resource_pool: ManagedObjectRef,
    pub vm_folder: ManagedObjectRef,
    pub datastores: Vec<Datastore>,
}

/// A network as seen by the NIC builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkInfo {
    Standard {
        moref: ManagedObjectRef,
        name: String,
    },
    Distributed {
        moref: ManagedObjectRef,
        name: String,
        switch: ManagedObjectRef,
        switch_uuid: String,
        portgroup_key: String,
        num_ports: i32,
        config_version: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DvPort {
    pub key: String,
    pub portgroup_key: String,
    pub switch_uuid: String,
}

/// A stored guest customization spec, kept as raw API JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomizationSpec(pub serde_json::Value);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub state: TaskState,
    pub error: Option<String>,
    pub result: Option<ManagedObjectRef>,
}

/// Arguments of a clone-from-template call.
#[derive(Debug, Clone, PartialEq)]
pub struct CloneRequest {
    pub name: String,
    pub folder: ManagedObjectRef,
    pub resource_pool: ManagedObjectRef,
    pub datastore: ManagedObjectRef,
    pub config: VmConfigSpec,
    pub customization: CustomizationSpec,
    pub power_on: bool,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A static IPv4 assignment in CIDR form (`10.64.60.21/24`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Assignment {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Assignment {
    pub fn netmask(&self) -> Ipv4Addr {
        let bits = u32::MAX.checked_shl(32 - u32::from(self.prefix_len)).unwrap_or(0);
        Ipv4Addr::from(bits)
    }

    /// First host address of the network.
    pub fn gateway(&self) -> Ipv4Addr {
        let network = u32::from(self.address) & u32::from(self.netmask());
        Ipv4Addr::from(network + 1)
    }
}

impl FromStr for Ipv4Assignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("'{s}' is not in address/prefix form"))?;
        let address: Ipv4Addr = addr
            .parse()
            .map_err(|_| format!("'{addr}' is not an IPv4 address"))?;
        let prefix_len: u8 = prefix
            .parse()
            .ok()
            .filter(|p| (1..=30).contains(p))
            .ok_or_else(|| format!("prefix '{prefix}' must be between 1 and 30"))?;
        let assignment = Self {
            address,
            prefix_len,
        };
        let host_bits = u32::from(address) & !u32::from(assignment.netmask());
        if host_bits == 0 {
            return Err(format!("'{s}' is a network address"));
        }
        Ok(assignment)
    }
}

impl TryFrom<String> for Ipv4Assignment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Assignment> for String {
    fn from(value: Ipv4Assignment) -> Self {
        format!("{}/{}", value.address, value.prefix_len)
    }
}

/// Clone a template into a new VM.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployRequest {
    pub name: String,
    pub template: String,
    pub cluster: String,
    pub cpu_count: i32,
    pub memory_gb: i32,
    pub annotation: String,
    /// Portgroup the first adapter is moved onto.
    pub network: String,
    /// Size of the additional data disk.
    pub disk_gb: i32,
    pub customization_spec: String,
    pub ip: Option<Ipv4Assignment>,
    /// Generated from the configured prefix when absent.
    pub hostname: Option<String>,
    /// Falls back to the configured default when absent.
    pub power_on: Option<bool>,
}

/// What a device reconfiguration targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "device", rename_all = "snake_case")]
pub enum DeviceTarget {
    /// A network adapter: `portgroup` for add/edit, `number` for remove.
    Network {
        portgroup: Option<String>,
        number: Option<u32>,
    },
    /// A disk: `size_gb` for add, `number` for remove.
    Disk {
        size_gb: Option<i32>,
        number: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub operation: DeviceOperation,
    pub target: DeviceTarget,
}

pub const NIC_LABEL_PREFIX: &str = "Network adapter ";
pub const DISK_LABEL_PREFIX: &str = "Hard disk ";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_assignment_derives_mask_and_gateway() {
        let ip: Ipv4Assignment = "10.64.60.21/24".parse().unwrap();
        assert_eq!(ip.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(ip.gateway(), Ipv4Addr::new(10, 64, 60, 1));

        let ip: Ipv4Assignment = "172.16.5.130/25".parse().unwrap();
        assert_eq!(ip.netmask(), Ipv4Addr::new(255, 255, 255, 128));
        assert_eq!(ip.gateway(), Ipv4Addr::new(172, 16, 5, 129));
    }

    #[test]
    fn ipv4_assignment_rejects_bad_input() {
        assert!("10.0.0.5".parse::<Ipv4Assignment>().is_err());
        assert!("10.0.0.0/24".parse::<Ipv4Assignment>().is_err());
        assert!("10.0.0.5/31".parse::<Ipv4Assignment>().is_err());
        assert!("10.0.0.500/24".parse::<Ipv4Assignment>().is_err());
    }

    #[test]
    fn disk_total_ignores_other_devices() {
        let disk = |key, gb: i64| VirtualDevice {
            key,
            type_name: "VirtualDisk".into(),
            label: format!("{DISK_LABEL_PREFIX}{key}"),
            kind: DeviceKind::Disk,
            unit_number: Some(key),
            controller_key: Some(1000),
            file_backed: true,
            capacity_kb: Some(gb * 1024 * 1024),
            backing: None,
        };
        let vm = VmSnapshot {
            moref: ManagedObjectRef::new("VirtualMachine", "vm-1"),
            name: "web01".into(),
            instance_uuid: Uuid::nil(),
            cpu_count: 2,
            memory_mb: 4096,
            power_state: PowerState::PoweredOff,
            guest_os: None,
            hostname: None,
            ip_address: None,
            devices: vec![disk(0, 40), disk(1, 50)],
        };
        assert_eq!(vm.disk_gb(), 90);
    }

    #[test]
    fn desired_power_matches_state() {
        assert!(DesiredPower::On.is_satisfied_by(PowerState::PoweredOn));
        assert!(!DesiredPower::Off.is_satisfied_by(PowerState::Suspended));
    }
}
