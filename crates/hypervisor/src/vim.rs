//! vSphere VI/JSON client.
//!
//! Properties are read with `GET /{type}/{id}/{property}` and methods are
//! invoked with `POST /{type}/{id}/{method}`, both under
//! [`HypervisorConfig::base_url`]. The session travels in the
//! `vmware-api-session-id` header.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use galilee_core::config::Credential;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::config::HypervisorConfig;
use crate::error::{HypervisorError, HypervisorResult};
use crate::model::{
    CloneRequest, ClusterPlacement, CustomizationSpec, Datastore, DeviceChange, DeviceKind,
    DeviceOperation, DeviceSpec, DvPort, FileOperation, ManagedObjectRef, NamedObject,
    NetworkInfo, NicBacking, ObjectKind, PowerState, TaskInfo, TaskState, VirtualDevice,
    VmConfigSpec, VmSnapshot,
};
use crate::session::{HypervisorConnector, HypervisorSession};

const SESSION_HEADER: &str = "vmware-api-session-id";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const PORTGROUP_TYPE: &str = "DistributedVirtualPortgroup";

/// Opens VI/JSON sessions against one endpoint.
pub struct VimJsonConnector {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: Credential,
}

impl VimJsonConnector {
    pub fn new(config: &HypervisorConfig) -> HypervisorResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &HypervisorConfig) -> Self {
        Self {
            client,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceContent {
    root_folder: ManagedObjectRef,
    view_manager: ManagedObjectRef,
    search_index: ManagedObjectRef,
    session_manager: ManagedObjectRef,
    customization_spec_manager: Option<ManagedObjectRef>,
}

#[async_trait]
impl HypervisorConnector for VimJsonConnector {
    async fn connect(&self) -> HypervisorResult<Arc<dyn HypervisorSession>> {
        let content: ServiceContent = parse_response(
            self.client
                .get(format!("{}/ServiceInstance/ServiceInstance/content", self.base_url))
                .send()
                .await?,
        )
        .await?;

        let response = self
            .client
            .post(format!(
                "{}/SessionManager/{}/Login",
                self.base_url, content.session_manager.value
            ))
            .json(&json!({
                "userName": self.username,
                "password": self.password.expose(),
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HypervisorError::Connectivity(format!(
                "login as '{}' refused ({status})",
                self.username
            )));
        }
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                HypervisorError::Connectivity("login response carried no session id".into())
            })?;

        tracing::debug!(user = %self.username, "Hypervisor session opened");
        Ok(Arc::new(VimSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session_id,
            content,
        }))
    }
}

/// One logged-in VI/JSON session.
pub struct VimSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    content: ServiceContent,
}

impl VimSession {
    fn url(&self, moref: &ManagedObjectRef, member: &str) -> String {
        format!("{}/{}/{}/{}", self.base_url, moref.kind, moref.value, member)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        moref: &ManagedObjectRef,
        property: &str,
    ) -> HypervisorResult<T> {
        let response = self
            .client
            .get(self.url(moref, property))
            .header(SESSION_HEADER, &self.session_id)
            .send()
            .await?;
        parse_response(response).await
    }

    async fn post(
        &self,
        moref: &ManagedObjectRef,
        method: &str,
        body: Value,
    ) -> HypervisorResult<reqwest::Response> {
        let response = self
            .client
            .post(self.url(moref, method))
            .header(SESSION_HEADER, &self.session_id)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await
    }

    async fn invoke<T: DeserializeOwned>(
        &self,
        moref: &ManagedObjectRef,
        method: &str,
        body: Value,
    ) -> HypervisorResult<T> {
        let response = self.post(moref, method, body).await?;
        Ok(response.json::<T>().await?)
    }

    /// Like [`invoke`](Self::invoke) for methods that may return nothing.
    async fn invoke_optional<T: DeserializeOwned>(
        &self,
        moref: &ManagedObjectRef,
        method: &str,
        body: Value,
    ) -> HypervisorResult<Option<T>> {
        let text = self.post(moref, method, body).await?.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text).map_err(|e| HypervisorError::Decode(e.to_string()))
    }

    async fn start_task(
        &self,
        moref: &ManagedObjectRef,
        method: &str,
        body: Value,
    ) -> HypervisorResult<ManagedObjectRef> {
        let task: ManagedObjectRef = self.invoke(moref, method, body).await?;
        tracing::info!(target_object = %moref, method, task = %task.value, "Hypervisor task started");
        Ok(task)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VmConfigInfo {
    name: String,
    instance_uuid: String,
    guest_full_name: Option<String>,
    hardware: VmHardware,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VmHardware {
    #[serde(rename = "numCPU")]
    num_cpu: i32,
    #[serde(rename = "memoryMB")]
    memory_mb: i32,
    #[serde(default)]
    device: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VmRuntime {
    power_state: PowerState,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuestInfo {
    host_name: Option<String>,
    ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatastoreSummary {
    name: String,
    free_space: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PortgroupConfig {
    key: String,
    num_ports: i32,
    config_version: String,
    distributed_virtual_switch: ManagedObjectRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VimDvPort {
    key: String,
    portgroup_key: String,
    #[serde(default)]
    dvs_uuid: String,
}

#[derive(Debug, Deserialize)]
struct VimTaskInfo {
    state: String,
    error: Option<Value>,
    result: Option<Value>,
}

#[async_trait]
impl HypervisorSession for VimSession {
    async fn list_objects(&self, kind: ObjectKind) -> HypervisorResult<Vec<NamedObject>> {
        let view: ManagedObjectRef = self
            .invoke(
                &self.content.view_manager,
                "CreateContainerView",
                json!({
                    "container": moref_json(&self.content.root_folder),
                    "type": [kind.as_str()],
                    "recursive": true,
                }),
            )
            .await?;

        let listed = async {
            let refs: Vec<ManagedObjectRef> = self.get(&view, "view").await?;
            let mut objects = Vec::with_capacity(refs.len());
            for moref in refs {
                let name: String = self.get(&moref, "name").await?;
                objects.push(NamedObject { moref, name });
            }
            Ok::<_, HypervisorError>(objects)
        }
        .await;

        if let Err(e) = self.post(&view, "DestroyView", json!({})).await {
            tracing::warn!(view = %view, error = %e, "Failed to destroy container view");
        }
        listed
    }

    async fn find_vm_by_uuid(
        &self,
        instance_uuid: Uuid,
    ) -> HypervisorResult<Option<ManagedObjectRef>> {
        self.invoke_optional(
            &self.content.search_index,
            "FindByUuid",
            json!({
                "uuid": instance_uuid.to_string(),
                "vmSearch": true,
                "instanceUuid": true,
            }),
        )
        .await
    }

    async fn vm_snapshot(&self, vm: &ManagedObjectRef) -> HypervisorResult<VmSnapshot> {
        let config: VmConfigInfo = self.get(vm, "config").await?;
        let runtime: VmRuntime = self.get(vm, "runtime").await?;
        let guest: Option<GuestInfo> = self.get(vm, "guest").await?;
        let guest = guest.unwrap_or_default();

        let instance_uuid = Uuid::parse_str(&config.instance_uuid)
            .map_err(|e| HypervisorError::Decode(format!("instanceUuid: {e}")))?;

        Ok(VmSnapshot {
            moref: vm.clone(),
            name: config.name,
            instance_uuid,
            cpu_count: config.hardware.num_cpu,
            memory_mb: config.hardware.memory_mb,
            power_state: runtime.power_state,
            guest_os: config.guest_full_name,
            hostname: guest.host_name,
            ip_address: guest.ip_address,
            devices: config.hardware.device.iter().filter_map(parse_device).collect(),
        })
    }

    async fn cluster_placement(
        &self,
        cluster: &ManagedObjectRef,
    ) -> HypervisorResult<ClusterPlacement> {
        let refs: Vec<ManagedObjectRef> = self.get(cluster, "datastore").await?;
        let mut datastores = Vec::with_capacity(refs.len());
        for moref in refs {
            let summary: DatastoreSummary = self.get(&moref, "summary").await?;
            datastores.push(Datastore {
                moref,
                name: summary.name,
                free_space_bytes: u64::try_from(summary.free_space).unwrap_or(0),
            });
        }

        let resource_pool: ManagedObjectRef = self.get(cluster, "resourcePool").await?;
        let host_folder: ManagedObjectRef = self.get(cluster, "parent").await?;
        let datacenter: ManagedObjectRef = self.get(&host_folder, "parent").await?;
        let vm_folder: ManagedObjectRef = self.get(&datacenter, "vmFolder").await?;

        Ok(ClusterPlacement {
            cluster: cluster.clone(),
            datacenter,
            resource_pool,
            vm_folder,
            datastores,
        })
    }

    async fn network_info(&self, network: &ManagedObjectRef) -> HypervisorResult<NetworkInfo> {
        let name: String = self.get(network, "name").await?;
        if network.kind != PORTGROUP_TYPE {
            return Ok(NetworkInfo::Standard {
                moref: network.clone(),
                name,
            });
        }
        let config: PortgroupConfig = self.get(network, "config").await?;
        let switch_uuid: String = self.get(&config.distributed_virtual_switch, "uuid").await?;
        Ok(NetworkInfo::Distributed {
            moref: network.clone(),
            name,
            switch: config.distributed_virtual_switch,
            switch_uuid,
            portgroup_key: config.key,
            num_ports: config.num_ports,
            config_version: config.config_version,
        })
    }

    async fn free_dv_ports(
        &self,
        switch: &ManagedObjectRef,
        portgroup_key: &str,
    ) -> HypervisorResult<Vec<DvPort>> {
        let ports: Option<Vec<VimDvPort>> = self
            .invoke_optional(
                switch,
                "FetchDVPorts",
                json!({
                    "criteria": {
                        "_typeName": "DistributedVirtualSwitchPortCriteria",
                        "connected": false,
                        "inside": true,
                        "portgroupKey": [portgroup_key],
                    }
                }),
            )
            .await?;
        Ok(ports
            .unwrap_or_default()
            .into_iter()
            .map(|p| DvPort {
                key: p.key,
                portgroup_key: p.portgroup_key,
                switch_uuid: p.dvs_uuid,
            })
            .collect())
    }

    async fn resize_portgroup(
        &self,
        portgroup: &ManagedObjectRef,
        config_version: &str,
        num_ports: i32,
    ) -> HypervisorResult<ManagedObjectRef> {
        self.start_task(
            portgroup,
            "ReconfigureDVPortgroup_Task",
            json!({
                "spec": {
                    "_typeName": "DVPortgroupConfigSpec",
                    "configVersion": config_version,
                    "numPorts": num_ports,
                }
            }),
        )
        .await
    }

    async fn customization_spec(&self, name: &str) -> HypervisorResult<Option<CustomizationSpec>> {
        let manager = self.content.customization_spec_manager.as_ref().ok_or_else(|| {
            HypervisorError::Decode("endpoint has no customization spec manager".into())
        })?;
        match self
            .invoke::<Value>(manager, "GetCustomizationSpec", json!({ "name": name }))
            .await
        {
            Ok(mut item) => Ok(item.get_mut("spec").map(|spec| CustomizationSpec(spec.take()))),
            Err(HypervisorError::Api { body, .. }) if body.contains("NotFound") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn clone_vm(
        &self,
        template: &ManagedObjectRef,
        request: &CloneRequest,
    ) -> HypervisorResult<ManagedObjectRef> {
        self.start_task(
            template,
            "CloneVM_Task",
            json!({
                "folder": moref_json(&request.folder),
                "name": request.name,
                "spec": {
                    "_typeName": "VirtualMachineCloneSpec",
                    "location": {
                        "_typeName": "VirtualMachineRelocateSpec",
                        "datastore": moref_json(&request.datastore),
                        "pool": moref_json(&request.resource_pool),
                    },
                    "template": false,
                    "powerOn": request.power_on,
                    "customization": request.customization.0,
                    "config": config_spec_json(&request.config),
                }
            }),
        )
        .await
    }

    async fn power_on(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef> {
        self.start_task(vm, "PowerOnVM_Task", json!({})).await
    }

    async fn power_off(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef> {
        self.start_task(vm, "PowerOffVM_Task", json!({})).await
    }

    async fn reset(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef> {
        self.start_task(vm, "ResetVM_Task", json!({})).await
    }

    async fn reconfigure(
        &self,
        vm: &ManagedObjectRef,
        spec: &VmConfigSpec,
    ) -> HypervisorResult<ManagedObjectRef> {
        self.start_task(vm, "ReconfigVM_Task", json!({ "spec": config_spec_json(spec) }))
            .await
    }

    async fn destroy(&self, vm: &ManagedObjectRef) -> HypervisorResult<ManagedObjectRef> {
        self.start_task(vm, "Destroy_Task", json!({})).await
    }

    async fn task_info(&self, task: &ManagedObjectRef) -> HypervisorResult<TaskInfo> {
        let info: VimTaskInfo = self.get(task, "info").await?;
        Ok(task_info_from(info))
    }

    async fn logout(&self) -> HypervisorResult<()> {
        self.post(&self.content.session_manager, "Logout", json!({}))
            .await?;
        tracing::debug!("Hypervisor session closed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

/// Return the response unchanged on 2xx, otherwise
/// [`HypervisorError::Api`] with the status and body text.
async fn ensure_success(response: reqwest::Response) -> HypervisorResult<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(HypervisorError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> HypervisorResult<T> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

fn task_info_from(info: VimTaskInfo) -> TaskInfo {
    let state = match info.state.as_str() {
        "success" => TaskState::Success,
        "error" => TaskState::Error,
        "running" => TaskState::Running,
        _ => TaskState::Queued,
    };
    let error = info.error.map(|e| {
        e.get("localizedMessage")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| e.to_string())
    });
    let result = info
        .result
        .and_then(|r| serde_json::from_value::<ManagedObjectRef>(r).ok());
    TaskInfo {
        state,
        error,
        result,
    }
}

// ---------------------------------------------------------------------------
// Device mapping
// ---------------------------------------------------------------------------

const SCSI_CONTROLLER_TYPES: &[&str] = &[
    "VirtualLsiLogicController",
    "VirtualLsiLogicSASController",
    "VirtualBusLogicController",
    "ParaVirtualSCSIController",
];

const ETHERNET_TYPES: &[&str] = &[
    "VirtualE1000",
    "VirtualE1000e",
    "VirtualPCNet32",
    "VirtualSriovEthernetCard",
];

fn device_kind(type_name: &str) -> DeviceKind {
    if type_name == "VirtualDisk" {
        DeviceKind::Disk
    } else if SCSI_CONTROLLER_TYPES.contains(&type_name) {
        DeviceKind::ScsiController
    } else if ETHERNET_TYPES.contains(&type_name) || type_name.starts_with("VirtualVmxnet") {
        DeviceKind::EthernetCard
    } else {
        DeviceKind::Other
    }
}

fn parse_device(value: &Value) -> Option<VirtualDevice> {
    let type_name = value.get("_typeName")?.as_str()?;
    let kind = device_kind(type_name);
    let int = |field: &str| {
        value
            .get(field)
            .and_then(Value::as_i64)
            .and_then(|n| i32::try_from(n).ok())
    };
    let backing = value.get("backing");
    let nic_backing = backing
        .filter(|_| kind == DeviceKind::EthernetCard)
        .and_then(parse_nic_backing);

    Some(VirtualDevice {
        key: int("key")?,
        type_name: type_name.to_string(),
        label: value
            .pointer("/deviceInfo/label")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        unit_number: int("unitNumber"),
        controller_key: int("controllerKey"),
        file_backed: backing.and_then(|b| b.get("fileName")).is_some(),
        capacity_kb: value.get("capacityInKB").and_then(Value::as_i64),
        backing: nic_backing,
        kind,
    })
}

fn parse_nic_backing(backing: &Value) -> Option<NicBacking> {
    let str_at = |ptr: &str| backing.pointer(ptr).and_then(Value::as_str).map(str::to_string);
    if let Some(port) = backing.get("port") {
        let field = |name: &str| port.get(name).and_then(Value::as_str).map(str::to_string);
        return Some(NicBacking::DistributedPort {
            switch_uuid: field("switchUuid")?,
            portgroup_key: field("portgroupKey")?,
            port_key: field("portKey").unwrap_or_default(),
        });
    }
    Some(NicBacking::Network {
        network: serde_json::from_value(backing.get("network")?.clone()).ok()?,
        device_name: str_at("/deviceName").unwrap_or_default(),
    })
}

fn moref_json(moref: &ManagedObjectRef) -> Value {
    json!({
        "_typeName": "ManagedObjectReference",
        "type": moref.kind,
        "value": moref.value,
    })
}

fn config_spec_json(spec: &VmConfigSpec) -> Value {
    let mut out = Map::new();
    out.insert("_typeName".into(), json!("VirtualMachineConfigSpec"));
    if let Some(n) = spec.num_cpus {
        out.insert("numCPUs".into(), json!(n));
    }
    if let Some(n) = spec.num_cores_per_socket {
        out.insert("numCoresPerSocket".into(), json!(n));
    }
    if let Some(n) = spec.memory_mb {
        out.insert("memoryMB".into(), json!(n));
    }
    if let Some(a) = &spec.annotation {
        out.insert("annotation".into(), json!(a));
    }
    if !spec.device_change.is_empty() {
        let changes: Vec<Value> = spec
            .device_change
            .iter()
            .enumerate()
            .map(|(i, c)| device_change_json(c, -(i as i32) - 1))
            .collect();
        out.insert("deviceChange".into(), Value::Array(changes));
    }
    Value::Object(out)
}

/// `temp_key` is the negative placeholder key new devices need.
fn device_change_json(change: &DeviceChange, temp_key: i32) -> Value {
    let operation = match change.operation {
        DeviceOperation::Add => "add",
        DeviceOperation::Edit => "edit",
        DeviceOperation::Remove => "remove",
    };
    let mut out = json!({
        "_typeName": "VirtualDeviceConfigSpec",
        "operation": operation,
        "device": device_json(&change.device, temp_key),
    });
    if let Some(file_op) = change.file_operation {
        out["fileOperation"] = json!(match file_op {
            FileOperation::Create => "create",
            FileOperation::Destroy => "destroy",
        });
    }
    out
}

fn device_json(device: &DeviceSpec, temp_key: i32) -> Value {
    match device {
        DeviceSpec::Nic(nic) => {
            let backing = match &nic.backing {
                NicBacking::Network {
                    network,
                    device_name,
                } => json!({
                    "_typeName": "VirtualEthernetCardNetworkBackingInfo",
                    "deviceName": device_name,
                    "network": moref_json(network),
                    "useAutoDetect": false,
                }),
                NicBacking::DistributedPort {
                    switch_uuid,
                    portgroup_key,
                    port_key,
                } => json!({
                    "_typeName": "VirtualEthernetCardDistributedVirtualPortBackingInfo",
                    "port": {
                        "_typeName": "DistributedVirtualSwitchPortConnection",
                        "switchUuid": switch_uuid,
                        "portgroupKey": portgroup_key,
                        "portKey": port_key,
                    },
                }),
            };
            let mut out = json!({
                "_typeName": nic.device_type,
                "key": nic.key.unwrap_or(temp_key),
                "backing": backing,
                "connectable": {
                    "_typeName": "VirtualDeviceConnectInfo",
                    "startConnected": nic.start_connected,
                    "allowGuestControl": true,
                    "connected": nic.connected,
                    "status": "untried",
                },
            });
            if nic.key.is_none() {
                out["addressType"] = json!("assigned");
                out["wakeOnLanEnabled"] = json!(true);
            }
            out
        }
        DeviceSpec::Disk(disk) => json!({
            "_typeName": "VirtualDisk",
            "key": temp_key,
            "unitNumber": disk.unit_number,
            "controllerKey": disk.controller_key,
            "capacityInKB": disk.capacity_kb,
            "backing": {
                "_typeName": "VirtualDiskFlatVer2BackingInfo",
                "fileName": "",
                "thinProvisioned": true,
                "diskMode": "persistent",
            },
        }),
        DeviceSpec::Existing(existing) => json!({
            "_typeName": existing.type_name,
            "key": existing.key,
        }),
    }
}
