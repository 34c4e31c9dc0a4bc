use std::sync::Arc;
use std::time::Duration;

use galilee_core::config::Credential;
use galilee_hypervisor::memory::MemoryHypervisor;
use galilee_hypervisor::{DeployRequest, HypervisorClient, HypervisorConfig, PowerState};
use uuid::Uuid;

pub const TEMPLATE: &str = "tpl-ubuntu-22";
pub const CLUSTER: &str = "cluster-prod";
pub const PORTGROUP: &str = "dv-prod-60";
pub const SPEC: &str = "linux-default";

/// Short waits so stalled tasks time out quickly.
pub fn test_config() -> HypervisorConfig {
    HypervisorConfig {
        host: "vcenter.corp.example".to_string(),
        username: "svc-galilee@vsphere.local".to_string(),
        password: Credential::new("unused"),
        api_release: "8.0.2.0".to_string(),
        task_timeout: Duration::from_millis(200),
        task_poll_interval: Duration::from_millis(10),
        datastore_tag: "vsan".to_string(),
        hostname_prefix: "vm".to_string(),
        dns_servers: vec!["10.0.0.53".to_string()],
        power_on: false,
        accept_invalid_certs: false,
    }
}

/// A client over an inventory with one template, one cluster with a
/// roomy vSAN datastore, a distributed portgroup and a customization spec.
pub fn test_client() -> (HypervisorClient, MemoryHypervisor, Uuid) {
    let hv = MemoryHypervisor::new();
    let template = hv.add_vm(TEMPLATE, PowerState::PoweredOff);
    hv.add_cluster(CLUSTER, &[("vsan-prod-01", 2048), ("local-esx01", 4096)]);
    hv.add_portgroup(PORTGROUP, 16, 4);
    hv.add_customization_spec(SPEC);
    let client = HypervisorClient::with_connector(Arc::new(hv.clone()), test_config());
    (client, hv, template)
}

pub fn deploy_request(name: &str) -> DeployRequest {
    DeployRequest {
        name: name.to_string(),
        template: TEMPLATE.to_string(),
        cluster: CLUSTER.to_string(),
        cpu_count: 4,
        memory_gb: 8,
        annotation: "owner: jdoe".to_string(),
        network: PORTGROUP.to_string(),
        disk_gb: 50,
        customization_spec: SPEC.to_string(),
        ip: Some("10.64.60.21/24".parse().unwrap()),
        hostname: None,
        power_on: None,
    }
}
