#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use galilee_core::config::Credential;
use galilee_db::memory::MemoryCacheStore;
use galilee_db::models::org_unit::OrgUnit;
use galilee_directory::memory::MemoryDirectory;
use galilee_directory::{DirectoryClient, DirectoryConfig};
use galilee_hypervisor::memory::MemoryHypervisor;
use galilee_hypervisor::{HypervisorClient, HypervisorConfig};
use galilee_reconcile::requests::{CreateOrgUnitRequest, CreateUserRequest, DeployVmRequest};
use galilee_reconcile::{ReconcileConfig, ReconciliationService};

pub const DOMAIN: &str = "corp.example";
pub const BASE_DN: &str = "DC=corp,DC=example";
pub const ACTIVE_DN: &str = "OU=Active,DC=corp,DC=example";
pub const QUARANTINE_DN: &str = "OU=LEAVED,DC=corp,DC=example";

pub const TEMPLATE: &str = "tpl-ubuntu-22";
pub const CLUSTER: &str = "cluster-prod";
pub const PORTGROUP: &str = "dv-prod-60";
pub const SPEC: &str = "linux-default";

pub struct Harness {
    pub service: ReconciliationService,
    pub directory: Arc<MemoryDirectory>,
    pub hypervisor: MemoryHypervisor,
    pub cache: Arc<MemoryCacheStore>,
}

pub fn directory_config() -> DirectoryConfig {
    DirectoryConfig {
        servers: vec!["ldaps://dc1.corp.example".to_string()],
        bind_principal: format!("svc-galilee@{DOMAIN}"),
        bind_password: Credential::new("unused"),
        domain: DOMAIN.to_string(),
        base_dn: BASE_DN.to_string(),
        active_base_dn: ACTIVE_DN.to_string(),
        quarantine_base_dn: QUARANTINE_DN.to_string(),
        timeout: Duration::from_secs(5),
        no_tls_verify: false,
    }
}

pub fn hypervisor_config() -> HypervisorConfig {
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

pub fn harness() -> Harness {
    harness_with(ReconcileConfig::default())
}

/// A service over an empty cache, a directory holding the active and
/// quarantine containers, and an inventory ready for one deploy.
pub fn harness_with(config: ReconcileConfig) -> Harness {
    let directory = Arc::new(MemoryDirectory::new(DOMAIN, &[BASE_DN]));
    directory.seed_org_unit(BASE_DN, "Active");
    directory.seed_org_unit(BASE_DN, "LEAVED");

    let hypervisor = MemoryHypervisor::new();
    hypervisor.add_vm(TEMPLATE, galilee_hypervisor::PowerState::PoweredOff);
    hypervisor.add_cluster(CLUSTER, &[("vsan-prod-01", 2048)]);
    hypervisor.add_portgroup(PORTGROUP, 16, 4);
    hypervisor.add_customization_spec(SPEC);

    let cache = Arc::new(MemoryCacheStore::new());
    let service = ReconciliationService::new(
        DirectoryClient::with_connection(directory.clone(), directory_config()),
        HypervisorClient::with_connector(Arc::new(hypervisor.clone()), hypervisor_config()),
        cache.clone(),
        config,
    );
    Harness {
        service,
        directory,
        hypervisor,
        cache,
    }
}

pub fn user_request(account: &str, display_name: &str, org_unit_id: i64) -> CreateUserRequest {
    CreateUserRequest {
        account_name: account.to_string(),
        display_name: display_name.to_string(),
        password: "Winter2026!".to_string(),
        email: Some(format!("{account}@corp.example")),
        phone: Some("+1 555 0100".to_string()),
        org_unit_id,
    }
}

pub fn deploy_request(name: &str) -> DeployVmRequest {
    DeployVmRequest {
        name: name.to_string(),
        template: TEMPLATE.to_string(),
        cluster: CLUSTER.to_string(),
        cpu_count: 4,
        memory_gb: 8,
        disk_gb: 50,
        network: PORTGROUP.to_string(),
        customization_spec: SPEC.to_string(),
        annotation: "owner: jdoe".to_string(),
        ip: Some("10.64.60.21/24".to_string()),
        hostname: None,
        power_on: None,
        owner_id: Some(42),
        expiry_date: None,
    }
}

impl Harness {
    /// Create an org unit through the service and return its cached row.
    pub async fn org_unit(&self, name: &str, parent_id: Option<i64>) -> OrgUnit {
        self.service
            .create_org_unit(CreateOrgUnitRequest {
                name: name.to_string(),
                parent_id,
            })
            .await
            .unwrap()
            .record
            .expect("org unit created")
    }
}
