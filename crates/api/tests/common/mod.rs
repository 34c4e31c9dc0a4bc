#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use galilee_api::config::ServerConfig;
use galilee_api::router::build_app_router;
use galilee_api::state::AppState;
use galilee_core::config::Credential;
use galilee_db::memory::MemoryCacheStore;
use galilee_directory::memory::MemoryDirectory;
use galilee_directory::{DirectoryClient, DirectoryConfig};
use galilee_hypervisor::memory::MemoryHypervisor;
use galilee_hypervisor::{HypervisorClient, HypervisorConfig, PowerState};
use galilee_reconcile::{ReconcileConfig, ReconciliationService};

pub const DOMAIN: &str = "corp.example";
pub const BASE_DN: &str = "DC=corp,DC=example";
pub const ACTIVE_DN: &str = "OU=Active,DC=corp,DC=example";

pub const TEMPLATE: &str = "tpl-ubuntu-22";
pub const CLUSTER: &str = "cluster-prod";
pub const PORTGROUP: &str = "dv-prod-60";
pub const SPEC: &str = "linux-default";

/// The in-memory backends behind a test app, for seeding and inspection.
pub struct Backends {
    pub directory: Arc<MemoryDirectory>,
    pub hypervisor: MemoryHypervisor,
    pub cache: Arc<MemoryCacheStore>,
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
    }
}

fn directory_config() -> DirectoryConfig {
    DirectoryConfig {
        servers: vec!["ldaps://dc1.corp.example".to_string()],
        bind_principal: format!("svc-galilee@{DOMAIN}"),
        bind_password: Credential::new("unused"),
        domain: DOMAIN.to_string(),
        base_dn: BASE_DN.to_string(),
        active_base_dn: ACTIVE_DN.to_string(),
        quarantine_base_dn: "OU=LEAVED,DC=corp,DC=example".to_string(),
        timeout: Duration::from_secs(5),
        no_tls_verify: false,
    }
}

fn hypervisor_config() -> HypervisorConfig {
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

/// Build the full application router over fresh in-memory backends.
///
/// Uses the same [`build_app_router`] as the binary, so tests exercise the
/// production middleware stack.
pub fn build_test_app() -> (Router, Backends) {
    let directory = Arc::new(MemoryDirectory::new(DOMAIN, &[BASE_DN]));
    directory.seed_org_unit(BASE_DN, "Active");
    directory.seed_org_unit(BASE_DN, "LEAVED");

    let hypervisor = MemoryHypervisor::new();
    hypervisor.add_vm(TEMPLATE, PowerState::PoweredOff);
    hypervisor.add_cluster(CLUSTER, &[("vsan-prod-01", 2048)]);
    hypervisor.add_portgroup(PORTGROUP, 16, 4);
    hypervisor.add_customization_spec(SPEC);

    let cache = Arc::new(MemoryCacheStore::new());
    let service = ReconciliationService::new(
        DirectoryClient::with_connection(directory.clone(), directory_config()),
        HypervisorClient::with_connector(Arc::new(hypervisor.clone()), hypervisor_config()),
        cache.clone(),
        ReconcileConfig::default(),
    );

    let config = test_config();
    let state = AppState {
        service,
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config).unwrap();
    (
        app,
        Backends {
            directory,
            hypervisor,
            cache,
        },
    )
}

/// Send a GET request.
pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, None).await
}

/// Send a POST request with a JSON body.
pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, Method::POST, uri, Some(body)).await
}

/// Send a PATCH request with a JSON body.
pub async fn patch_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, Method::PATCH, uri, Some(body)).await
}

/// Send a bodiless POST request.
pub async fn post_empty(app: Router, uri: &str) -> Response {
    send(app, Method::POST, uri, None).await
}

/// Send a DELETE request.
pub async fn delete(app: Router, uri: &str) -> Response {
    send(app, Method::DELETE, uri, None).await
}

async fn send(app: Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
