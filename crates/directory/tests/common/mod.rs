use std::sync::Arc;
use std::time::Duration;

use galilee_core::config::Credential;
use galilee_directory::memory::MemoryDirectory;
use galilee_directory::{DirectoryClient, DirectoryConfig};

pub const DOMAIN: &str = "corp.example";
pub const BASE_DN: &str = "DC=corp,DC=example";
pub const ACTIVE_DN: &str = "OU=Active,DC=corp,DC=example";
pub const QUARANTINE_DN: &str = "OU=LEAVED,DC=corp,DC=example";

/// Build a test `DirectoryConfig` pointing at nothing in particular.
pub fn test_config() -> DirectoryConfig {
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

/// A client over an in-memory directory holding the base, active and
/// quarantine containers.
pub fn test_client() -> (DirectoryClient, Arc<MemoryDirectory>) {
    let dir = Arc::new(MemoryDirectory::new(DOMAIN, &[BASE_DN]));
    dir.seed_org_unit(BASE_DN, "Active");
    dir.seed_org_unit(BASE_DN, "LEAVED");
    let client = DirectoryClient::with_connection(dir.clone(), test_config());
    (client, dir)
}

pub fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, Vec<String>)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
        .collect()
}
