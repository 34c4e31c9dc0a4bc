//! Directory connection settings.

use std::time::Duration;

use galilee_core::config::{env_list, env_or, env_parse, env_required, ConfigError, Credential};

/// Explicit, passed-in directory configuration. Built once at start-up.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Server URLs tried in order; the first is the primary.
    pub servers: Vec<String>,
    /// Service principal used for the long-lived bind.
    pub bind_principal: String,
    pub bind_password: Credential,
    /// Suffix appended to account names for UPNs and credential checks.
    pub domain: String,
    /// Base for [`SearchScope::All`](crate::SearchScope::All).
    pub base_dn: String,
    /// Base for active accounts and the org-unit tree.
    pub active_base_dn: String,
    /// Where off-boarded accounts are moved.
    pub quarantine_base_dn: String,
    /// Per-operation timeout.
    pub timeout: Duration,
    /// Skip TLS certificate verification (lab directories only).
    pub no_tls_verify: bool,
}

impl DirectoryConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                    | Default                         |
    /// |----------------------------|---------------------------------|
    /// | `LDAP_SERVERS`             | required, comma-separated URLs  |
    /// | `LDAP_BIND_PRINCIPAL`      | required                        |
    /// | `LDAP_BIND_PASSWORD[_FILE]`| required                        |
    /// | `LDAP_DOMAIN`              | required                        |
    /// | `LDAP_BASE_DN`             | required                        |
    /// | `LDAP_ACTIVE_BASE_DN`      | `LDAP_BASE_DN`                  |
    /// | `LDAP_QUARANTINE_BASE_DN`  | `OU=LEAVED,<LDAP_BASE_DN>`      |
    /// | `LDAP_TIMEOUT_SECS`        | `5`                             |
    /// | `LDAP_NO_TLS_VERIFY`       | `false`                         |
    pub fn from_env() -> Result<Self, ConfigError> {
        let servers = env_list("LDAP_SERVERS", "");
        if servers.is_empty() {
            return Err(ConfigError::Missing("LDAP_SERVERS"));
        }
        let base_dn = env_required("LDAP_BASE_DN")?;
        let active_base_dn = env_or("LDAP_ACTIVE_BASE_DN", &base_dn);
        let quarantine_base_dn =
            env_or("LDAP_QUARANTINE_BASE_DN", &format!("OU=LEAVED,{base_dn}"));

        Ok(Self {
            servers,
            bind_principal: env_required("LDAP_BIND_PRINCIPAL")?,
            bind_password: Credential::from_env("LDAP_BIND_PASSWORD")?,
            domain: env_required("LDAP_DOMAIN")?,
            base_dn,
            active_base_dn,
            quarantine_base_dn,
            timeout: Duration::from_secs(env_parse("LDAP_TIMEOUT_SECS", 5u64)?),
            no_tls_verify: env_parse("LDAP_NO_TLS_VERIFY", false)?,
        })
    }

    /// `account@domain`.
    pub fn principal_for(&self, account_name: &str) -> String {
        format!("{account_name}@{}", self.domain)
    }

    /// The server used for credential checks.
    pub fn primary_server(&self) -> Option<&str> {
        self.servers.first().map(String::as_str)
    }
}
