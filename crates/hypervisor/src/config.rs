//! Hypervisor management endpoint settings.

use std::time::Duration;

use galilee_core::config::{env_list, env_or, env_parse, env_required, ConfigError, Credential};

/// Free space a datastore must keep beyond the requested disk size.
pub const DATASTORE_MARGIN_GB: u64 = 170;

/// Ports added to a distributed portgroup that has none free.
pub const PORTGROUP_EXTEND_STEP: i32 = 8;

#[derive(Debug, Clone)]
pub struct HypervisorConfig {
    /// Management endpoint host, e.g. `vcenter.corp.example`.
    pub host: String,
    pub username: String,
    pub password: Credential,
    /// VI/JSON API release segment of the URL.
    pub api_release: String,
    /// Upper bound on any single task wait.
    pub task_timeout: Duration,
    pub task_poll_interval: Duration,
    /// Substring a datastore name must contain to be used for placement.
    pub datastore_tag: String,
    /// Prefix of generated guest hostnames.
    pub hostname_prefix: String,
    pub dns_servers: Vec<String>,
    /// Power state of a freshly deployed VM when the request does not say.
    pub power_on: bool,
    /// Accept self-signed endpoint certificates (lab only).
    pub accept_invalid_certs: bool,
}

impl HypervisorConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default    |
    /// |---------------------------|------------|
    /// | `VC_HOST`                 | required   |
    /// | `VC_USERNAME`             | required   |
    /// | `VC_PASSWORD[_FILE]`      | required   |
    /// | `VC_API_RELEASE`          | `8.0.2.0`  |
    /// | `VC_TASK_TIMEOUT_SECS`    | `1800`     |
    /// | `VC_TASK_POLL_MS`         | `1000`     |
    /// | `VC_DATASTORE_TAG`        | `vsan`     |
    /// | `VC_HOSTNAME_PREFIX`      | `vm`       |
    /// | `VC_DNS_SERVERS`          | empty      |
    /// | `VC_POWER_ON`             | `false`    |
    /// | `VC_ACCEPT_INVALID_CERTS` | `false`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_required("VC_HOST")?,
            username: env_required("VC_USERNAME")?,
            password: Credential::from_env("VC_PASSWORD")?,
            api_release: env_or("VC_API_RELEASE", "8.0.2.0"),
            task_timeout: Duration::from_secs(env_parse("VC_TASK_TIMEOUT_SECS", 1800u64)?),
            task_poll_interval: Duration::from_millis(env_parse("VC_TASK_POLL_MS", 1000u64)?),
            datastore_tag: env_or("VC_DATASTORE_TAG", "vsan"),
            hostname_prefix: env_or("VC_HOSTNAME_PREFIX", "vm"),
            dns_servers: env_list("VC_DNS_SERVERS", ""),
            power_on: env_parse("VC_POWER_ON", false)?,
            accept_invalid_certs: env_parse("VC_ACCEPT_INVALID_CERTS", false)?,
        })
    }

    /// `https://<host>/sdk/vim25/<release>`.
    pub fn base_url(&self) -> String {
        format!("https://{}/sdk/vim25/{}", self.host, self.api_release)
    }
}
