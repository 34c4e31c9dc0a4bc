//! Datastore choice and guest customization for new VMs.

use rand::seq::IndexedRandom;
use serde_json::{json, Map, Value};

use crate::config::DATASTORE_MARGIN_GB;
use crate::error::{HypervisorError, HypervisorResult};
use crate::model::{CustomizationSpec, Datastore, Ipv4Assignment};

const GIB: u64 = 1024 * 1024 * 1024;
const HOSTNAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const HOSTNAME_SUFFIX_LEN: usize = 7;

/// Datastores whose name contains `tag` and whose whole free GiB exceed
/// `required_gb` plus the safety margin.
pub fn eligible_datastores<'a>(
    datastores: &'a [Datastore],
    required_gb: u64,
    tag: &str,
) -> Vec<&'a Datastore> {
    datastores
        .iter()
        .filter(|ds| ds.name.contains(tag))
        .filter(|ds| ds.free_space_bytes / GIB > required_gb + DATASTORE_MARGIN_GB)
        .collect()
}

/// Uniform random pick among [`eligible_datastores`].
pub fn select_datastore<'a>(
    datastores: &'a [Datastore],
    required_gb: u64,
    tag: &str,
) -> Option<&'a Datastore> {
    let candidates = eligible_datastores(datastores, required_gb, tag);
    tracing::debug!(
        candidates = ?candidates.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
        required_gb,
        "Datastore candidates"
    );
    candidates.choose(&mut rand::rng()).copied()
}

/// `<prefix>-<7 distinct characters from [a-z0-9]>`.
pub fn random_hostname(prefix: &str) -> String {
    let suffix: String = HOSTNAME_ALPHABET
        .choose_multiple(&mut rand::rng(), HOSTNAME_SUFFIX_LEN)
        .map(|b| char::from(*b))
        .collect();
    format!("{prefix}-{suffix}")
}

/// Per-deployment overrides applied to a stored customization spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestCustomization {
    pub hostname: String,
    pub ip: Option<Ipv4Assignment>,
    pub dns_servers: Vec<String>,
}

impl GuestCustomization {
    /// Write hostname, DNS servers and (if set) a fixed address for the
    /// first adapter into `spec`.
    pub fn apply(&self, spec: &mut CustomizationSpec) -> HypervisorResult<()> {
        let root = object(&mut spec.0, "customization spec")?;

        let identity = root
            .entry("identity")
            .or_insert_with(|| Value::Object(Map::new()));
        object(identity, "identity")?.insert(
            "hostName".to_string(),
            json!({"_typeName": "CustomizationFixedName", "name": self.hostname}),
        );

        root.insert(
            "globalIPSettings".to_string(),
            json!({
                "_typeName": "CustomizationGlobalIPSettings",
                "dnsServerList": self.dns_servers,
            }),
        );

        if let Some(ip) = &self.ip {
            root.insert(
                "nicSettingMap".to_string(),
                json!([{
                    "_typeName": "CustomizationAdapterMapping",
                    "adapter": {
                        "_typeName": "CustomizationIPSettings",
                        "ip": {"_typeName": "CustomizationFixedIp", "ipAddress": ip.address.to_string()},
                        "subnetMask": ip.netmask().to_string(),
                        "gateway": [ip.gateway().to_string()],
                    },
                }]),
            );
        }
        Ok(())
    }
}

fn object<'a>(value: &'a mut Value, what: &str) -> HypervisorResult<&'a mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| HypervisorError::Decode(format!("{what} is not an object")))
}
