//! Caller-facing request payloads and their validation rules.
//!
//! Create payloads reject unknown keys, so directory-assigned fields such
//! as `objectGUID`, `dn` or row ids cannot be supplied by a caller.

use std::sync::LazyLock;

use chrono::NaiveDate;
use galilee_core::types::DbId;
use galilee_hypervisor::{DeviceOperation, DeviceTarget, Ipv4Assignment};
use regex::Regex;
use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

/// Pre-Windows 2000 logon name: at most 20 characters, no separators.
static ACCOUNT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,19}$").expect("valid regex"));

/// VM and hostnames: DNS label rules.
static HOST_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("valid regex")
});

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    #[validate(regex(path = *ACCOUNT_NAME, message = "must be 1-20 letters, digits, '.', '_' or '-'"))]
    pub account_name: String,
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    /// Cached org unit the account is created in.
    pub org_unit_id: DbId,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateOrgUnitRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    /// Cached parent; the active base when absent.
    pub parent_id: Option<DbId>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DeployVmRequest {
    #[validate(regex(path = *HOST_LABEL, message = "must be a valid DNS label"))]
    pub name: String,
    #[validate(length(min = 1))]
    pub template: String,
    #[validate(length(min = 1))]
    pub cluster: String,
    #[validate(range(min = 1, max = 64))]
    pub cpu_count: i32,
    #[validate(range(min = 1, max = 1024))]
    pub memory_gb: i32,
    #[validate(range(min = 1, max = 16384))]
    pub disk_gb: i32,
    #[validate(length(min = 1))]
    pub network: String,
    #[validate(length(min = 1))]
    pub customization_spec: String,
    #[serde(default)]
    pub annotation: String,
    /// Static address in CIDR form; DHCP when absent.
    #[validate(custom(function = "validate_ipv4"))]
    pub ip: Option<String>,
    #[validate(regex(path = *HOST_LABEL, message = "must be a valid DNS label"))]
    pub hostname: Option<String>,
    pub power_on: Option<bool>,
    pub owner_id: Option<DbId>,
    pub expiry_date: Option<NaiveDate>,
}

impl DeployVmRequest {
    pub fn ipv4(&self) -> Result<Option<Ipv4Assignment>, String> {
        self.ip.as_deref().map(str::parse).transpose()
    }
}

fn validate_ipv4(value: &str) -> Result<(), ValidationError> {
    value.parse::<Ipv4Assignment>().map(|_| ()).map_err(|message| {
        let mut err = ValidationError::new("ipv4_cidr");
        err.message = Some(message.into());
        err
    })
}

/// One device change on an existing VM.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceChangeRequest {
    pub operation: DeviceOperation,
    #[serde(flatten)]
    pub target: DeviceTarget,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PasswordRequest {
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Contact fields from a user change set; an empty value clears the field
/// and is not validated.
#[derive(Debug, Default, Validate)]
pub(crate) struct ContactUpdate {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
}

/// Flatten validator output into one readable line.
pub fn describe(errors: &ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let reasons: Vec<String> = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            format!("{field}: {}", reasons.join(", "))
        })
        .collect();
    parts.sort();
    format!("Invalid request: {}", parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> CreateUserRequest {
        CreateUserRequest {
            account_name: "jdoe".into(),
            display_name: "John Doe".into(),
            password: "Secret123!".into(),
            email: Some("jdoe@corp.example".into()),
            phone: None,
            org_unit_id: 1,
        }
    }

    #[test]
    fn accepts_valid_user() {
        assert!(user().validate().is_ok());
    }

    #[test]
    fn rejects_long_or_spaced_account_names() {
        let mut req = user();
        req.account_name = "john doe".into();
        let errors = req.validate().unwrap_err();
        assert!(describe(&errors).contains("account_name"));

        req.account_name = "a".repeat(21);
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_short_password_and_bad_email() {
        let mut req = user();
        req.password = "short".into();
        req.email = Some("not-an-address".into());
        let message = describe(&req.validate().unwrap_err());
        assert!(message.contains("password"));
        assert!(message.contains("email"));
    }

    #[test]
    fn deploy_ip_must_be_cidr() {
        let req = DeployVmRequest {
            name: "web01".into(),
            template: "tpl".into(),
            cluster: "c1".into(),
            cpu_count: 2,
            memory_gb: 4,
            disk_gb: 50,
            network: "pg".into(),
            customization_spec: "linux".into(),
            annotation: String::new(),
            ip: Some("10.0.0.5".into()),
            hostname: None,
            power_on: None,
            owner_id: None,
            expiry_date: None,
        };
        let message = describe(&req.validate().unwrap_err());
        assert!(message.contains("ip"));
    }

    #[test]
    fn create_org_unit_rejects_directory_assigned_keys() {
        let err = serde_json::from_str::<CreateOrgUnitRequest>(
            r#"{"name":"Finance","objectGUID":"0b3c1a7e-0000-0000-0000-000000000001"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown field `objectGUID`"));

        let err = serde_json::from_str::<CreateOrgUnitRequest>(
            r#"{"name":"Finance","dn":"OU=Evil,DC=x"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown field `dn`"));
    }

    #[test]
    fn create_user_rejects_row_id() {
        let err = serde_json::from_str::<CreateUserRequest>(
            r#"{"id":7,"account_name":"jdoe","display_name":"John Doe","password":"Secret123!","org_unit_id":1}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown field `id`"));
    }

    #[test]
    fn deploy_rejects_instance_uuid() {
        let err = serde_json::from_str::<DeployVmRequest>(
            r#"{"name":"web01","template":"tpl","cluster":"c1","cpu_count":2,"memory_gb":4,
                "disk_gb":50,"network":"pg","customization_spec":"linux",
                "instance_uuid":"4210aa00-0000-0000-0000-000000000000"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown field `instance_uuid`"));
    }

    #[test]
    fn device_change_deserializes_flat() {
        let req: DeviceChangeRequest =
            serde_json::from_str(r#"{"operation":"remove","device":"disk","number":2}"#).unwrap();
        assert_eq!(req.operation, DeviceOperation::Remove);
        assert_eq!(
            req.target,
            DeviceTarget::Disk {
                size_gb: None,
                number: Some(2)
            }
        );
    }
}
