//! Search results and their mapping onto user / org-unit attributes.

use std::collections::HashMap;

use galilee_core::account_control::AccountControl;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attributes read for user entries.
pub const USER_ATTRIBUTES: &[&str] = &[
    "name",
    "memberOf",
    "sAMAccountName",
    "badPwdCount",
    "displayName",
    "mail",
    "userAccountControl",
    "userPrincipalName",
    "telephoneNumber",
];

/// Attributes read for org-unit entries.
pub const ORG_UNIT_ATTRIBUTES: &[&str] = &["name", "objectGUID"];

pub const USER_FILTER: &str = "(objectClass=user)";
pub const ORG_UNIT_FILTER: &str = "(objectClass=organizationalUnit)";

/// Which configured base a search starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    All,
    #[default]
    Active,
    Quarantine,
}

/// How far below the base a search reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDepth {
    /// The base entry only.
    Base,
    Subtree,
}

/// The two entry kinds this system creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    User,
    OrgUnit,
}

impl EntryKind {
    pub fn object_classes(self) -> &'static [&'static str] {
        match self {
            EntryKind::User => &["top", "person", "organizationalPerson", "user"],
            EntryKind::OrgUnit => &["top", "organizationalUnit"],
        }
    }
}

/// One directory entry as returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DirectoryEntry {
    pub dn: String,
    #[serde(rename = "attributes")]
    pub attrs: HashMap<String, Vec<String>>,
    /// Values that are not valid UTF-8 (e.g. `objectGUID`).
    #[serde(skip)]
    pub bin_attrs: HashMap<String, Vec<Vec<u8>>>,
}

impl DirectoryEntry {
    /// All string values of `attr` (case-insensitive name match).
    pub fn values(&self, attr: &str) -> &[String] {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(attr))
            .map(|(_, v)| v.as_slice())
            .unwrap_or_default()
    }

    /// First string value of `attr`.
    pub fn first(&self, attr: &str) -> Option<&str> {
        self.values(attr).first().map(String::as_str)
    }

    /// First raw value of `attr`, looking in both maps.
    pub fn first_bytes(&self, attr: &str) -> Option<&[u8]> {
        self.bin_attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(attr))
            .and_then(|(_, v)| v.first())
            .map(Vec::as_slice)
            .or_else(|| self.first(attr).map(str::as_bytes))
    }

    /// `objectGUID`, decoded from its mixed-endian wire form.
    pub fn object_guid(&self) -> Option<Uuid> {
        let bytes: [u8; 16] = self.first_bytes("objectGUID")?.try_into().ok()?;
        Some(Uuid::from_bytes_le(bytes))
    }

    fn first_i32(&self, attr: &str) -> Option<i32> {
        self.first(attr).and_then(|v| v.trim().parse().ok())
    }
}

/// A user entry reduced to the attributes the cache mirrors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAttributes {
    pub account_name: String,
    pub display_name: String,
    pub user_principal_name: String,
    pub dn: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub member_of: Vec<String>,
    pub bad_password_count: i32,
    pub account_control: AccountControl,
}

impl UserAttributes {
    /// `None` when the entry lacks `sAMAccountName`.
    pub fn from_entry(entry: &DirectoryEntry) -> Option<Self> {
        let account_name = entry.first("sAMAccountName")?.to_string();
        let display_name = entry
            .first("displayName")
            .or_else(|| entry.first("name"))
            .unwrap_or(&account_name)
            .to_string();
        Some(Self {
            display_name,
            user_principal_name: entry
                .first("userPrincipalName")
                .unwrap_or_default()
                .to_string(),
            dn: entry.dn.clone(),
            email: entry.first("mail").map(str::to_string),
            phone: entry.first("telephoneNumber").map(str::to_string),
            member_of: entry.values("memberOf").to_vec(),
            bad_password_count: entry.first_i32("badPwdCount").unwrap_or(0),
            account_control: AccountControl::from(
                entry
                    .first_i32("userAccountControl")
                    .unwrap_or(AccountControl::enabled().bits() as i32),
            ),
            account_name,
        })
    }
}

/// An org-unit entry reduced to the attributes the cache mirrors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrgUnitAttributes {
    pub name: String,
    pub object_guid: Uuid,
    pub dn: String,
}

impl OrgUnitAttributes {
    /// `None` when the entry has no decodable `objectGUID`.
    pub fn from_entry(entry: &DirectoryEntry) -> Option<Self> {
        let object_guid = entry.object_guid()?;
        let name = entry
            .first("name")
            .map(str::to_string)
            .or_else(|| galilee_core::dn::rdn_value(&entry.dn))?;
        Some(Self {
            name,
            object_guid,
            dn: entry.dn.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dn: &str, attrs: &[(&str, &str)]) -> DirectoryEntry {
        let mut out = DirectoryEntry {
            dn: dn.to_string(),
            ..Default::default()
        };
        for (k, v) in attrs {
            out.attrs
                .entry(k.to_string())
                .or_default()
                .push(v.to_string());
        }
        out
    }

    #[test]
    fn attribute_lookup_ignores_case() {
        let e = entry("CN=a,DC=x", &[("sAMAccountName", "jdoe")]);
        assert_eq!(e.first("samaccountname"), Some("jdoe"));
        assert!(e.values("mail").is_empty());
    }

    #[test]
    fn guid_uses_mixed_endian_layout() {
        let guid = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let mut e = entry("OU=Corp,DC=x", &[("name", "Corp")]);
        e.bin_attrs
            .insert("objectGUID".into(), vec![guid.to_bytes_le().to_vec()]);
        assert_eq!(e.first_bytes("objectGUID").unwrap()[0], 0x33);
        assert_eq!(e.object_guid(), Some(guid));
    }

    #[test]
    fn maps_user_entry() {
        let e = entry(
            "CN=John Doe,OU=Corp,DC=x",
            &[
                ("sAMAccountName", "jdoe"),
                ("displayName", "John Doe"),
                ("userPrincipalName", "jdoe@corp.example"),
                ("memberOf", "CN=Staff,DC=x"),
                ("memberOf", "CN=VPN,DC=x"),
                ("badPwdCount", "2"),
                ("userAccountControl", "66050"),
            ],
        );
        let user = UserAttributes::from_entry(&e).unwrap();
        assert_eq!(user.member_of.len(), 2);
        assert_eq!(user.bad_password_count, 2);
        assert!(user.account_control.is_disabled());
        assert_eq!(user.email, None);
    }

    #[test]
    fn org_unit_without_guid_is_skipped() {
        let e = entry("OU=Corp,DC=x", &[("name", "Corp")]);
        assert!(OrgUnitAttributes::from_entry(&e).is_none());
    }
}
