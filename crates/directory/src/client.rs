//! High-level directory operations on top of a [`DirectoryConnection`].

use std::sync::Arc;

use galilee_core::account_control::AccountControl;
use galilee_core::dn::{self, RdnKind};
use galilee_core::fields::FieldChanges;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::DirectoryConfig;
use crate::connection::DirectoryConnection;
use crate::entry::{
    DirectoryEntry, EntryKind, OrgUnitAttributes, SearchDepth, SearchScope, UserAttributes,
    ORG_UNIT_ATTRIBUTES, ORG_UNIT_FILTER, USER_ATTRIBUTES, USER_FILTER,
};
use crate::error::{DirectoryError, DirectoryResult, ProvisionStep};
use crate::filter;
use crate::ldap::LdapConnection;
use crate::password::{encode_password, PASSWORD_ATTRIBUTE};

/// Identity-bearing attributes that an update may never touch.
pub const IMMUTABLE_ATTRIBUTES: &[&str] = &["sAMAccountName", "userPrincipalName", "displayName"];

/// Structural attribute: a change renames the entry.
pub const NAME_ATTRIBUTE: &str = "name";

/// Structural attribute: a change moves the entry.
pub const PATH_ATTRIBUTE: &str = "distinguishedName";

pub const ACCOUNT_CONTROL_ATTRIBUTE: &str = "userAccountControl";

/// Directory operations used by the reconciliation service.
///
/// Cheap to clone; all clones share one long-lived connection.
#[derive(Clone)]
pub struct DirectoryClient {
    conn: Arc<dyn DirectoryConnection>,
    config: Arc<DirectoryConfig>,
}

impl DirectoryClient {
    /// Connect to the configured server pool.
    pub async fn connect(config: DirectoryConfig) -> DirectoryResult<Self> {
        let conn = LdapConnection::connect(&config).await?;
        Ok(Self::with_connection(Arc::new(conn), config))
    }

    pub fn with_connection(conn: Arc<dyn DirectoryConnection>, config: DirectoryConfig) -> Self {
        Self {
            conn,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Unbind the shared connection. Called once at service stop.
    pub async fn shutdown(&self) -> DirectoryResult<()> {
        self.conn.close().await
    }

    fn base_for(&self, scope: SearchScope) -> &str {
        match scope {
            SearchScope::All => &self.config.base_dn,
            SearchScope::Active => &self.config.active_base_dn,
            SearchScope::Quarantine => &self.config.quarantine_base_dn,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Subtree search below the base for `scope`. An empty `attrs` returns
    /// every user attribute.
    #[instrument(skip(self, attrs))]
    pub async fn search(
        &self,
        scope: SearchScope,
        filter: &str,
        attrs: &[&str],
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        self.conn
            .search(self.base_for(scope), SearchDepth::Subtree, filter, attrs)
            .await
    }

    pub async fn find_user(&self, account_name: &str) -> DirectoryResult<Option<DirectoryEntry>> {
        let filter = filter::and(&[
            USER_FILTER,
            filter::eq("sAMAccountName", account_name).as_str(),
        ]);
        Ok(self
            .search(SearchScope::All, &filter, USER_ATTRIBUTES)
            .await?
            .into_iter()
            .next())
    }

    /// Read one entry by DN; `None` if it does not exist.
    pub async fn find_by_dn(
        &self,
        dn: &str,
        attrs: &[&str],
    ) -> DirectoryResult<Option<DirectoryEntry>> {
        match self
            .conn
            .search(dn, SearchDepth::Base, "(objectClass=*)", attrs)
            .await
        {
            Ok(entries) => Ok(entries.into_iter().next()),
            Err(DirectoryError::NoSuchObject(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Locate an org unit by its directory-assigned GUID.
    pub async fn find_org_unit(&self, guid: Uuid) -> DirectoryResult<Option<DirectoryEntry>> {
        Ok(self
            .search(SearchScope::All, &filter::object_guid(guid), ORG_UNIT_ATTRIBUTES)
            .await?
            .into_iter()
            .next())
    }

    pub async fn list_users(&self, scope: SearchScope) -> DirectoryResult<Vec<UserAttributes>> {
        let entries = self.search(scope, USER_FILTER, USER_ATTRIBUTES).await?;
        Ok(entries.iter().filter_map(UserAttributes::from_entry).collect())
    }

    /// Org units below the active base.
    pub async fn list_org_units(&self) -> DirectoryResult<Vec<OrgUnitAttributes>> {
        let entries = self
            .search(SearchScope::Active, ORG_UNIT_FILTER, ORG_UNIT_ATTRIBUTES)
            .await?;
        Ok(entries
            .iter()
            .filter_map(OrgUnitAttributes::from_entry)
            .collect())
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Add an entry.
    ///
    /// For a user the initial password is then set and the account enabled.
    /// A failure in either step leaves the entry in place and is reported
    /// as [`DirectoryError::IncompleteProvisioning`].
    #[instrument(skip(self, attrs, initial_password))]
    pub async fn create_entry(
        &self,
        dn: &str,
        kind: EntryKind,
        attrs: &[(String, Vec<String>)],
        initial_password: Option<&str>,
    ) -> DirectoryResult<()> {
        let encoded = match (kind, initial_password) {
            (EntryKind::User, Some(password)) => Some(encode_password(password)?),
            (EntryKind::User, None) => {
                return Err(DirectoryError::Unsupported(
                    "a user entry needs an initial password".to_string(),
                ))
            }
            (EntryKind::OrgUnit, _) => None,
        };

        self.conn.add(dn, kind.object_classes(), attrs).await?;
        info!(dn = %dn, ?kind, "Directory entry added");

        let Some(encoded) = encoded else {
            return Ok(());
        };

        if let Err(e) = self
            .conn
            .modify_replace(dn, PASSWORD_ATTRIBUTE, vec![encoded])
            .await
        {
            return Err(incomplete(dn, ProvisionStep::SetPassword, e));
        }
        let enabled = AccountControl::enabled().bits().to_string().into_bytes();
        if let Err(e) = self
            .conn
            .modify_replace(dn, ACCOUNT_CONTROL_ATTRIBUTE, vec![enabled])
            .await
        {
            return Err(incomplete(dn, ProvisionStep::EnableAccount, e));
        }
        Ok(())
    }

    /// Apply a change set and return the entry's final DN.
    ///
    /// The whole set is checked for immutable attributes before anything is
    /// written. A rename (`name`) and a move (`distinguishedName`) run
    /// first, in that order; every later write targets the updated DN.
    /// Plain attributes are written only when [`compare_attribute`] says
    /// they differ.
    ///
    /// [`compare_attribute`]: Self::compare_attribute
    #[instrument(skip(self, changes))]
    pub async fn update_entry(&self, dn: &str, changes: &FieldChanges) -> DirectoryResult<String> {
        let is_cn = dn::rdn_type(dn).is_some_and(|t| t.eq_ignore_ascii_case(RdnKind::Cn.as_str()));
        for (attr, _) in changes.iter() {
            let immutable = IMMUTABLE_ATTRIBUTES
                .iter()
                .any(|i| i.eq_ignore_ascii_case(attr))
                || (is_cn && attr.eq_ignore_ascii_case(NAME_ATTRIBUTE));
            if immutable {
                return Err(DirectoryError::ImmutableAttribute(attr.to_string()));
            }
        }

        let mut working = dn.to_string();

        if let Some(new_name) = lookup(changes, NAME_ATTRIBUTE) {
            if !self.compare_attribute(&working, NAME_ATTRIBUTE, new_name).await {
                working = self.rename(&working, new_name).await?;
            }
        }

        if let Some(target) = lookup(changes, PATH_ATTRIBUTE) {
            if !dn::dn_eq(&working, target) {
                let (rdn, parent) = dn::split_rdn(target);
                let parent = parent.ok_or_else(|| {
                    DirectoryError::Unsupported(format!("target DN '{target}' has no parent"))
                })?;
                self.conn.modify_dn(&working, rdn, Some(parent)).await?;
                info!(from = %working, to = %target, "Directory entry moved");
                working = target.to_string();
            }
        }

        for (attr, value) in changes.iter().filter(|(attr, _)| {
            !attr.eq_ignore_ascii_case(NAME_ATTRIBUTE) && !attr.eq_ignore_ascii_case(PATH_ATTRIBUTE)
        }) {
            if self.compare_attribute(&working, attr, value).await {
                continue;
            }
            let values = if value.is_empty() {
                Vec::new()
            } else {
                vec![value.as_bytes().to_vec()]
            };
            self.conn.modify_replace(&working, attr, values).await?;
        }

        Ok(working)
    }

    async fn rename(&self, dn: &str, new_name: &str) -> DirectoryResult<String> {
        let is_ou = dn::rdn_type(dn).is_some_and(|t| t.eq_ignore_ascii_case(RdnKind::Ou.as_str()));
        let parent = dn::parent_of(dn).filter(|_| is_ou).ok_or_else(|| {
            DirectoryError::Unsupported(format!("cannot rename '{dn}'"))
        })?;
        let renamed = dn::child_dn(RdnKind::Ou, new_name, parent);
        let (new_rdn, _) = dn::split_rdn(&renamed);
        self.conn.modify_dn(dn, new_rdn, None).await?;
        info!(from = %dn, to = %renamed, "Directory entry renamed");
        Ok(renamed)
    }

    /// Whether `attr` already holds `value`. Any error counts as "differs".
    pub async fn compare_attribute(&self, dn: &str, attr: &str, value: &str) -> bool {
        match self.conn.compare(dn, attr, value).await {
            Ok(equal) => equal,
            Err(e) => {
                warn!(dn = %dn, attr, error = %e, "Compare failed; treating as different");
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_entry(&self, dn: &str) -> DirectoryResult<()> {
        self.conn.delete(dn).await?;
        info!(dn = %dn, "Directory entry deleted");
        Ok(())
    }

    /// Administrative reset; the old password is not required.
    #[instrument(skip(self, password))]
    pub async fn reset_password(&self, dn: &str, password: &str) -> DirectoryResult<()> {
        let encoded = encode_password(password)?;
        self.conn
            .modify_replace(dn, PASSWORD_ATTRIBUTE, vec![encoded])
            .await
    }

    /// Disable the account, then move it under the quarantine base.
    ///
    /// The move runs only if the disable succeeded. Returns the new DN.
    #[instrument(skip(self))]
    pub async fn deactivate_and_quarantine(&self, dn: &str) -> DirectoryResult<String> {
        let disabled = AccountControl::disabled().bits().to_string().into_bytes();
        self.conn
            .modify_replace(dn, ACCOUNT_CONTROL_ATTRIBUTE, vec![disabled])
            .await?;

        let quarantine = &self.config.quarantine_base_dn;
        let (rdn, _) = dn::split_rdn(dn);
        if let Err(e) = self.conn.modify_dn(dn, rdn, Some(quarantine.as_str())).await {
            warn!(dn = %dn, error = %e, "Account disabled but not moved to quarantine");
            return Err(e);
        }
        let new_dn = dn::reparent(dn, quarantine);
        info!(from = %dn, to = %new_dn, "Account quarantined");
        Ok(new_dn)
    }

    /// Bind as `account@domain` on a fresh connection to the primary server.
    #[instrument(skip(self, password))]
    pub async fn verify_credentials(
        &self,
        account_name: &str,
        password: &str,
    ) -> DirectoryResult<bool> {
        // An empty password would be an unauthenticated bind, which succeeds.
        if password.is_empty() {
            return Ok(false);
        }
        let principal = self.config.principal_for(account_name);
        self.conn.bind_check(&principal, password).await
    }
}

fn lookup<'a>(changes: &'a FieldChanges, attr: &str) -> Option<&'a str> {
    changes
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(attr))
        .map(|(_, v)| v)
}

fn incomplete(dn: &str, step: ProvisionStep, source: DirectoryError) -> DirectoryError {
    tracing::error!(
        dn = %dn,
        %step,
        error = %source,
        "Entry added but provisioning incomplete; no rollback performed"
    );
    DirectoryError::IncompleteProvisioning {
        dn: dn.to_string(),
        step,
        source: Box::new(source),
    }
}
