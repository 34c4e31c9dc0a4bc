//! User flows: provisioning, attribute changes, off-boarding, credentials.

use galilee_core::account_control::AccountControl;
use galilee_core::dn::{self, RdnKind};
use galilee_core::error::CoreError;
use galilee_core::fields::{FieldChanges, FieldPolicy};
use galilee_core::outcome::{FailureKind, OperationOutcome};
use galilee_core::types::DbId;
use galilee_db::models::directory_user::{
    DirectoryUser, NewDirectoryUser, Relocation, UpdateDirectoryUser,
};
use galilee_directory::entry::{USER_ATTRIBUTES, USER_FILTER};
use galilee_directory::{filter, EntryKind, SearchScope, UserAttributes};
use tracing::{info, instrument};
use validator::Validate;

use crate::error::{
    directory_failure, partial_failure, partial_missing_row, ReconcileError, ReconcileResult,
};
use crate::requests::{describe, ContactUpdate, CreateUserRequest, PasswordRequest};
use crate::service::{LoginResult, ReconciliationService, UserRef};

/// Fields a caller may change on an existing account.
pub const USER_FIELDS: FieldPolicy = FieldPolicy {
    allowed: &["email", "phone", "orgUnitId"],
    immutable: &[
        "accountName",
        "displayName",
        "userPrincipalName",
        "sAMAccountName",
        "name",
        "dn",
    ],
};

impl ReconciliationService {
    /// Provision an account in the directory, then mirror it.
    #[instrument(skip(self, request), fields(account = %request.account_name))]
    pub async fn create_user(&self, request: CreateUserRequest) -> ReconcileResult<DirectoryUser> {
        if let Err(errors) = request.validate() {
            return Ok(OperationOutcome::validation(describe(&errors)));
        }
        let account = request.account_name.as_str();

        let Some(org_unit) = self.cache.find_org_unit(request.org_unit_id).await? else {
            return Ok(CoreError::not_found("Org unit", request.org_unit_id).into());
        };
        if self.cache.find_user(account).await?.is_some() {
            return Ok(CoreError::Conflict(format!("Account '{account}' already exists")).into());
        }
        match self.directory.find_user(account).await {
            Ok(Some(existing)) => {
                return Ok(OperationOutcome::external_failure(
                    FailureKind::AlreadyExists,
                    format!("Account '{account}' already exists at {}", existing.dn),
                ))
            }
            Ok(None) => {}
            Err(e) => return directory_failure(e),
        }

        let user_dn = dn::child_dn(RdnKind::Cn, &request.display_name, &org_unit.dn);
        let suffix = self
            .config
            .upn_suffix
            .as_deref()
            .unwrap_or(&self.directory.config().domain);
        let upn = format!("{account}@{suffix}");
        let email = non_empty(request.email.as_deref());
        let phone = non_empty(request.phone.as_deref());

        let mut attrs = vec![
            single("sAMAccountName", account),
            single("userPrincipalName", &upn),
            single("displayName", &request.display_name),
        ];
        if let Some(email) = &email {
            attrs.push(single("mail", email));
        }
        if let Some(phone) = &phone {
            attrs.push(single("telephoneNumber", phone));
        }

        if let Err(e) = self
            .directory
            .create_entry(&user_dn, EntryKind::User, &attrs, Some(&request.password))
            .await
        {
            return directory_failure(e);
        }

        let row = NewDirectoryUser {
            account_name: account.to_string(),
            display_name: request.display_name.clone(),
            user_principal_name: upn,
            dn: user_dn,
            email,
            phone,
            member_of: Vec::new(),
            bad_password_count: 0,
            account_control: AccountControl::enabled().bits() as i32,
            org_unit_id: Some(org_unit.id),
        };
        match self.cache.insert_user(&row).await {
            Ok(user) => {
                info!(account, dn = %user.dn, "User created");
                Ok(OperationOutcome::success(
                    format!("User '{account}' created"),
                    user,
                ))
            }
            Err(e) => Ok(partial_failure("Create user", account, &e)),
        }
    }

    /// Apply the changed subset of `changes` to the directory, then to the
    /// cached row.
    ///
    /// `orgUnitId` moves the account under the cached org unit with that
    /// id. An empty `email` or `phone` clears the attribute.
    #[instrument(skip(self, changes))]
    pub async fn update_user(
        &self,
        account_name: &str,
        changes: &FieldChanges,
    ) -> ReconcileResult<DirectoryUser> {
        if let Err(e) = USER_FIELDS.check(changes) {
            return Ok(e.into());
        }
        let contact = ContactUpdate {
            email: non_empty(changes.get("email")),
            phone: non_empty(changes.get("phone")),
        };
        if let Err(errors) = contact.validate() {
            return Ok(OperationOutcome::validation(describe(&errors)));
        }

        let Some(cached) = self.cache.find_user(account_name).await? else {
            return Ok(CoreError::not_found("User", account_name).into());
        };

        let mut directory_changes = FieldChanges::new();
        let mut cache_changes = UpdateDirectoryUser::default();

        if let Some(email) = changes.get("email") {
            if cached.email.as_deref().unwrap_or_default() != email {
                directory_changes = directory_changes.with("mail", email);
                cache_changes.email = Some(email.to_string());
            }
        }
        if let Some(phone) = changes.get("phone") {
            if cached.phone.as_deref().unwrap_or_default() != phone {
                directory_changes = directory_changes.with("telephoneNumber", phone);
                cache_changes.phone = Some(phone.to_string());
            }
        }

        let mut target_org_unit = None;
        if let Some(raw) = changes.get("orgUnitId") {
            let Ok(id) = raw.trim().parse::<DbId>() else {
                return Ok(OperationOutcome::validation(format!(
                    "orgUnitId '{raw}' is not a valid id"
                )));
            };
            let Some(org_unit) = self.cache.find_org_unit(id).await? else {
                return Ok(CoreError::not_found("Org unit", id).into());
            };
            let in_place = dn::parent_of(&cached.dn).is_some_and(|p| dn::dn_eq(p, &org_unit.dn));
            if !in_place {
                directory_changes = directory_changes
                    .with("distinguishedName", dn::reparent(&cached.dn, &org_unit.dn));
            }
            target_org_unit = Some(org_unit);
        }

        if directory_changes.is_empty() && cache_changes.is_empty() && target_org_unit.is_none() {
            return Ok(OperationOutcome::success("No changes", cached));
        }

        let final_dn = if directory_changes.is_empty() {
            cached.dn.clone()
        } else {
            match self.directory.update_entry(&cached.dn, &directory_changes).await {
                Ok(dn) => dn,
                Err(e) => return directory_failure(e),
            }
        };

        if let Some(org_unit) = &target_org_unit {
            if cached.org_unit_id != Some(org_unit.id) || !dn::dn_eq(&cached.dn, &final_dn) {
                cache_changes.relocate = Some(Relocation {
                    dn: final_dn,
                    org_unit_id: Some(org_unit.id),
                });
            }
        }
        if cache_changes.is_empty() {
            return Ok(OperationOutcome::success("No changes", cached));
        }

        match self.cache.update_user(account_name, &cache_changes).await {
            Ok(Some(user)) => {
                info!(account = account_name, "User updated");
                Ok(OperationOutcome::success(
                    format!("User '{account_name}' updated"),
                    user,
                ))
            }
            Ok(None) => Ok(partial_missing_row("Update user", account_name)),
            Err(e) => Ok(partial_failure("Update user", account_name, &e)),
        }
    }

    /// Disable the account and move it to quarantine, then drop the
    /// cached row.
    #[instrument(skip(self))]
    pub async fn offboard_user(&self, account_name: &str) -> ReconcileResult<UserRef> {
        let (current_dn, cached) = match self.locate_user(account_name).await? {
            Located::Found { dn, cached } => (dn, cached),
            Located::Missing(outcome) => return Ok(outcome),
        };

        let quarantined = match self.directory.deactivate_and_quarantine(&current_dn).await {
            Ok(dn) => dn,
            Err(e) => return directory_failure(e),
        };

        if cached {
            if let Err(e) = self.cache.delete_user(account_name).await {
                return Ok(partial_failure("Offboard user", account_name, &e));
            }
        }
        info!(account = account_name, dn = %quarantined, "User off-boarded");
        Ok(OperationOutcome::success(
            format!("User '{account_name}' disabled and moved to quarantine"),
            UserRef {
                account_name: account_name.to_string(),
                dn: quarantined,
            },
        ))
    }

    /// Delete the account outright, then drop the cached row.
    #[instrument(skip(self))]
    pub async fn purge_user(&self, account_name: &str) -> ReconcileResult<UserRef> {
        let (current_dn, cached) = match self.locate_user(account_name).await? {
            Located::Found { dn, cached } => (dn, cached),
            Located::Missing(outcome) => return Ok(outcome),
        };

        if let Err(e) = self.directory.delete_entry(&current_dn).await {
            return directory_failure(e);
        }
        if cached {
            if let Err(e) = self.cache.delete_user(account_name).await {
                return Ok(partial_failure("Purge user", account_name, &e));
            }
        }
        Ok(OperationOutcome::success(
            format!("User '{account_name}' deleted"),
            UserRef {
                account_name: account_name.to_string(),
                dn: current_dn,
            },
        ))
    }

    /// Administrative password reset. Nothing is cached for passwords.
    #[instrument(skip(self, request))]
    pub async fn reset_password(
        &self,
        account_name: &str,
        request: PasswordRequest,
    ) -> ReconcileResult<UserRef> {
        if let Err(errors) = request.validate() {
            return Ok(OperationOutcome::validation(describe(&errors)));
        }
        let current_dn = match self.locate_user(account_name).await? {
            Located::Found { dn, .. } => dn,
            Located::Missing(outcome) => return Ok(outcome),
        };
        if let Err(e) = self
            .directory
            .reset_password(&current_dn, &request.password)
            .await
        {
            return directory_failure(e);
        }
        info!(account = account_name, "Password reset");
        Ok(OperationOutcome::success(
            format!("Password of '{account_name}' reset"),
            UserRef {
                account_name: account_name.to_string(),
                dn: current_dn,
            },
        ))
    }

    /// Check a password against the directory.
    #[instrument(skip(self, password))]
    pub async fn verify_login(&self, account_name: &str, password: &str) -> ReconcileResult<LoginResult> {
        match self.directory.verify_credentials(account_name, password).await {
            Ok(authenticated) => {
                let message = if authenticated {
                    "Authenticated"
                } else {
                    "Invalid credentials"
                };
                Ok(OperationOutcome::success(message, LoginResult { authenticated }))
            }
            Err(e) => directory_failure(e),
        }
    }

    /// Users in `scope` whose account name or mail equals `query`; every
    /// user in scope when `query` is blank.
    #[instrument(skip(self))]
    pub async fn search_directory(
        &self,
        scope: SearchScope,
        query: &str,
    ) -> ReconcileResult<Vec<UserAttributes>> {
        let query = query.trim();
        let result = if query.is_empty() {
            self.directory.list_users(scope).await
        } else {
            let matching = filter::or(&[
                filter::eq("sAMAccountName", query).as_str(),
                filter::eq("mail", query).as_str(),
            ]);
            let user_filter = filter::and(&[USER_FILTER, matching.as_str()]);
            self.directory
                .search(scope, &user_filter, USER_ATTRIBUTES)
                .await
                .map(|entries| entries.iter().filter_map(UserAttributes::from_entry).collect())
        };
        match result {
            Ok(users) => Ok(OperationOutcome::success(
                format!("{} users found", users.len()),
                users,
            )),
            Err(e) => directory_failure(e),
        }
    }

    pub async fn list_users(&self) -> ReconcileResult<Vec<DirectoryUser>> {
        let users = self.cache.list_users().await?;
        Ok(OperationOutcome::success(
            format!("{} cached users", users.len()),
            users,
        ))
    }

    /// Current DN of an account: the cached row first, the directory
    /// otherwise.
    async fn locate_user(&self, account_name: &str) -> Result<Located, ReconcileError> {
        if let Some(user) = self.cache.find_user(account_name).await? {
            return Ok(Located::Found {
                dn: user.dn,
                cached: true,
            });
        }
        match self.directory.find_user(account_name).await {
            Ok(Some(entry)) => Ok(Located::Found {
                dn: entry.dn,
                cached: false,
            }),
            Ok(None) => Ok(Located::Missing(
                CoreError::not_found("User", account_name).into(),
            )),
            Err(e) => directory_failure(e).map(Located::Missing),
        }
    }
}

enum Located {
    Found { dn: String, cached: bool },
    Missing(OperationOutcome<UserRef>),
}

fn single(attr: &str, value: &str) -> (String, Vec<String>) {
    (attr.to_string(), vec![value.to_string()])
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
