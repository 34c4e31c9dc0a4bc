//! Org-unit flows.

use galilee_core::dn::{self, RdnKind};
use galilee_core::error::CoreError;
use galilee_core::fields::{FieldChanges, FieldPolicy};
use galilee_core::outcome::OperationOutcome;
use galilee_core::types::DbId;
use galilee_db::models::org_unit::{NewOrgUnit, OrgUnit, UpdateOrgUnit};
use galilee_directory::entry::ORG_UNIT_ATTRIBUTES;
use galilee_directory::{EntryKind, OrgUnitAttributes};
use tracing::{info, instrument};
use validator::Validate;

use crate::error::{
    directory_failure, partial_failure, partial_missing_row, partial_readback, ReconcileResult,
};
use crate::requests::{describe, CreateOrgUnitRequest};
use crate::service::ReconciliationService;

pub const ORG_UNIT_FIELDS: FieldPolicy = FieldPolicy {
    allowed: &["name", "parentId"],
    immutable: &["objectGuid", "objectGUID", "dn"],
};

impl ReconciliationService {
    /// Create the OU under a cached parent (or the active base), read its
    /// GUID back from the directory, then mirror it.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_org_unit(&self, request: CreateOrgUnitRequest) -> ReconcileResult<OrgUnit> {
        if let Err(errors) = request.validate() {
            return Ok(OperationOutcome::validation(describe(&errors)));
        }
        let parent_dn = match request.parent_id {
            Some(parent_id) => match self.cache.find_org_unit(parent_id).await? {
                Some(parent) => parent.dn,
                None => return Ok(CoreError::not_found("Org unit", parent_id).into()),
            },
            None => self.directory.config().active_base_dn.clone(),
        };
        let ou_dn = dn::child_dn(RdnKind::Ou, request.name.trim(), &parent_dn);
        if self.cache.find_org_unit_by_dn(&ou_dn).await?.is_some() {
            return Ok(CoreError::Conflict(format!("Org unit '{ou_dn}' already exists")).into());
        }

        let attrs = vec![("ou".to_string(), vec![request.name.trim().to_string()])];
        if let Err(e) = self
            .directory
            .create_entry(&ou_dn, EntryKind::OrgUnit, &attrs, None)
            .await
        {
            return directory_failure(e);
        }

        let created = match self.directory.find_by_dn(&ou_dn, ORG_UNIT_ATTRIBUTES).await {
            Ok(entry) => entry.as_ref().and_then(OrgUnitAttributes::from_entry),
            Err(e) => {
                return Ok(partial_readback("Create org unit", &ou_dn, &e.to_string()));
            }
        };
        let Some(created) = created else {
            return Ok(partial_readback(
                "Create org unit",
                &ou_dn,
                "the new entry has no readable objectGUID",
            ));
        };

        let row = NewOrgUnit {
            name: created.name,
            object_guid: created.object_guid,
            dn: created.dn,
        };
        match self.cache.insert_org_unit(&row).await {
            Ok(org_unit) => {
                info!(dn = %org_unit.dn, guid = %org_unit.object_guid, "Org unit created");
                Ok(OperationOutcome::success(
                    format!("Org unit '{}' created", org_unit.name),
                    org_unit,
                ))
            }
            Err(e) => Ok(partial_failure("Create org unit", &ou_dn, &e)),
        }
    }

    /// Rename (`name`) and/or move (`parentId`) a cached OU. A blank
    /// `parentId` moves it to the active base.
    #[instrument(skip(self, changes))]
    pub async fn update_org_unit(&self, id: DbId, changes: &FieldChanges) -> ReconcileResult<OrgUnit> {
        if let Err(e) = ORG_UNIT_FIELDS.check(changes) {
            return Ok(e.into());
        }
        let Some(cached) = self.cache.find_org_unit(id).await? else {
            return Ok(CoreError::not_found("Org unit", id).into());
        };

        let mut directory_changes = FieldChanges::new();
        let mut final_name = cached.name.clone();
        if let Some(name) = changes.get("name") {
            let name = name.trim();
            if name.is_empty() {
                return Ok(OperationOutcome::validation("Org unit name cannot be empty"));
            }
            if name != cached.name {
                directory_changes = directory_changes.with("name", name);
                final_name = name.to_string();
            }
        }

        if let Some(raw) = changes.get("parentId") {
            let parent_dn = match raw.trim() {
                "" => self.directory.config().active_base_dn.clone(),
                raw => {
                    let Ok(parent_id) = raw.parse::<DbId>() else {
                        return Ok(OperationOutcome::validation(format!(
                            "parentId '{raw}' is not a valid id"
                        )));
                    };
                    let Some(parent) = self.cache.find_org_unit(parent_id).await? else {
                        return Ok(CoreError::not_found("Org unit", parent_id).into());
                    };
                    parent.dn
                }
            };
            if dn::dn_eq(&parent_dn, &cached.dn) || dn::is_descendant(&parent_dn, &cached.dn) {
                return Ok(OperationOutcome::validation(
                    "An org unit cannot be moved below itself",
                ));
            }
            let current_parent = dn::parent_of(&cached.dn).unwrap_or_default();
            if !dn::dn_eq(current_parent, &parent_dn) {
                directory_changes = directory_changes.with(
                    "distinguishedName",
                    dn::child_dn(RdnKind::Ou, &final_name, &parent_dn),
                );
            }
        }

        if directory_changes.is_empty() {
            return Ok(OperationOutcome::success("No changes", cached));
        }

        let final_dn = match self.directory.update_entry(&cached.dn, &directory_changes).await {
            Ok(dn) => dn,
            Err(e) => return directory_failure(e),
        };

        let update = UpdateOrgUnit {
            name: (final_name != cached.name).then_some(final_name),
            dn: Some(final_dn),
        };
        match self.cache.update_org_unit(id, &update).await {
            Ok(Some(org_unit)) => {
                info!(id, dn = %org_unit.dn, "Org unit updated");
                Ok(OperationOutcome::success(
                    format!("Org unit '{}' updated", org_unit.name),
                    org_unit,
                ))
            }
            Ok(None) => Ok(partial_missing_row("Update org unit", &cached.dn)),
            Err(e) => Ok(partial_failure("Update org unit", &cached.dn, &e)),
        }
    }

    /// Delete a cached OU, located in the directory by its GUID.
    #[instrument(skip(self))]
    pub async fn delete_org_unit(&self, id: DbId) -> ReconcileResult<OrgUnit> {
        let Some(cached) = self.cache.find_org_unit(id).await? else {
            return Ok(CoreError::not_found("Org unit", id).into());
        };
        let entry = match self.directory.find_org_unit(cached.object_guid).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                return Ok(OperationOutcome::not_found(format!(
                    "Org unit {} is cached but no longer in the directory",
                    cached.object_guid
                )))
            }
            Err(e) => return directory_failure(e),
        };

        if let Err(e) = self.directory.delete_entry(&entry.dn).await {
            return directory_failure(e);
        }
        match self.cache.delete_org_unit(id).await {
            Ok(_) => {
                info!(id, dn = %entry.dn, "Org unit deleted");
                Ok(OperationOutcome::success(
                    format!("Org unit '{}' deleted", cached.name),
                    cached,
                ))
            }
            Err(e) => Ok(partial_failure("Delete org unit", &entry.dn, &e)),
        }
    }

    pub async fn list_org_units(&self) -> ReconcileResult<Vec<OrgUnit>> {
        let org_units = self.cache.list_org_units().await?;
        Ok(OperationOutcome::success(
            format!("{} cached org units", org_units.len()),
            org_units,
        ))
    }
}
