//! Pull-sync: copy one entity from its system of record into the cache.
//!
//! Rows are keyed by account name, object GUID or instance UUID and
//! upserted under the configured [`SyncPolicy`](galilee_core::sync::SyncPolicy).
//! Nothing external is mutated here, so a failed cache write is an error
//! rather than a partial failure.

use galilee_core::dn;
use galilee_core::error::CoreError;
use galilee_core::outcome::OperationOutcome;
use galilee_db::models::directory_user::{DirectoryUser, NewDirectoryUser};
use galilee_db::models::org_unit::{NewOrgUnit, OrgUnit};
use galilee_db::models::virtual_machine::VirtualMachine;
use galilee_directory::{OrgUnitAttributes, UserAttributes};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{directory_failure, hypervisor_failure, ReconcileResult};
use crate::service::{ReconciliationService, Synced};
use crate::vms::new_vm_row;

impl ReconciliationService {
    #[instrument(skip(self))]
    pub async fn sync_user_from_directory(
        &self,
        account_name: &str,
    ) -> ReconcileResult<Synced<DirectoryUser>> {
        let entry = match self.directory.find_user(account_name).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(CoreError::not_found("Directory user", account_name).into()),
            Err(e) => return directory_failure(e),
        };
        let Some(user) = UserAttributes::from_entry(&entry) else {
            return Ok(CoreError::not_found("Directory user", account_name).into());
        };

        let org_unit_id = match dn::parent_of(&user.dn) {
            Some(parent) => self.cache.find_org_unit_by_dn(parent).await?.map(|ou| ou.id),
            None => None,
        };
        let row = NewDirectoryUser {
            account_name: user.account_name,
            display_name: user.display_name,
            user_principal_name: user.user_principal_name,
            dn: user.dn,
            email: user.email,
            phone: user.phone,
            member_of: user.member_of,
            bad_password_count: user.bad_password_count,
            account_control: user.account_control.bits() as i32,
            org_unit_id,
        };
        let (record, action) = self.cache.upsert_user(&row, self.config.sync_policy).await?;
        debug!(account = account_name, ?action, "User synced");
        Ok(OperationOutcome::success(
            format!("User '{account_name}' synced"),
            Synced { record, action },
        ))
    }

    #[instrument(skip(self))]
    pub async fn sync_org_unit_from_directory(
        &self,
        object_guid: Uuid,
    ) -> ReconcileResult<Synced<OrgUnit>> {
        let entry = match self.directory.find_org_unit(object_guid).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(CoreError::not_found("Directory org unit", object_guid).into()),
            Err(e) => return directory_failure(e),
        };
        let Some(org_unit) = OrgUnitAttributes::from_entry(&entry) else {
            return Ok(CoreError::not_found("Directory org unit", object_guid).into());
        };

        let row = NewOrgUnit {
            name: org_unit.name,
            object_guid: org_unit.object_guid,
            dn: org_unit.dn,
        };
        let (record, action) = self
            .cache
            .upsert_org_unit(&row, self.config.sync_policy)
            .await?;
        debug!(%object_guid, ?action, "Org unit synced");
        Ok(OperationOutcome::success(
            format!("Org unit '{}' synced", record.name),
            Synced { record, action },
        ))
    }

    #[instrument(skip(self))]
    pub async fn sync_vm_from_hypervisor(
        &self,
        instance_uuid: Uuid,
    ) -> ReconcileResult<Synced<VirtualMachine>> {
        let vm = match self.hypervisor.vm_snapshot(instance_uuid).await {
            Ok(vm) => vm,
            Err(e) => return hypervisor_failure(e),
        };
        let (record, action) = self
            .cache
            .upsert_vm(&new_vm_row(&vm), self.config.sync_policy)
            .await?;
        debug!(%instance_uuid, ?action, "VM synced");
        Ok(OperationOutcome::success(
            format!("VM '{}' synced", record.name),
            Synced { record, action },
        ))
    }
}
