//! The `CacheStore` seam used by the reconciliation service.
//!
//! Each method is one logical cache write or read: it either applies in
//! full or not at all. [`PgCacheStore`] is the production implementation;
//! `MemoryCacheStore` (feature `testing`) backs tests of dependent crates.

use async_trait::async_trait;
use galilee_core::sync::{SyncPolicy, UpsertAction};
use galilee_core::types::DbId;
use uuid::Uuid;

use crate::models::directory_user::{DirectoryUser, NewDirectoryUser, UpdateDirectoryUser};
use crate::models::org_unit::{NewOrgUnit, OrgUnit, UpdateOrgUnit};
use crate::models::virtual_machine::{NewVirtualMachine, UpdateVirtualMachine, VirtualMachine};
use crate::repositories::{DirectoryUserRepo, OrgUnitRepo, VirtualMachineRepo};
use crate::DbPool;

/// Cache failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint (`uq_*`) rejected the write.
    #[error("Duplicate value violates unique constraint: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// The store refused the operation without reaching the database.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return StoreError::Conflict(constraint.to_string());
                }
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Local persisted mirror of directory and hypervisor entities.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Confirm the store is reachable.
    async fn health_check(&self) -> StoreResult<()>;

    // --- Directory users (keyed by account name) ---
    async fn find_user(&self, account_name: &str) -> StoreResult<Option<DirectoryUser>>;
    async fn list_users(&self) -> StoreResult<Vec<DirectoryUser>>;
    async fn insert_user(&self, input: &NewDirectoryUser) -> StoreResult<DirectoryUser>;
    async fn update_user(
        &self,
        account_name: &str,
        input: &UpdateDirectoryUser,
    ) -> StoreResult<Option<DirectoryUser>>;
    async fn delete_user(&self, account_name: &str) -> StoreResult<bool>;
    async fn upsert_user(
        &self,
        input: &NewDirectoryUser,
        policy: SyncPolicy,
    ) -> StoreResult<(DirectoryUser, UpsertAction)>;

    // --- Org units (keyed by object GUID) ---
    async fn find_org_unit(&self, id: DbId) -> StoreResult<Option<OrgUnit>>;
    async fn find_org_unit_by_guid(&self, object_guid: Uuid) -> StoreResult<Option<OrgUnit>>;
    async fn find_org_unit_by_dn(&self, dn: &str) -> StoreResult<Option<OrgUnit>>;
    async fn list_org_units(&self) -> StoreResult<Vec<OrgUnit>>;
    async fn insert_org_unit(&self, input: &NewOrgUnit) -> StoreResult<OrgUnit>;
    /// Rename/move; cached descendants follow the new DN.
    async fn update_org_unit(
        &self,
        id: DbId,
        input: &UpdateOrgUnit,
    ) -> StoreResult<Option<OrgUnit>>;
    async fn delete_org_unit(&self, id: DbId) -> StoreResult<bool>;
    async fn upsert_org_unit(
        &self,
        input: &NewOrgUnit,
        policy: SyncPolicy,
    ) -> StoreResult<(OrgUnit, UpsertAction)>;

    // --- Virtual machines (keyed by instance UUID) ---
    async fn find_vm(&self, instance_uuid: Uuid) -> StoreResult<Option<VirtualMachine>>;
    async fn list_vms(&self) -> StoreResult<Vec<VirtualMachine>>;
    async fn insert_vm(&self, input: &NewVirtualMachine) -> StoreResult<VirtualMachine>;
    async fn update_vm(
        &self,
        instance_uuid: Uuid,
        input: &UpdateVirtualMachine,
    ) -> StoreResult<Option<VirtualMachine>>;
    async fn delete_vm(&self, instance_uuid: Uuid) -> StoreResult<bool>;
    async fn upsert_vm(
        &self,
        input: &NewVirtualMachine,
        policy: SyncPolicy,
    ) -> StoreResult<(VirtualMachine, UpsertAction)>;
}

/// Postgres-backed [`CacheStore`].
#[derive(Clone)]
pub struct PgCacheStore {
    pool: DbPool,
}

impl PgCacheStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(crate::health_check(&self.pool).await?)
    }

    async fn find_user(&self, account_name: &str) -> StoreResult<Option<DirectoryUser>> {
        Ok(DirectoryUserRepo::find_by_account(&self.pool, account_name).await?)
    }

    async fn list_users(&self) -> StoreResult<Vec<DirectoryUser>> {
        Ok(DirectoryUserRepo::list(&self.pool).await?)
    }

    async fn insert_user(&self, input: &NewDirectoryUser) -> StoreResult<DirectoryUser> {
        Ok(DirectoryUserRepo::create(&self.pool, input).await?)
    }

    async fn update_user(
        &self,
        account_name: &str,
        input: &UpdateDirectoryUser,
    ) -> StoreResult<Option<DirectoryUser>> {
        Ok(DirectoryUserRepo::update(&self.pool, account_name, input).await?)
    }

    async fn delete_user(&self, account_name: &str) -> StoreResult<bool> {
        Ok(DirectoryUserRepo::delete(&self.pool, account_name).await?)
    }

    async fn upsert_user(
        &self,
        input: &NewDirectoryUser,
        policy: SyncPolicy,
    ) -> StoreResult<(DirectoryUser, UpsertAction)> {
        Ok(DirectoryUserRepo::upsert(&self.pool, input, policy).await?)
    }

    async fn find_org_unit(&self, id: DbId) -> StoreResult<Option<OrgUnit>> {
        Ok(OrgUnitRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_org_unit_by_guid(&self, object_guid: Uuid) -> StoreResult<Option<OrgUnit>> {
        Ok(OrgUnitRepo::find_by_guid(&self.pool, object_guid).await?)
    }

    async fn find_org_unit_by_dn(&self, dn: &str) -> StoreResult<Option<OrgUnit>> {
        Ok(OrgUnitRepo::find_by_dn(&self.pool, dn).await?)
    }

    async fn list_org_units(&self) -> StoreResult<Vec<OrgUnit>> {
        Ok(OrgUnitRepo::list(&self.pool).await?)
    }

    async fn insert_org_unit(&self, input: &NewOrgUnit) -> StoreResult<OrgUnit> {
        Ok(OrgUnitRepo::create(&self.pool, input).await?)
    }

    async fn update_org_unit(
        &self,
        id: DbId,
        input: &UpdateOrgUnit,
    ) -> StoreResult<Option<OrgUnit>> {
        let mut tx = self.pool.begin().await?;
        let updated = OrgUnitRepo::update(&mut tx, id, input).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_org_unit(&self, id: DbId) -> StoreResult<bool> {
        Ok(OrgUnitRepo::delete(&self.pool, id).await?)
    }

    async fn upsert_org_unit(
        &self,
        input: &NewOrgUnit,
        policy: SyncPolicy,
    ) -> StoreResult<(OrgUnit, UpsertAction)> {
        Ok(OrgUnitRepo::upsert(&self.pool, input, policy).await?)
    }

    async fn find_vm(&self, instance_uuid: Uuid) -> StoreResult<Option<VirtualMachine>> {
        Ok(VirtualMachineRepo::find_by_uuid(&self.pool, instance_uuid).await?)
    }

    async fn list_vms(&self) -> StoreResult<Vec<VirtualMachine>> {
        Ok(VirtualMachineRepo::list(&self.pool).await?)
    }

    async fn insert_vm(&self, input: &NewVirtualMachine) -> StoreResult<VirtualMachine> {
        Ok(VirtualMachineRepo::create(&self.pool, input).await?)
    }

    async fn update_vm(
        &self,
        instance_uuid: Uuid,
        input: &UpdateVirtualMachine,
    ) -> StoreResult<Option<VirtualMachine>> {
        Ok(VirtualMachineRepo::update(&self.pool, instance_uuid, input).await?)
    }

    async fn delete_vm(&self, instance_uuid: Uuid) -> StoreResult<bool> {
        Ok(VirtualMachineRepo::delete(&self.pool, instance_uuid).await?)
    }

    async fn upsert_vm(
        &self,
        input: &NewVirtualMachine,
        policy: SyncPolicy,
    ) -> StoreResult<(VirtualMachine, UpsertAction)> {
        Ok(VirtualMachineRepo::upsert(&self.pool, input, policy).await?)
    }
}
