//! In-memory [`CacheStore`] for tests of dependent crates.
//!
//! Mirrors the unique constraints and upsert semantics of the Postgres
//! store. Writes (and optionally reads) can be made to fail on demand.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use galilee_core::dn;
use galilee_core::sync::{SyncPolicy, UpsertAction};
use galilee_core::types::DbId;
use uuid::Uuid;

use crate::models::directory_user::{DirectoryUser, NewDirectoryUser, UpdateDirectoryUser};
use crate::models::org_unit::{NewOrgUnit, OrgUnit, UpdateOrgUnit};
use crate::models::virtual_machine::{
    default_expiry, NewVirtualMachine, UpdateVirtualMachine, VirtualMachine, UNKNOWN_GUEST_OS,
};
use crate::store::{CacheStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    next_id: DbId,
    users: BTreeMap<DbId, DirectoryUser>,
    org_units: BTreeMap<DbId, OrgUnit>,
    vms: BTreeMap<DbId, VirtualMachine>,
}

impl Tables {
    fn allocate_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn user_mut(&mut self, account_name: &str) -> Option<&mut DirectoryUser> {
        self.users
            .values_mut()
            .find(|u| u.account_name == account_name)
    }

    fn vm_mut(&mut self, instance_uuid: Uuid) -> Option<&mut VirtualMachine> {
        self.vms
            .values_mut()
            .find(|v| v.instance_uuid == instance_uuid)
    }
}

#[derive(Default)]
pub struct MemoryCacheStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write return [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read return [`StoreError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn org_unit_count(&self) -> usize {
        self.lock().org_units.len()
    }

    pub fn vm_count(&self) -> usize {
        self.lock().vms.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panicking test thread must not wedge the remaining assertions.
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(self.lock())
    }

    fn write(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(self.lock())
    }
}

fn build_user(id: DbId, input: &NewDirectoryUser) -> DirectoryUser {
    let now = Utc::now();
    DirectoryUser {
        id,
        account_name: input.account_name.clone(),
        display_name: input.display_name.clone(),
        user_principal_name: input.user_principal_name.clone(),
        dn: input.dn.clone(),
        email: input.email.clone(),
        phone: input.phone.clone(),
        member_of: input.member_of.clone(),
        bad_password_count: input.bad_password_count,
        account_control: input.account_control,
        org_unit_id: input.org_unit_id,
        created_at: now,
        updated_at: now,
    }
}

fn build_vm(id: DbId, input: &NewVirtualMachine) -> VirtualMachine {
    let now = Utc::now();
    VirtualMachine {
        id,
        name: input.name.clone(),
        cpu_count: input.cpu_count,
        memory_mb: input.memory_mb,
        instance_uuid: input.instance_uuid,
        disk_gb: input.disk_gb,
        hostname: input.hostname.clone(),
        ip_address: input.ip_address.clone(),
        guest_os: input
            .guest_os
            .clone()
            .unwrap_or_else(|| UNKNOWN_GUEST_OS.to_string()),
        owner_id: input.owner_id,
        expiry_date: input
            .expiry_date
            .unwrap_or_else(|| default_expiry(now.date_naive())),
        created_at: now,
        updated_at: now,
    }
}

fn rebase(dn_value: &str, old_base: &str, new_base: &str) -> Option<String> {
    if !dn::is_descendant(dn_value, old_base) {
        return None;
    }
    let keep = dn_value.len() - old_base.trim().len();
    Some(format!("{}{}", &dn_value[..keep], new_base))
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.read().map(|_| ())
    }

    async fn find_user(&self, account_name: &str) -> StoreResult<Option<DirectoryUser>> {
        let tables = self.read()?;
        Ok(tables
            .users
            .values()
            .find(|u| u.account_name == account_name)
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<DirectoryUser>> {
        let tables = self.read()?;
        let mut users: Vec<_> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.account_name.cmp(&b.account_name));
        Ok(users)
    }

    async fn insert_user(&self, input: &NewDirectoryUser) -> StoreResult<DirectoryUser> {
        let mut tables = self.write()?;
        if tables.user_mut(&input.account_name).is_some() {
            return Err(StoreError::Conflict(
                "uq_directory_users_account_name".into(),
            ));
        }
        let id = tables.allocate_id();
        let user = build_user(id, input);
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        account_name: &str,
        input: &UpdateDirectoryUser,
    ) -> StoreResult<Option<DirectoryUser>> {
        let mut tables = self.write()?;
        let Some(user) = tables.user_mut(account_name) else {
            return Ok(None);
        };
        // An empty string clears the column.
        if let Some(email) = &input.email {
            user.email = Some(email.clone()).filter(|e| !e.is_empty());
        }
        if let Some(phone) = &input.phone {
            user.phone = Some(phone.clone()).filter(|p| !p.is_empty());
        }
        if let Some(account_control) = input.account_control {
            user.account_control = account_control;
        }
        if let Some(relocation) = &input.relocate {
            user.dn = relocation.dn.clone();
            user.org_unit_id = relocation.org_unit_id;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, account_name: &str) -> StoreResult<bool> {
        let mut tables = self.write()?;
        let before = tables.users.len();
        tables.users.retain(|_, u| u.account_name != account_name);
        Ok(tables.users.len() < before)
    }

    async fn upsert_user(
        &self,
        input: &NewDirectoryUser,
        policy: SyncPolicy,
    ) -> StoreResult<(DirectoryUser, UpsertAction)> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.user_mut(&input.account_name) {
            let refreshed = DirectoryUser {
                id: existing.id,
                created_at: existing.created_at,
                updated_at: existing.updated_at,
                ..build_user(existing.id, input)
            };
            if policy == SyncPolicy::InsertOnly || *existing == refreshed {
                return Ok((existing.clone(), UpsertAction::Unchanged));
            }
            *existing = DirectoryUser {
                updated_at: Utc::now(),
                ..refreshed
            };
            return Ok((existing.clone(), UpsertAction::Refreshed));
        }
        let id = tables.allocate_id();
        let user = build_user(id, input);
        tables.users.insert(id, user.clone());
        Ok((user, UpsertAction::Inserted))
    }

    async fn find_org_unit(&self, id: DbId) -> StoreResult<Option<OrgUnit>> {
        Ok(self.read()?.org_units.get(&id).cloned())
    }

    async fn find_org_unit_by_guid(&self, object_guid: Uuid) -> StoreResult<Option<OrgUnit>> {
        let tables = self.read()?;
        Ok(tables
            .org_units
            .values()
            .find(|o| o.object_guid == object_guid)
            .cloned())
    }

    async fn find_org_unit_by_dn(&self, dn_value: &str) -> StoreResult<Option<OrgUnit>> {
        let tables = self.read()?;
        Ok(tables
            .org_units
            .values()
            .find(|o| dn::dn_eq(&o.dn, dn_value))
            .cloned())
    }

    async fn list_org_units(&self) -> StoreResult<Vec<OrgUnit>> {
        let tables = self.read()?;
        let mut units: Vec<_> = tables.org_units.values().cloned().collect();
        units.sort_by(|a, b| a.dn.cmp(&b.dn));
        Ok(units)
    }

    async fn insert_org_unit(&self, input: &NewOrgUnit) -> StoreResult<OrgUnit> {
        let mut tables = self.write()?;
        if tables
            .org_units
            .values()
            .any(|o| o.object_guid == input.object_guid)
        {
            return Err(StoreError::Conflict("uq_org_units_object_guid".into()));
        }
        if tables.org_units.values().any(|o| o.dn == input.dn) {
            return Err(StoreError::Conflict("uq_org_units_dn".into()));
        }
        let id = tables.allocate_id();
        let now = Utc::now();
        let unit = OrgUnit {
            id,
            name: input.name.clone(),
            object_guid: input.object_guid,
            dn: input.dn.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.org_units.insert(id, unit.clone());
        Ok(unit)
    }

    async fn update_org_unit(
        &self,
        id: DbId,
        input: &UpdateOrgUnit,
    ) -> StoreResult<Option<OrgUnit>> {
        let mut tables = self.write()?;
        let Some(unit) = tables.org_units.get_mut(&id) else {
            return Ok(None);
        };
        let old_dn = unit.dn.clone();
        if let Some(name) = &input.name {
            unit.name = name.clone();
        }
        if let Some(new_dn) = &input.dn {
            unit.dn = new_dn.clone();
        }
        unit.updated_at = Utc::now();
        let updated = unit.clone();

        if updated.dn != old_dn {
            let now = Utc::now();
            for other in tables.org_units.values_mut() {
                if let Some(rebased) = rebase(&other.dn, &old_dn, &updated.dn) {
                    other.dn = rebased;
                    other.updated_at = now;
                }
            }
            for user in tables.users.values_mut() {
                if let Some(rebased) = rebase(&user.dn, &old_dn, &updated.dn) {
                    user.dn = rebased;
                    user.updated_at = now;
                }
            }
        }
        Ok(Some(updated))
    }

    async fn delete_org_unit(&self, id: DbId) -> StoreResult<bool> {
        let mut tables = self.write()?;
        if tables.org_units.remove(&id).is_none() {
            return Ok(false);
        }
        // ON DELETE SET NULL
        for user in tables.users.values_mut() {
            if user.org_unit_id == Some(id) {
                user.org_unit_id = None;
            }
        }
        Ok(true)
    }

    async fn upsert_org_unit(
        &self,
        input: &NewOrgUnit,
        policy: SyncPolicy,
    ) -> StoreResult<(OrgUnit, UpsertAction)> {
        {
            let mut tables = self.write()?;
            if let Some(existing) = tables
                .org_units
                .values_mut()
                .find(|o| o.object_guid == input.object_guid)
            {
                let unchanged = existing.name == input.name && existing.dn == input.dn;
                if policy == SyncPolicy::InsertOnly || unchanged {
                    return Ok((existing.clone(), UpsertAction::Unchanged));
                }
                existing.name = input.name.clone();
                existing.dn = input.dn.clone();
                existing.updated_at = Utc::now();
                return Ok((existing.clone(), UpsertAction::Refreshed));
            }
        }
        let unit = self.insert_org_unit(input).await?;
        Ok((unit, UpsertAction::Inserted))
    }

    async fn find_vm(&self, instance_uuid: Uuid) -> StoreResult<Option<VirtualMachine>> {
        let tables = self.read()?;
        Ok(tables
            .vms
            .values()
            .find(|v| v.instance_uuid == instance_uuid)
            .cloned())
    }

    async fn list_vms(&self) -> StoreResult<Vec<VirtualMachine>> {
        let tables = self.read()?;
        let mut vms: Vec<_> = tables.vms.values().cloned().collect();
        vms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(vms)
    }

    async fn insert_vm(&self, input: &NewVirtualMachine) -> StoreResult<VirtualMachine> {
        let mut tables = self.write()?;
        if tables.vm_mut(input.instance_uuid).is_some() {
            return Err(StoreError::Conflict(
                "uq_virtual_machines_instance_uuid".into(),
            ));
        }
        let id = tables.allocate_id();
        let vm = build_vm(id, input);
        tables.vms.insert(id, vm.clone());
        Ok(vm)
    }

    async fn update_vm(
        &self,
        instance_uuid: Uuid,
        input: &UpdateVirtualMachine,
    ) -> StoreResult<Option<VirtualMachine>> {
        let mut tables = self.write()?;
        let Some(vm) = tables.vm_mut(instance_uuid) else {
            return Ok(None);
        };
        if let Some(cpu_count) = input.cpu_count {
            vm.cpu_count = cpu_count;
        }
        if let Some(memory_mb) = input.memory_mb {
            vm.memory_mb = memory_mb;
        }
        if let Some(disk_gb) = input.disk_gb {
            vm.disk_gb = disk_gb;
        }
        if let Some(ip) = &input.ip_address {
            vm.ip_address = Some(ip.clone());
        }
        vm.updated_at = Utc::now();
        Ok(Some(vm.clone()))
    }

    async fn delete_vm(&self, instance_uuid: Uuid) -> StoreResult<bool> {
        let mut tables = self.write()?;
        let before = tables.vms.len();
        tables.vms.retain(|_, v| v.instance_uuid != instance_uuid);
        Ok(tables.vms.len() < before)
    }

    async fn upsert_vm(
        &self,
        input: &NewVirtualMachine,
        policy: SyncPolicy,
    ) -> StoreResult<(VirtualMachine, UpsertAction)> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.vm_mut(input.instance_uuid) {
            let incoming = build_vm(existing.id, input);
            let refreshed = VirtualMachine {
                owner_id: existing.owner_id,
                expiry_date: existing.expiry_date,
                created_at: existing.created_at,
                updated_at: existing.updated_at,
                ..incoming
            };
            if policy == SyncPolicy::InsertOnly || *existing == refreshed {
                return Ok((existing.clone(), UpsertAction::Unchanged));
            }
            *existing = VirtualMachine {
                updated_at: Utc::now(),
                ..refreshed
            };
            return Ok((existing.clone(), UpsertAction::Refreshed));
        }
        let id = tables.allocate_id();
        let vm = build_vm(id, input);
        tables.vms.insert(id, vm.clone());
        Ok((vm, UpsertAction::Inserted))
    }
}
