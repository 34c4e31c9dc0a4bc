//! Repository for the `virtual_machines` table.

use galilee_core::sync::{SyncPolicy, UpsertAction};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::virtual_machine::{
    NewVirtualMachine, UpdateVirtualMachine, VirtualMachine, UNKNOWN_GUEST_OS,
};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, cpu_count, memory_mb, instance_uuid, disk_gb, hostname, \
                       ip_address, guest_os, owner_id, expiry_date, created_at, updated_at";

#[derive(FromRow)]
struct UpsertedVm {
    #[sqlx(flatten)]
    vm: VirtualMachine,
    inserted: bool,
}

/// Provides CRUD and pull-sync operations for cached virtual machines.
pub struct VirtualMachineRepo;

impl VirtualMachineRepo {
    /// Insert a new VM record, returning the created row.
    ///
    /// `guest_os` defaults to `"unknown"` and `expiry_date` to 52 weeks out.
    pub async fn create(
        pool: &PgPool,
        input: &NewVirtualMachine,
    ) -> Result<VirtualMachine, sqlx::Error> {
        let query = format!(
            "INSERT INTO virtual_machines
                (name, cpu_count, memory_mb, instance_uuid, disk_gb, hostname, ip_address,
                 guest_os, owner_id, expiry_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, $11), $9,
                     COALESCE($10, (CURRENT_DATE + INTERVAL '52 weeks')::date))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VirtualMachine>(&query)
            .bind(&input.name)
            .bind(input.cpu_count)
            .bind(input.memory_mb)
            .bind(input.instance_uuid)
            .bind(input.disk_gb)
            .bind(&input.hostname)
            .bind(&input.ip_address)
            .bind(&input.guest_os)
            .bind(input.owner_id)
            .bind(input.expiry_date)
            .bind(UNKNOWN_GUEST_OS)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_uuid(
        pool: &PgPool,
        instance_uuid: Uuid,
    ) -> Result<Option<VirtualMachine>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM virtual_machines WHERE instance_uuid = $1");
        sqlx::query_as::<_, VirtualMachine>(&query)
            .bind(instance_uuid)
            .fetch_optional(pool)
            .await
    }

    /// List all VM records ordered by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<VirtualMachine>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM virtual_machines ORDER BY name, id");
        sqlx::query_as::<_, VirtualMachine>(&query)
            .fetch_all(pool)
            .await
    }

    /// Update hypervisor-derived columns. Only non-`None` fields are applied.
    pub async fn update(
        pool: &PgPool,
        instance_uuid: Uuid,
        input: &UpdateVirtualMachine,
    ) -> Result<Option<VirtualMachine>, sqlx::Error> {
        let query = format!(
            "UPDATE virtual_machines SET
                cpu_count = COALESCE($2, cpu_count),
                memory_mb = COALESCE($3, memory_mb),
                disk_gb = COALESCE($4, disk_gb),
                ip_address = COALESCE($5, ip_address),
                updated_at = NOW()
             WHERE instance_uuid = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VirtualMachine>(&query)
            .bind(instance_uuid)
            .bind(input.cpu_count)
            .bind(input.memory_mb)
            .bind(input.disk_gb)
            .bind(&input.ip_address)
            .fetch_optional(pool)
            .await
    }

    /// Permanently delete a VM record. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, instance_uuid: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM virtual_machines WHERE instance_uuid = $1")
            .bind(instance_uuid)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Pull-sync upsert keyed by `instance_uuid`.
    ///
    /// `Overwrite` refreshes hypervisor-derived columns only; `owner_id` and
    /// `expiry_date` are never touched on conflict.
    pub async fn upsert(
        pool: &PgPool,
        input: &NewVirtualMachine,
        policy: SyncPolicy,
    ) -> Result<(VirtualMachine, UpsertAction), sqlx::Error> {
        let on_conflict = match policy {
            SyncPolicy::InsertOnly => "DO NOTHING",
            SyncPolicy::Overwrite => {
                "DO UPDATE SET
                    name = EXCLUDED.name,
                    cpu_count = EXCLUDED.cpu_count,
                    memory_mb = EXCLUDED.memory_mb,
                    disk_gb = EXCLUDED.disk_gb,
                    hostname = EXCLUDED.hostname,
                    ip_address = EXCLUDED.ip_address,
                    guest_os = EXCLUDED.guest_os,
                    updated_at = NOW()
                 WHERE (virtual_machines.name, virtual_machines.cpu_count,
                        virtual_machines.memory_mb, virtual_machines.disk_gb,
                        virtual_machines.hostname, virtual_machines.ip_address,
                        virtual_machines.guest_os)
                   IS DISTINCT FROM
                       (EXCLUDED.name, EXCLUDED.cpu_count, EXCLUDED.memory_mb,
                        EXCLUDED.disk_gb, EXCLUDED.hostname, EXCLUDED.ip_address,
                        EXCLUDED.guest_os)"
            }
        };
        let query = format!(
            "INSERT INTO virtual_machines
                (name, cpu_count, memory_mb, instance_uuid, disk_gb, hostname, ip_address,
                 guest_os, owner_id, expiry_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, COALESCE($8, $11), $9,
                     COALESCE($10, (CURRENT_DATE + INTERVAL '52 weeks')::date))
             ON CONFLICT (instance_uuid) {on_conflict}
             RETURNING {COLUMNS}, (xmax = 0) AS inserted"
        );
        let upserted = sqlx::query_as::<_, UpsertedVm>(&query)
            .bind(&input.name)
            .bind(input.cpu_count)
            .bind(input.memory_mb)
            .bind(input.instance_uuid)
            .bind(input.disk_gb)
            .bind(&input.hostname)
            .bind(&input.ip_address)
            .bind(&input.guest_os)
            .bind(input.owner_id)
            .bind(input.expiry_date)
            .bind(UNKNOWN_GUEST_OS)
            .fetch_optional(pool)
            .await?;

        match upserted {
            Some(row) if row.inserted => Ok((row.vm, UpsertAction::Inserted)),
            Some(row) => Ok((row.vm, UpsertAction::Refreshed)),
            None => {
                let existing = Self::find_by_uuid(pool, input.instance_uuid)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok((existing, UpsertAction::Unchanged))
            }
        }
    }
}
