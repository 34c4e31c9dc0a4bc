//! Repository for the `org_units` table.

use galilee_core::sync::{SyncPolicy, UpsertAction};
use galilee_core::types::DbId;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::models::org_unit::{NewOrgUnit, OrgUnit, UpdateOrgUnit};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, name, object_guid, dn, created_at, updated_at";

#[derive(FromRow)]
struct UpsertedOrgUnit {
    #[sqlx(flatten)]
    org_unit: OrgUnit,
    inserted: bool,
}

/// Provides CRUD and pull-sync operations for cached org units.
pub struct OrgUnitRepo;

impl OrgUnitRepo {
    /// Insert a new org unit, returning the created row.
    pub async fn create(pool: &PgPool, input: &NewOrgUnit) -> Result<OrgUnit, sqlx::Error> {
        let query = format!(
            "INSERT INTO org_units (name, object_guid, dn)
             VALUES ($1, $2, $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OrgUnit>(&query)
            .bind(&input.name)
            .bind(input.object_guid)
            .bind(&input.dn)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<OrgUnit>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM org_units WHERE id = $1");
        sqlx::query_as::<_, OrgUnit>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_guid(
        pool: &PgPool,
        object_guid: Uuid,
    ) -> Result<Option<OrgUnit>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM org_units WHERE object_guid = $1");
        sqlx::query_as::<_, OrgUnit>(&query)
            .bind(object_guid)
            .fetch_optional(pool)
            .await
    }

    /// Case-insensitive DN lookup.
    pub async fn find_by_dn(pool: &PgPool, dn: &str) -> Result<Option<OrgUnit>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM org_units WHERE lower(dn) = lower($1)");
        sqlx::query_as::<_, OrgUnit>(&query)
            .bind(dn)
            .fetch_optional(pool)
            .await
    }

    /// List all org units ordered by DN.
    pub async fn list(pool: &PgPool) -> Result<Vec<OrgUnit>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM org_units ORDER BY dn");
        sqlx::query_as::<_, OrgUnit>(&query).fetch_all(pool).await
    }

    /// Apply a rename/move inside an open transaction.
    ///
    /// When the DN changes, every cached org unit and user below the old
    /// DN has its parent path rewritten in the same transaction.
    pub async fn update(
        conn: &mut PgConnection,
        id: DbId,
        input: &UpdateOrgUnit,
    ) -> Result<Option<OrgUnit>, sqlx::Error> {
        let select = format!("SELECT {COLUMNS} FROM org_units WHERE id = $1 FOR UPDATE");
        let Some(current) = sqlx::query_as::<_, OrgUnit>(&select)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
        else {
            return Ok(None);
        };

        let query = format!(
            "UPDATE org_units SET
                name = COALESCE($2, name),
                dn = COALESCE($3, dn),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, OrgUnit>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.dn)
            .fetch_one(&mut *conn)
            .await?;

        if updated.dn != current.dn {
            Self::rewrite_descendants(&mut *conn, &current.dn, &updated.dn).await?;
        }
        Ok(Some(updated))
    }

    /// Replace the `old_base` suffix with `new_base` on every descendant DN.
    async fn rewrite_descendants(
        conn: &mut PgConnection,
        old_base: &str,
        new_base: &str,
    ) -> Result<(), sqlx::Error> {
        for table in ["org_units", "directory_users"] {
            let query = format!(
                "UPDATE {table} SET
                    dn = left(dn, length(dn) - length($1)) || $2,
                    updated_at = NOW()
                 WHERE length(dn) > length($1) + 1
                   AND lower(right(dn, length($1) + 1)) = ',' || lower($1)"
            );
            let result = sqlx::query(&query)
                .bind(old_base)
                .bind(new_base)
                .execute(&mut *conn)
                .await?;
            tracing::debug!(
                table,
                rows = result.rows_affected(),
                "Rewrote descendant DNs"
            );
        }
        Ok(())
    }

    /// Delete an org unit by ID. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM org_units WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Pull-sync upsert keyed by `object_guid`.
    ///
    /// `InsertOnly` leaves an existing row alone. `Overwrite` refreshes
    /// `name` and `dn` only when they differ.
    pub async fn upsert(
        pool: &PgPool,
        input: &NewOrgUnit,
        policy: SyncPolicy,
    ) -> Result<(OrgUnit, UpsertAction), sqlx::Error> {
        let on_conflict = match policy {
            SyncPolicy::InsertOnly => "DO NOTHING",
            SyncPolicy::Overwrite => {
                "DO UPDATE SET name = EXCLUDED.name, dn = EXCLUDED.dn, updated_at = NOW()
                 WHERE (org_units.name, org_units.dn) IS DISTINCT FROM (EXCLUDED.name, EXCLUDED.dn)"
            }
        };
        let query = format!(
            "INSERT INTO org_units (name, object_guid, dn)
             VALUES ($1, $2, $3)
             ON CONFLICT (object_guid) {on_conflict}
             RETURNING {COLUMNS}, (xmax = 0) AS inserted"
        );
        let upserted = sqlx::query_as::<_, UpsertedOrgUnit>(&query)
            .bind(&input.name)
            .bind(input.object_guid)
            .bind(&input.dn)
            .fetch_optional(pool)
            .await?;

        match upserted {
            Some(row) if row.inserted => Ok((row.org_unit, UpsertAction::Inserted)),
            Some(row) => Ok((row.org_unit, UpsertAction::Refreshed)),
            None => {
                let existing = Self::find_by_guid(pool, input.object_guid)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok((existing, UpsertAction::Unchanged))
            }
        }
    }
}
