//! Repository for the `directory_users` table.

use galilee_core::sync::{SyncPolicy, UpsertAction};
use sqlx::{FromRow, PgPool};

use crate::models::directory_user::{DirectoryUser, NewDirectoryUser, UpdateDirectoryUser};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, account_name, display_name, user_principal_name, dn, email, phone, \
                       member_of, bad_password_count, account_control, org_unit_id, \
                       created_at, updated_at";

#[derive(FromRow)]
struct UpsertedUser {
    #[sqlx(flatten)]
    user: DirectoryUser,
    inserted: bool,
}

/// Provides CRUD and pull-sync operations for cached directory users.
pub struct DirectoryUserRepo;

impl DirectoryUserRepo {
    /// Insert a new user, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &NewDirectoryUser,
    ) -> Result<DirectoryUser, sqlx::Error> {
        let query = format!(
            "INSERT INTO directory_users
                (account_name, display_name, user_principal_name, dn, email, phone,
                 member_of, bad_password_count, account_control, org_unit_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DirectoryUser>(&query)
            .bind(&input.account_name)
            .bind(&input.display_name)
            .bind(&input.user_principal_name)
            .bind(&input.dn)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.member_of)
            .bind(input.bad_password_count)
            .bind(input.account_control)
            .bind(input.org_unit_id)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_account(
        pool: &PgPool,
        account_name: &str,
    ) -> Result<Option<DirectoryUser>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM directory_users WHERE account_name = $1");
        sqlx::query_as::<_, DirectoryUser>(&query)
            .bind(account_name)
            .fetch_optional(pool)
            .await
    }

    /// List all users ordered by account name.
    pub async fn list(pool: &PgPool) -> Result<Vec<DirectoryUser>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM directory_users ORDER BY account_name");
        sqlx::query_as::<_, DirectoryUser>(&query)
            .fetch_all(pool)
            .await
    }

    /// Update a user. Only non-`None` fields in `input` are applied; a
    /// relocation writes `dn` and `org_unit_id` together.
    ///
    /// Returns `None` if no row with the given account name exists.
    pub async fn update(
        pool: &PgPool,
        account_name: &str,
        input: &UpdateDirectoryUser,
    ) -> Result<Option<DirectoryUser>, sqlx::Error> {
        let query = format!(
            "UPDATE directory_users SET
                email = NULLIF(COALESCE($2, email), ''),
                phone = NULLIF(COALESCE($3, phone), ''),
                account_control = COALESCE($4, account_control),
                dn = CASE WHEN $5 THEN $6 ELSE dn END,
                org_unit_id = CASE WHEN $5 THEN $7 ELSE org_unit_id END,
                updated_at = NOW()
             WHERE account_name = $1
             RETURNING {COLUMNS}"
        );
        let relocate = input.relocate.as_ref();
        sqlx::query_as::<_, DirectoryUser>(&query)
            .bind(account_name)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(input.account_control)
            .bind(relocate.is_some())
            .bind(relocate.map(|r| r.dn.as_str()))
            .bind(relocate.and_then(|r| r.org_unit_id))
            .fetch_optional(pool)
            .await
    }

    /// Permanently delete a user. Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, account_name: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM directory_users WHERE account_name = $1")
            .bind(account_name)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Pull-sync upsert keyed by `account_name`.
    pub async fn upsert(
        pool: &PgPool,
        input: &NewDirectoryUser,
        policy: SyncPolicy,
    ) -> Result<(DirectoryUser, UpsertAction), sqlx::Error> {
        let on_conflict = match policy {
            SyncPolicy::InsertOnly => "DO NOTHING",
            SyncPolicy::Overwrite => {
                "DO UPDATE SET
                    display_name = EXCLUDED.display_name,
                    user_principal_name = EXCLUDED.user_principal_name,
                    dn = EXCLUDED.dn,
                    email = EXCLUDED.email,
                    phone = EXCLUDED.phone,
                    member_of = EXCLUDED.member_of,
                    bad_password_count = EXCLUDED.bad_password_count,
                    account_control = EXCLUDED.account_control,
                    org_unit_id = EXCLUDED.org_unit_id,
                    updated_at = NOW()
                 WHERE (directory_users.display_name, directory_users.user_principal_name,
                        directory_users.dn, directory_users.email, directory_users.phone,
                        directory_users.member_of, directory_users.bad_password_count,
                        directory_users.account_control, directory_users.org_unit_id)
                   IS DISTINCT FROM
                       (EXCLUDED.display_name, EXCLUDED.user_principal_name, EXCLUDED.dn,
                        EXCLUDED.email, EXCLUDED.phone, EXCLUDED.member_of,
                        EXCLUDED.bad_password_count, EXCLUDED.account_control,
                        EXCLUDED.org_unit_id)"
            }
        };
        let query = format!(
            "INSERT INTO directory_users
                (account_name, display_name, user_principal_name, dn, email, phone,
                 member_of, bad_password_count, account_control, org_unit_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (account_name) {on_conflict}
             RETURNING {COLUMNS}, (xmax = 0) AS inserted"
        );
        let upserted = sqlx::query_as::<_, UpsertedUser>(&query)
            .bind(&input.account_name)
            .bind(&input.display_name)
            .bind(&input.user_principal_name)
            .bind(&input.dn)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.member_of)
            .bind(input.bad_password_count)
            .bind(input.account_control)
            .bind(input.org_unit_id)
            .fetch_optional(pool)
            .await?;

        match upserted {
            Some(row) if row.inserted => Ok((row.user, UpsertAction::Inserted)),
            Some(row) => Ok((row.user, UpsertAction::Refreshed)),
            None => {
                let existing = Self::find_by_account(pool, &input.account_name)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok((existing, UpsertAction::Unchanged))
            }
        }
    }
}
