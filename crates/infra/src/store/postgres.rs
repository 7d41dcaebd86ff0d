//! Postgres-backed access-control store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `DuplicateKey` |
//! | Database (auth / unknown database) | `28000`, `28P01`, `3D000` | `Connection` |
//! | Database (other) | any other | `Backend` |
//! | Io / Tls / PoolTimedOut / PoolClosed / Configuration | N/A | `Connection` |
//! | ColumnDecode / Decode | N/A | `Corrupt` |
//! | Other | N/A | `Backend` |
//!
//! ## Schema
//!
//! `ensure_schema` creates the three tables idempotently. The `users` table is
//! owned by the credential store and is never created or written here.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Acquire, PgPool, Row};
use tracing::instrument;

use wardgate_auth::{
    Action, Assignment, NewAssignment, NewPermission, NewRole, Permission, PermissionSet,
    Resource, Role, RoleName,
};
use wardgate_core::{AssignmentId, PermissionId, PrincipalId, RoleId};

use super::r#trait::{
    AccessStore, AssignmentFilter, PermissionFilter, PermissionPatch, RoleFilter, RolePatch,
    StoreError,
};

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        resource    TEXT NOT NULL,
        action      TEXT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS permissions_resource_idx ON permissions (resource)",
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id             UUID PRIMARY KEY,
        name           TEXT NOT NULL UNIQUE,
        display_name   TEXT NOT NULL,
        description    TEXT NOT NULL DEFAULT '',
        permissions    JSONB NOT NULL DEFAULT '[]'::jsonb,
        is_active      BOOLEAN NOT NULL DEFAULT TRUE,
        is_system_role BOOLEAN NOT NULL DEFAULT FALSE,
        created_by     UUID NULL,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_permissions (
        id            UUID PRIMARY KEY,
        user_id       UUID NOT NULL,
        permission_id UUID NOT NULL REFERENCES permissions (id) ON DELETE CASCADE,
        granted_by    UUID NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (user_id, permission_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS user_permissions_permission_idx ON user_permissions (permission_id)",
];

/// Postgres-backed access-control store.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool which is thread-safe (Arc + Send + Sync).
///
/// ## Batches
///
/// `insert_permissions` runs inside one transaction with a savepoint per row,
/// so a duplicate name rolls back only that row and the rest of the batch
/// commits together.
#[derive(Debug, Clone)]
pub struct PostgresAccessStore {
    pool: Arc<PgPool>,
}

impl PostgresAccessStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url` and verify it with a round trip.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| match map_sqlx_error("connect", e) {
                StoreError::Backend(msg) => StoreError::Connection(msg),
                other => other,
            })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they are missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl AccessStore for PostgresAccessStore {
    #[instrument(skip(self), err)]
    async fn find_permissions(
        &self,
        filter: &PermissionFilter,
    ) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, resource, action, created_at
            FROM permissions
            WHERE ($1::text IS NULL OR name = $1)
                AND ($2::text IS NULL OR resource = $2)
                AND ($3::text IS NULL OR action = $3)
            ORDER BY created_at ASC, name ASC
            "#,
        )
        .bind(filter.name.as_deref())
        .bind(filter.resource.map(|r| r.as_str()))
        .bind(filter.action.map(|a| a.as_str()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_permissions", e))?;

        rows.iter().map(permission_from_row).collect()
    }

    #[instrument(skip(self), fields(name = %new.name), err)]
    async fn insert_permission(&self, new: NewPermission) -> Result<Permission, StoreError> {
        let stored = Permission::from_new(new, PermissionId::new(), Utc::now());
        insert_permission_row(&*self.pool, &stored).await?;
        Ok(stored)
    }

    #[instrument(skip(self, batch), fields(batch_len = batch.len()), err)]
    async fn insert_permissions(
        &self,
        batch: Vec<NewPermission>,
    ) -> Result<Vec<Result<Permission, StoreError>>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut results = Vec::with_capacity(batch.len());
        for new in batch {
            let stored = Permission::from_new(new, PermissionId::new(), Utc::now());

            let mut savepoint = Acquire::begin(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("savepoint", e))?;

            match insert_permission_row(&mut *savepoint, &stored).await {
                Ok(()) => {
                    savepoint
                        .commit()
                        .await
                        .map_err(|e| map_sqlx_error("release_savepoint", e))?;
                    results.push(Ok(stored));
                }
                Err(err) if err.is_connection() => return Err(err),
                Err(err) => {
                    savepoint
                        .rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback_savepoint", e))?;
                    results.push(Err(err));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(results)
    }

    #[instrument(skip(self), err)]
    async fn update_permissions(
        &self,
        filter: &PermissionFilter,
        patch: &PermissionPatch,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE permissions
            SET description = COALESCE($4, description)
            WHERE ($1::text IS NULL OR name = $1)
                AND ($2::text IS NULL OR resource = $2)
                AND ($3::text IS NULL OR action = $3)
            "#,
        )
        .bind(filter.name.as_deref())
        .bind(filter.resource.map(|r| r.as_str()))
        .bind(filter.action.map(|a| a.as_str()))
        .bind(patch.description.as_deref())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_permissions", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn delete_permissions(&self, filter: &PermissionFilter) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM permissions
            WHERE ($1::text IS NULL OR name = $1)
                AND ($2::text IS NULL OR resource = $2)
                AND ($3::text IS NULL OR action = $3)
            "#,
        )
        .bind(filter.name.as_deref())
        .bind(filter.resource.map(|r| r.as_str()))
        .bind(filter.action.map(|a| a.as_str()))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_permissions", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn find_roles(&self, filter: &RoleFilter) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, display_name, description, permissions, is_active,
                   is_system_role, created_by, created_at, updated_at
            FROM roles
            WHERE ($1::text IS NULL OR name = $1)
                AND ($2::boolean IS NULL OR is_system_role = $2)
                AND ($3::boolean IS NULL OR is_active = $3)
            ORDER BY created_at ASC, name ASC
            "#,
        )
        .bind(filter.name.as_ref().map(|n| n.as_str()))
        .bind(filter.is_system_role)
        .bind(filter.is_active)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_roles", e))?;

        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self), fields(name = %new.name), err)]
    async fn insert_role(&self, new: NewRole) -> Result<Role, StoreError> {
        let stored = Role::from_new(new, RoleId::new(), Utc::now());
        let permissions = serde_json::to_value(&stored.permissions)
            .map_err(|e| StoreError::Backend(format!("permissions serialization failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO roles (
                id, name, display_name, description, permissions, is_active,
                is_system_role, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(stored.id.as_uuid())
        .bind(stored.name.as_str())
        .bind(&stored.display_name)
        .bind(&stored.description)
        .bind(permissions)
        .bind(stored.is_active)
        .bind(stored.is_system_role)
        .bind(stored.created_by.map(uuid::Uuid::from))
        .bind(stored.created_at)
        .bind(stored.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;

        Ok(stored)
    }

    #[instrument(skip(self), err)]
    async fn update_roles(&self, filter: &RoleFilter, patch: &RolePatch) -> Result<u64, StoreError> {
        let permissions = patch
            .permissions
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Backend(format!("permissions serialization failed: {e}")))?;

        let result = sqlx::query(
            r#"
            UPDATE roles
            SET display_name = COALESCE($4, display_name),
                description  = COALESCE($5, description),
                permissions  = COALESCE($6, permissions),
                is_active    = COALESCE($7, is_active),
                updated_at   = NOW()
            WHERE ($1::text IS NULL OR name = $1)
                AND ($2::boolean IS NULL OR is_system_role = $2)
                AND ($3::boolean IS NULL OR is_active = $3)
            "#,
        )
        .bind(filter.name.as_ref().map(|n| n.as_str()))
        .bind(filter.is_system_role)
        .bind(filter.is_active)
        .bind(patch.display_name.as_deref())
        .bind(patch.description.as_deref())
        .bind(permissions)
        .bind(patch.is_active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_roles", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn delete_role(&self, name: &RoleName) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let is_system: Option<bool> =
            sqlx::query_scalar("SELECT is_system_role FROM roles WHERE name = $1 FOR UPDATE")
                .bind(name.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_role", e))?;

        match is_system {
            None => Ok(false),
            Some(true) => Err(StoreError::Protected(format!("role {name} is a system role"))),
            Some(false) => {
                sqlx::query("DELETE FROM roles WHERE name = $1")
                    .bind(name.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("delete_role", e))?;
                tx.commit()
                    .await
                    .map_err(|e| map_sqlx_error("commit_transaction", e))?;
                Ok(true)
            }
        }
    }

    #[instrument(skip(self), err)]
    async fn find_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Assignment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, permission_id, granted_by, created_at
            FROM user_permissions
            WHERE ($1::uuid IS NULL OR user_id = $1)
                AND ($2::uuid IS NULL OR permission_id = $2)
            ORDER BY created_at ASC
            "#,
        )
        .bind(filter.principal_id.map(uuid::Uuid::from))
        .bind(filter.permission_id.map(uuid::Uuid::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_assignments", e))?;

        rows.iter().map(assignment_from_row).collect()
    }

    #[instrument(
        skip(self),
        fields(principal_id = %new.principal_id, permission_id = %new.permission_id),
        err
    )]
    async fn insert_assignment(&self, new: NewAssignment) -> Result<Assignment, StoreError> {
        let stored = Assignment::from_new(new, AssignmentId::new(), Utc::now());
        sqlx::query(
            r#"
            INSERT INTO user_permissions (id, user_id, permission_id, granted_by, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(stored.id.as_uuid())
        .bind(stored.principal_id.as_uuid())
        .bind(stored.permission_id.as_uuid())
        .bind(stored.granted_by.map(uuid::Uuid::from))
        .bind(stored.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_assignment", e))?;
        Ok(stored)
    }

    #[instrument(skip(self), err)]
    async fn delete_assignments(&self, filter: &AssignmentFilter) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_permissions
            WHERE ($1::uuid IS NULL OR user_id = $1)
                AND ($2::uuid IS NULL OR permission_id = $2)
            "#,
        )
        .bind(filter.principal_id.map(uuid::Uuid::from))
        .bind(filter.permission_id.map(uuid::Uuid::from))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_assignments", e))?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            tracing::debug!("postgres pool closed");
        }
    }
}

async fn insert_permission_row<'e, E>(executor: E, stored: &Permission) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO permissions (id, name, description, resource, action, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(stored.id.as_uuid())
    .bind(&stored.name)
    .bind(&stored.description)
    .bind(stored.resource.as_str())
    .bind(stored.action.as_str())
    .bind(stored.created_at)
    .execute(executor)
    .await
    .map_err(|e| map_sqlx_error("insert_permission", e))?;
    Ok(())
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::DuplicateKey(msg),
                // invalid_authorization_specification, invalid_password, invalid_catalog_name
                Some("28000") | Some("28P01") | Some("3D000") => StoreError::Connection(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::Io(e) => StoreError::Connection(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Connection(format!("tls error in {operation}: {e}")),
        sqlx::Error::PoolTimedOut => {
            StoreError::Connection(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Connection(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::Configuration(e) => {
            StoreError::Connection(format!("invalid connection settings in {operation}: {e}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("failed to decode row in {operation}: {err}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("failed to read column {name}: {e}")))
}

fn permission_from_row(row: &PgRow) -> Result<Permission, StoreError> {
    let resource: String = column(row, "resource")?;
    let action: String = column(row, "action")?;
    Ok(Permission {
        id: PermissionId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        description: column(row, "description")?,
        resource: Resource::from_str(&resource).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        action: Action::from_str(&action).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        created_at: column(row, "created_at")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<Role, StoreError> {
    let name: String = column(row, "name")?;
    let permissions: serde_json::Value = column(row, "permissions")?;
    let created_by: Option<uuid::Uuid> = column(row, "created_by")?;
    let created_at: DateTime<Utc> = column(row, "created_at")?;
    let updated_at: DateTime<Utc> = column(row, "updated_at")?;

    Ok(Role {
        id: RoleId::from_uuid(column(row, "id")?),
        name: RoleName::parse(&name).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        display_name: column(row, "display_name")?,
        description: column(row, "description")?,
        permissions: serde_json::from_value::<PermissionSet>(permissions)
            .map_err(|e| StoreError::Corrupt(format!("role {name} permissions: {e}")))?,
        is_active: column(row, "is_active")?,
        is_system_role: column(row, "is_system_role")?,
        created_by: created_by.map(PrincipalId::from_uuid),
        created_at,
        updated_at,
    })
}

fn assignment_from_row(row: &PgRow) -> Result<Assignment, StoreError> {
    let granted_by: Option<uuid::Uuid> = column(row, "granted_by")?;
    Ok(Assignment {
        id: AssignmentId::from_uuid(column(row, "id")?),
        principal_id: PrincipalId::from_uuid(column(row, "user_id")?),
        permission_id: PermissionId::from_uuid(column(row, "permission_id")?),
        granted_by: granted_by.map(PrincipalId::from_uuid),
        created_at: column(row, "created_at")?,
    })
}
