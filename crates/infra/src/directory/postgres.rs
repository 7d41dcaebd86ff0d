//! Postgres-backed principal directory over the credential store's `users`
//! table. Read-only: this crate never creates or alters that table.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use wardgate_auth::{PrincipalRecord, RoleName};
use wardgate_core::PrincipalId;

use super::PrincipalDirectory;
use crate::store::StoreError;
use crate::store::postgres::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresPrincipalDirectory {
    pool: Arc<PgPool>,
}

impl PostgresPrincipalDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl PrincipalDirectory for PostgresPrincipalDirectory {
    #[instrument(skip(self), err)]
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, role, is_active, created_at
            FROM users
            WHERE LOWER(email) = LOWER($1)
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(identifier.trim())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_principal_by_identifier", e))?;

        row.as_ref().map(principal_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn earliest_active(&self) -> Result<Option<PrincipalRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, role, is_active, created_at
            FROM users
            WHERE is_active = TRUE
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_earliest_active_principal", e))?;

        row.as_ref().map(principal_from_row).transpose()
    }
}

fn principal_from_row(row: &PgRow) -> Result<PrincipalRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Corrupt(format!("users row: {e}"));

    let id: uuid::Uuid = row.try_get("id").map_err(decode)?;
    let role: Option<String> = row.try_get("role").map_err(decode)?;

    // A blank role column means "no coarse role", not a corrupt row.
    let role = role
        .filter(|r| !r.trim().is_empty())
        .map(|r| RoleName::parse(&r))
        .transpose()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(PrincipalRecord {
        id: PrincipalId::from_uuid(id),
        identifier: row.try_get("email").map_err(decode)?,
        role,
        is_active: row.try_get("is_active").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}
