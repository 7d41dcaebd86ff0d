use std::sync::RwLock;

use async_trait::async_trait;

use wardgate_auth::PrincipalRecord;

use super::PrincipalDirectory;
use crate::store::StoreError;

/// In-memory principal directory (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryPrincipalDirectory {
    principals: RwLock<Vec<PrincipalRecord>>,
}

impl InMemoryPrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(principals: impl IntoIterator<Item = PrincipalRecord>) -> Self {
        Self {
            principals: RwLock::new(principals.into_iter().collect()),
        }
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryPrincipalDirectory {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError> {
        let principals = self
            .principals
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        // Same semantics as `LOWER(email) = LOWER($1)`: oldest match wins.
        let wanted = identifier.trim().to_lowercase();
        Ok(principals
            .iter()
            .filter(|p| p.identifier.to_lowercase() == wanted)
            .min_by_key(|p| (p.created_at, p.id))
            .cloned())
    }

    async fn earliest_active(&self) -> Result<Option<PrincipalRecord>, StoreError> {
        let principals = self
            .principals
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(principals
            .iter()
            .filter(|p| p.is_active)
            .min_by_key(|p| (p.created_at, p.id))
            .cloned())
    }
}
