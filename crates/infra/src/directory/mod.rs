//! Read-only view of the external principal (user) directory.
//!
//! Credentials never cross this boundary; the provisioning engine only needs
//! to find who should receive newly created permissions.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryPrincipalDirectory;
pub use postgres::PostgresPrincipalDirectory;

use async_trait::async_trait;

use wardgate_auth::PrincipalRecord;

use crate::store::StoreError;

#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// Principal whose identifying attribute (email) matches, ignoring case.
    ///
    /// Inactive principals are returned too; callers decide what to do with them.
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<PrincipalRecord>, StoreError>;

    /// Earliest-created active principal.
    async fn earliest_active(&self) -> Result<Option<PrincipalRecord>, StoreError>;
}
