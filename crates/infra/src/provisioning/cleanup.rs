use serde::Serialize;
use tracing::info;

use wardgate_core::PrincipalId;

use super::{ProvisionError, ProvisioningEngine};
use crate::directory::PrincipalDirectory;
use crate::store::{AccessStore, AssignmentFilter, PermissionFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub assignments_removed: u64,
    pub permissions_removed: u64,
}

impl<S, D> ProvisioningEngine<'_, S, D>
where
    S: AccessStore + ?Sized,
    D: PrincipalDirectory + ?Sized,
{
    /// Delete a catalog entry together with every assignment that references it.
    ///
    /// Returns `None` when no permission has that name.
    pub async fn remove_permission(
        &self,
        name: &str,
    ) -> Result<Option<CascadeReport>, ProvisionError> {
        let filter = PermissionFilter::by_name(name);
        let Some(permission) = self.store.find_permissions(&filter).await?.into_iter().next()
        else {
            return Ok(None);
        };

        // Assignments first so a failure never leaves them dangling.
        let assignments_removed = self
            .store
            .delete_assignments(&AssignmentFilter::by_permission(permission.id))
            .await?;
        let permissions_removed = self.store.delete_permissions(&filter).await?;

        info!(
            permission = %permission.name,
            assignments_removed,
            "permission removed"
        );
        Ok(Some(CascadeReport {
            assignments_removed,
            permissions_removed,
        }))
    }

    /// Drop every direct assignment of a principal that is being removed.
    pub async fn remove_principal_assignments(
        &self,
        principal_id: PrincipalId,
    ) -> Result<u64, ProvisionError> {
        let removed = self
            .store
            .delete_assignments(&AssignmentFilter::by_principal(principal_id))
            .await?;
        info!(%principal_id, removed, "principal assignments removed");
        Ok(removed)
    }
}
