//! Idempotent provisioning of roles, the permission catalog and initial
//! assignments.
//!
//! ## Run Order
//!
//! 1. System roles are bootstrapped (create-if-absent, never overwritten).
//! 2. The permission catalog is reconciled per resource group.
//! 3. Newly created permissions are assigned to a target principal.
//!
//! Only connection loss aborts a run. Every other storage failure is recorded
//! against the record it affected and the run continues.

mod bootstrap;
mod cleanup;
pub mod desired;
mod reconcile;
pub mod report;

pub use cleanup::CascadeReport;
pub use desired::{DesiredState, DesiredStateError};
pub use report::{
    AssignmentSkipReason, AssignmentStep, EntityCounts, GroupOutcome, ProvisioningReport,
    ReconcileReport, RecordKind, RecordOutcome, RecordReport, ResourceGroupReport,
    RoleBootstrapReport,
};

use thiserror::Error;
use tracing::warn;

use wardgate_core::PrincipalId;

use crate::directory::PrincipalDirectory;
use crate::store::{AccessStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// The backend is unreachable. Committed-so-far state stays in place.
    #[error("storage connection failed: {0}")]
    Connection(String),

    #[error(transparent)]
    Storage(StoreError),
}

impl ProvisionError {
    pub fn is_connection(&self) -> bool {
        matches!(self, ProvisionError::Connection(_))
    }
}

impl From<StoreError> for ProvisionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(msg) => ProvisionError::Connection(msg),
            other => ProvisionError::Storage(other),
        }
    }
}

/// Split a storage error into "abort the run" and "record it and move on".
pub(crate) fn escalate(err: StoreError) -> Result<StoreError, ProvisionError> {
    if err.is_connection() {
        Err(err.into())
    } else {
        Ok(err)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningOptions {
    /// Identifying attribute (email) of the principal that receives newly
    /// created permissions. Falls back to the earliest active principal.
    pub admin_identifier: Option<String>,
    /// Principal recorded in `created_by` / `granted_by`. Unset outside a
    /// request context.
    pub actor: Option<PrincipalId>,
    /// Accepted for compatibility; not acted upon.
    pub force: bool,
    pub skip_roles: bool,
}

/// Brings stored access-control records in line with a desired state.
///
/// Holds only borrowed collaborators; construct one per run.
pub struct ProvisioningEngine<'a, S: ?Sized, D: ?Sized> {
    store: &'a S,
    directory: &'a D,
    options: ProvisioningOptions,
}

impl<'a, S, D> ProvisioningEngine<'a, S, D>
where
    S: AccessStore + ?Sized,
    D: PrincipalDirectory + ?Sized,
{
    pub fn new(store: &'a S, directory: &'a D, options: ProvisioningOptions) -> Self {
        Self {
            store,
            directory,
            options,
        }
    }

    pub fn options(&self) -> &ProvisioningOptions {
        &self.options
    }

    /// Bootstrap system roles (unless skipped), then reconcile the catalog.
    pub async fn run(&self, desired: &DesiredState) -> Result<ProvisioningReport, ProvisionError> {
        if self.options.force {
            warn!("--force is not yet supported; running normal reconciliation");
        }

        let roles = if self.options.skip_roles {
            None
        } else {
            Some(self.ensure_system_roles(&desired.roles).await?)
        };
        let catalog = self.reconcile(&desired.permissions).await?;

        let report = ProvisioningReport {
            roles,
            catalog,
            force_ignored: self.options.force,
        };
        report.log();
        Ok(report)
    }
}
