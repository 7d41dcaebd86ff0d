use tracing::{debug, info, warn};

use wardgate_auth::{
    NewAssignment, NewPermission, Permission, PermissionSpec, PrincipalRecord, Resource,
};

use super::report::{
    AssignmentSkipReason, AssignmentStep, GroupOutcome, ReconcileReport, RecordOutcome,
    ResourceGroupReport,
};
use super::{escalate, ProvisionError, ProvisioningEngine};
use crate::directory::PrincipalDirectory;
use crate::store::{AccessStore, PermissionFilter, StoreError};

/// Valid desired permissions sharing one resource, in first-appearance order.
struct ResourceGroup {
    resource: Resource,
    batch: Vec<NewPermission>,
}

fn group_by_resource(valid: Vec<NewPermission>) -> Vec<ResourceGroup> {
    let mut groups: Vec<ResourceGroup> = Vec::new();
    for new in valid {
        match groups.iter_mut().find(|g| g.resource == new.resource) {
            Some(group) => group.batch.push(new),
            None => groups.push(ResourceGroup {
                resource: new.resource,
                batch: vec![new],
            }),
        }
    }
    groups
}

impl<S, D> ProvisioningEngine<'_, S, D>
where
    S: AccessStore + ?Sized,
    D: PrincipalDirectory + ?Sized,
{
    /// Converge the permission catalog towards `desired`.
    ///
    /// ## Algorithm
    ///
    /// 1. Validate every record; invalid ones are reported and dropped.
    /// 2. Group the rest by resource.
    /// 3. A resource that already has *any* catalog entry is skipped as a whole.
    ///    A permission deleted by hand from an already-seeded resource is
    ///    therefore not recreated.
    /// 4. Other groups are bulk-inserted; a name taken by another group counts
    ///    as already existing.
    /// 5. Newly created permissions are assigned to the target principal.
    ///
    /// Running it twice with the same input leaves the same state as running
    /// it once.
    pub async fn reconcile(
        &self,
        desired: &[PermissionSpec],
    ) -> Result<ReconcileReport, ProvisionError> {
        let mut report = ReconcileReport::default();

        let mut valid = Vec::with_capacity(desired.len());
        for (index, spec) in desired.iter().enumerate() {
            match spec.validate(index) {
                Ok(new) => valid.push(new),
                Err(err) => {
                    warn!(record = index, field = err.field, error = %err, "invalid desired permission");
                    let key = match spec.name.trim() {
                        "" => format!("#{index}"),
                        name => name.to_string(),
                    };
                    report.push_permission(key, RecordOutcome::failed(err));
                }
            }
        }

        let mut created: Vec<Permission> = Vec::new();
        for group in group_by_resource(valid) {
            let resource = group.resource;
            let desired_len = group.batch.len();

            let existing = match self
                .store
                .find_permissions(&PermissionFilter::by_resource(resource))
                .await
            {
                Ok(existing) => existing.len(),
                Err(err) => {
                    let err = escalate(err)?;
                    warn!(%resource, error = %err, "failed to query existing permissions");
                    let names = group.batch.into_iter().map(|p| p.name).collect();
                    fail_group(&mut report, resource, names, &err);
                    continue;
                }
            };

            if existing > 0 {
                info!(%resource, existing, desired = desired_len, "resource already seeded; skipping group");
                report.skip_group(resource, desired_len, existing);
                continue;
            }

            let names: Vec<String> = group.batch.iter().map(|p| p.name.clone()).collect();
            let results = match self.store.insert_permissions(group.batch).await {
                Ok(results) => results,
                Err(err) => {
                    let err = escalate(err)?;
                    warn!(%resource, error = %err, "bulk insert failed");
                    fail_group(&mut report, resource, names, &err);
                    continue;
                }
            };

            report.groups.push(ResourceGroupReport {
                resource,
                desired: desired_len,
                outcome: GroupOutcome::Inserted,
            });

            for (name, result) in names.into_iter().zip(results) {
                let outcome = match result {
                    Ok(permission) => {
                        debug!(permission = %permission.name, "permission created");
                        created.push(permission);
                        RecordOutcome::Created
                    }
                    Err(err) if err.is_duplicate_key() => {
                        info!(permission = %name, "permission name already taken; treating as existing");
                        RecordOutcome::AlreadyExists
                    }
                    Err(err) => {
                        let err = escalate(err)?;
                        warn!(permission = %name, error = %err, "failed to create permission");
                        RecordOutcome::failed(err)
                    }
                };
                report.push_permission(name, outcome);
            }
        }

        info!(
            created = report.permissions.created,
            skipped = report.permissions.skipped,
            failed = report.permissions.failed,
            "permission catalog reconciled"
        );

        if !created.is_empty() {
            report.assignment_step = self.assign_created(&created, &mut report).await?;
        }
        Ok(report)
    }

    /// Principal that receives newly created permissions: the configured
    /// admin if one matches, otherwise the earliest active principal.
    async fn find_target(&self) -> Result<Option<PrincipalRecord>, StoreError> {
        if let Some(identifier) = &self.options.admin_identifier {
            if let Some(admin) = self.directory.find_by_identifier(identifier).await? {
                return Ok(Some(admin));
            }
            debug!(%identifier, "configured admin not found; falling back to earliest active principal");
        }
        self.directory.earliest_active().await
    }

    async fn resolve_target(
        &self,
    ) -> Result<Result<PrincipalRecord, AssignmentSkipReason>, ProvisionError> {
        match self.find_target().await {
            Ok(Some(principal)) => Ok(Ok(principal)),
            Ok(None) => Ok(Err(AssignmentSkipReason::NoPrincipal)),
            Err(err) => {
                let err = escalate(err)?;
                warn!(error = %err, "principal directory lookup failed");
                Ok(Err(AssignmentSkipReason::DirectoryUnavailable))
            }
        }
    }

    async fn assign_created(
        &self,
        created: &[Permission],
        report: &mut ReconcileReport,
    ) -> Result<AssignmentStep, ProvisionError> {
        let target = match self.resolve_target().await? {
            Ok(target) => target,
            Err(reason) => {
                warn!(%reason, permissions = created.len(), "assignment skipped");
                return Ok(AssignmentStep::Skipped { reason });
            }
        };

        for permission in created {
            let key = format!("{} -> {}", target.identifier, permission.name);
            let new = NewAssignment {
                principal_id: target.id,
                permission_id: permission.id,
                granted_by: self.options.actor,
            };

            let outcome = match self.store.insert_assignment(new).await {
                Ok(_) => RecordOutcome::Created,
                Err(err) if err.is_duplicate_key() => {
                    info!(principal = %target.identifier, permission = %permission.name, "already assigned");
                    RecordOutcome::AlreadyExists
                }
                Err(err) => {
                    let err = escalate(err)?;
                    warn!(principal = %target.identifier, permission = %permission.name, error = %err, "failed to assign permission");
                    RecordOutcome::failed(err)
                }
            };
            report.push_assignment(key, outcome);
        }

        info!(
            principal = %target.identifier,
            created = report.assignments.created,
            skipped = report.assignments.skipped,
            failed = report.assignments.failed,
            "new permissions assigned"
        );
        Ok(AssignmentStep::Assigned {
            principal_id: target.id,
            identifier: target.identifier,
        })
    }
}

fn fail_group(
    report: &mut ReconcileReport,
    resource: Resource,
    names: Vec<String>,
    err: &StoreError,
) {
    let desired = names.len();
    for name in names {
        report.push_permission(name, RecordOutcome::failed(err));
    }
    report.groups.push(ResourceGroupReport {
        resource,
        desired,
        outcome: GroupOutcome::Failed {
            reason: err.to_string(),
        },
    });
}
