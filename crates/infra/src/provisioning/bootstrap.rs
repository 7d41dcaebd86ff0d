use tracing::{debug, info, warn};

use wardgate_auth::RoleSpec;

use super::report::{RecordKind, RecordOutcome, RecordReport, RoleBootstrapReport};
use super::{escalate, ProvisionError, ProvisioningEngine};
use crate::directory::PrincipalDirectory;
use crate::store::{AccessStore, RoleFilter};

impl<S, D> ProvisioningEngine<'_, S, D>
where
    S: AccessStore + ?Sized,
    D: PrincipalDirectory + ?Sized,
{
    /// Create each desired role that does not exist yet, as a system role.
    ///
    /// A role that already exists under the same normalized name is left
    /// exactly as stored, even when its permissions differ from the desired
    /// definition. Safe to call on every start.
    pub async fn ensure_system_roles(
        &self,
        desired: &[RoleSpec],
    ) -> Result<RoleBootstrapReport, ProvisionError> {
        let mut report = RoleBootstrapReport::default();

        for (index, spec) in desired.iter().enumerate() {
            let mut new = match spec.validate(index) {
                Ok(new) => new,
                Err(err) => {
                    warn!(record = index, field = err.field, error = %err, "invalid role definition");
                    let key = match spec.name.trim() {
                        "" => format!("#{index}"),
                        name => name.to_string(),
                    };
                    report.push(RecordReport::new(
                        RecordKind::Role,
                        key,
                        RecordOutcome::failed(err),
                    ));
                    continue;
                }
            };
            let key = new.name.to_string();

            match self.store.find_roles(&RoleFilter::by_name(new.name.clone())).await {
                Ok(existing) if !existing.is_empty() => {
                    debug!(role = %key, "role already exists; leaving it untouched");
                    report.push(RecordReport::new(
                        RecordKind::Role,
                        key,
                        RecordOutcome::AlreadyExists,
                    ));
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    let err = escalate(err)?;
                    warn!(role = %key, error = %err, "role lookup failed");
                    report.push(RecordReport::new(
                        RecordKind::Role,
                        key,
                        RecordOutcome::failed(err),
                    ));
                    continue;
                }
            }

            new.is_system_role = true;
            new.created_by = self.options.actor;

            let outcome = match self.store.insert_role(new).await {
                Ok(role) => {
                    info!(role = %role.name, role_id = %role.id, "system role created");
                    RecordOutcome::Created
                }
                Err(err) if err.is_duplicate_key() => {
                    info!(role = %key, "role created concurrently; treating as existing");
                    RecordOutcome::AlreadyExists
                }
                Err(err) => {
                    let err = escalate(err)?;
                    warn!(role = %key, error = %err, "failed to create system role");
                    RecordOutcome::failed(err)
                }
            };
            report.push(RecordReport::new(RecordKind::Role, key, outcome));
        }

        info!(
            created = report.counts.created,
            skipped = report.counts.skipped,
            failed = report.counts.failed,
            "system roles ensured"
        );
        Ok(report)
    }
}
