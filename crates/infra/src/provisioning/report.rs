//! Structured results of a provisioning run.
//!
//! Every run produces counts of {created, skipped-as-existing, failed} per
//! entity kind plus the per-record outcomes behind those counts.

use std::fmt;

use serde::Serialize;

use wardgate_auth::Resource;
use wardgate_core::PrincipalId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl EntityCounts {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::Created => self.created += 1,
            RecordOutcome::AlreadyExists => self.skipped += 1,
            RecordOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

impl fmt::Display for EntityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} skipped, {} failed",
            self.created, self.skipped, self.failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Permission,
    Role,
    Assignment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordOutcome {
    Created,
    AlreadyExists,
    Failed { reason: String },
}

impl RecordOutcome {
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Outcome for one desired record, keyed by something an operator recognizes
/// (permission name, role name, or `principal -> permission`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordReport {
    pub kind: RecordKind,
    pub key: String,
    pub outcome: RecordOutcome,
}

impl RecordReport {
    pub fn new(kind: RecordKind, key: impl Into<String>, outcome: RecordOutcome) -> Self {
        Self {
            kind,
            key: key.into(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupOutcome {
    /// The resource already had catalog entries; nothing in the group was written.
    SkippedExisting { existing: usize },
    Inserted,
    /// The batch could not be written; every record in it is reported failed.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceGroupReport {
    pub resource: Resource,
    pub desired: usize,
    pub outcome: GroupOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentSkipReason {
    /// Neither the configured admin nor any active principal exists.
    NoPrincipal,
    /// The directory could not be queried.
    DirectoryUnavailable,
}

impl fmt::Display for AssignmentSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPrincipal => f.write_str("no principal"),
            Self::DirectoryUnavailable => f.write_str("principal directory unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssignmentStep {
    /// No permission was newly created, so there was nothing to hand out.
    NothingToAssign,
    Assigned {
        principal_id: PrincipalId,
        identifier: String,
    },
    Skipped { reason: AssignmentSkipReason },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleBootstrapReport {
    pub counts: EntityCounts,
    pub records: Vec<RecordReport>,
}

impl RoleBootstrapReport {
    pub fn push(&mut self, record: RecordReport) {
        self.counts.record(&record.outcome);
        self.records.push(record);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub permissions: EntityCounts,
    pub assignments: EntityCounts,
    pub groups: Vec<ResourceGroupReport>,
    pub records: Vec<RecordReport>,
    pub assignment_step: AssignmentStep,
}

impl Default for ReconcileReport {
    fn default() -> Self {
        Self {
            permissions: EntityCounts::default(),
            assignments: EntityCounts::default(),
            groups: Vec::new(),
            records: Vec::new(),
            assignment_step: AssignmentStep::NothingToAssign,
        }
    }
}

impl ReconcileReport {
    pub fn push_permission(&mut self, key: impl Into<String>, outcome: RecordOutcome) {
        self.permissions.record(&outcome);
        self.records
            .push(RecordReport::new(RecordKind::Permission, key, outcome));
    }

    /// Count a whole group's records as skipped-as-existing.
    pub fn skip_group(&mut self, resource: Resource, desired: usize, existing: usize) {
        self.permissions.skipped += desired;
        self.groups.push(ResourceGroupReport {
            resource,
            desired,
            outcome: GroupOutcome::SkippedExisting { existing },
        });
    }

    pub fn push_assignment(&mut self, key: impl Into<String>, outcome: RecordOutcome) {
        self.assignments.record(&outcome);
        self.records
            .push(RecordReport::new(RecordKind::Assignment, key, outcome));
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordReport> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, RecordOutcome::Failed { .. }))
    }
}

/// Full result of [`super::ProvisioningEngine::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisioningReport {
    /// `None` when role bootstrap was not requested.
    pub roles: Option<RoleBootstrapReport>,
    pub catalog: ReconcileReport,
    /// `--force` was requested but is not supported; the run proceeded normally.
    pub force_ignored: bool,
}

impl ProvisioningReport {
    pub fn has_failures(&self) -> bool {
        self.catalog.permissions.failed > 0
            || self.catalog.assignments.failed > 0
            || self.roles.as_ref().is_some_and(|r| r.counts.failed > 0)
    }

    /// Emit counts as structured log fields.
    pub fn log(&self) {
        if let Some(roles) = &self.roles {
            tracing::info!(
                kind = "roles",
                created = roles.counts.created,
                skipped = roles.counts.skipped,
                failed = roles.counts.failed,
                "provisioning summary"
            );
        }
        for (kind, counts) in [
            ("permissions", &self.catalog.permissions),
            ("assignments", &self.catalog.assignments),
        ] {
            tracing::info!(
                kind,
                created = counts.created,
                skipped = counts.skipped,
                failed = counts.failed,
                "provisioning summary"
            );
        }
    }
}

impl fmt::Display for ProvisioningReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.force_ignored {
            writeln!(f, "note: --force is not yet supported and was ignored")?;
        }
        match &self.roles {
            Some(roles) => writeln!(f, "roles:       {}", roles.counts)?,
            None => writeln!(f, "roles:       not requested")?,
        }
        writeln!(f, "permissions: {}", self.catalog.permissions)?;
        writeln!(f, "assignments: {}", self.catalog.assignments)?;
        match &self.catalog.assignment_step {
            AssignmentStep::NothingToAssign => {}
            AssignmentStep::Assigned { identifier, .. } => {
                writeln!(f, "assigned new permissions to {identifier}")?
            }
            AssignmentStep::Skipped { reason } => {
                writeln!(f, "assignment skipped: {reason}")?
            }
        }

        let failures: Vec<&RecordReport> = self
            .roles
            .iter()
            .flat_map(|r| r.records.iter())
            .chain(self.catalog.records.iter())
            .filter(|r| matches!(r.outcome, RecordOutcome::Failed { .. }))
            .collect();
        for record in failures {
            if let RecordOutcome::Failed { reason } = &record.outcome {
                writeln!(f, "failed {:?} {}: {reason}", record.kind, record.key)?;
            }
        }
        Ok(())
    }
}
