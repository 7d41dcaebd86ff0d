//! Integration tests for the provisioning pipeline.
//!
//! Tests: DesiredState → ProvisioningEngine → AccessStore → AccessSnapshot
//!
//! Verifies:
//! - Reconciliation is idempotent and never double-grants
//! - Existing roles are never overwritten by bootstrap
//! - Missing collaborators and invalid records degrade to reported outcomes

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use async_trait::async_trait;

    use wardgate_auth::{
        Action, Assignment, AuthorizationStrategy, NewAssignment, NewPermission, NewRole,
        Permission, PermissionSpec, PrincipalRecord, PrincipalRef, Resource, Role, RoleName,
        RoleSpec,
    };
    use wardgate_core::{PrincipalId, RoleId};

    use crate::directory::InMemoryPrincipalDirectory;
    use crate::provisioning::{
        AssignmentSkipReason, AssignmentStep, DesiredState, EntityCounts, GroupOutcome,
        ProvisioningEngine, ProvisioningOptions, RecordKind, RecordOutcome,
    };
    use crate::store::{
        AccessStore, AssignmentFilter, InMemoryAccessStore, PermissionFilter, PermissionPatch,
        RoleFilter, RolePatch, StoreError,
    };

    const ADMIN_EMAIL: &str = "admin@clinic.test";

    fn principal(email: &str, age_days: i64) -> PrincipalRecord {
        PrincipalRecord {
            id: PrincipalId::new(),
            identifier: email.to_string(),
            role: None,
            is_active: true,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    fn options() -> ProvisioningOptions {
        ProvisioningOptions {
            admin_identifier: Some(ADMIN_EMAIL.to_string()),
            ..ProvisioningOptions::default()
        }
    }

    fn doctors_desired() -> Vec<PermissionSpec> {
        vec![
            PermissionSpec::new("View Doctors", "Can view doctors", "doctors", "view"),
            PermissionSpec::new("Create Doctors", "Can create doctors", "doctors", "create"),
        ]
    }

    async fn permission_names(store: &InMemoryAccessStore) -> Vec<String> {
        let mut names: Vec<String> = store
            .find_permissions(&PermissionFilter::all())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn doctors_scenario_creates_and_assigns_then_skips() {
        let store = InMemoryAccessStore::new();
        let admin = principal(ADMIN_EMAIL, 5);
        let directory = InMemoryPrincipalDirectory::with([admin.clone()]);
        let engine = ProvisioningEngine::new(&store, &directory, options());

        let first = engine.reconcile(&doctors_desired()).await.unwrap();
        assert_eq!(
            first.permissions,
            EntityCounts {
                created: 2,
                skipped: 0,
                failed: 0
            }
        );
        assert_eq!(first.assignments.created, 2);
        assert_eq!(
            first.assignment_step,
            AssignmentStep::Assigned {
                principal_id: admin.id,
                identifier: ADMIN_EMAIL.to_string(),
            }
        );

        let second = engine.reconcile(&doctors_desired()).await.unwrap();
        assert_eq!(second.permissions.created, 0);
        assert_eq!(second.permissions.skipped, 2);
        assert_eq!(second.assignment_step, AssignmentStep::NothingToAssign);
        assert!(matches!(
            second.groups[0].outcome,
            GroupOutcome::SkippedExisting { existing: 2 }
        ));

        let assignments = store
            .find_assignments(&AssignmentFilter::by_principal(admin.id))
            .await
            .unwrap();
        assert_eq!(assignments.len(), 2);
    }

    #[tokio::test]
    async fn full_run_is_idempotent() {
        let store = InMemoryAccessStore::new();
        let directory = InMemoryPrincipalDirectory::with([principal(ADMIN_EMAIL, 1)]);
        let engine = ProvisioningEngine::new(&store, &directory, options());
        let desired = DesiredState::builtin();

        let first = engine.run(&desired).await.unwrap();
        let names_after_first = permission_names(&store).await;
        let roles_after_first = store.find_roles(&RoleFilter::all()).await.unwrap();
        let assignments_after_first = store.find_assignments(&AssignmentFilter::all()).await.unwrap();

        let second = engine.run(&desired).await.unwrap();

        assert_eq!(first.catalog.permissions.created, desired.permissions.len());
        assert_eq!(second.catalog.permissions.created, 0);
        assert_eq!(second.roles.as_ref().unwrap().counts.created, 0);
        assert_eq!(second.roles.as_ref().unwrap().counts.skipped, desired.roles.len());

        assert_eq!(permission_names(&store).await, names_after_first);
        assert_eq!(store.find_roles(&RoleFilter::all()).await.unwrap(), roles_after_first);
        assert_eq!(
            store.find_assignments(&AssignmentFilter::all()).await.unwrap(),
            assignments_after_first
        );
    }

    #[tokio::test]
    async fn no_principal_still_creates_catalog() {
        let store = InMemoryAccessStore::new();
        let directory = InMemoryPrincipalDirectory::new();
        let engine = ProvisioningEngine::new(&store, &directory, options());

        let report = engine.reconcile(&doctors_desired()).await.unwrap();

        assert_eq!(report.permissions.created, 2);
        assert_eq!(
            report.assignment_step,
            AssignmentStep::Skipped {
                reason: AssignmentSkipReason::NoPrincipal
            }
        );
        assert!(store.find_assignments(&AssignmentFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_earliest_active_principal() {
        let store = InMemoryAccessStore::new();
        let oldest = principal("first@clinic.test", 30);
        let directory =
            InMemoryPrincipalDirectory::with([principal("second@clinic.test", 3), oldest.clone()]);
        let engine = ProvisioningEngine::new(&store, &directory, options());

        let report = engine.reconcile(&doctors_desired()).await.unwrap();

        assert_eq!(
            report.assignment_step,
            AssignmentStep::Assigned {
                principal_id: oldest.id,
                identifier: "first@clinic.test".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn bootstrap_never_overwrites_existing_role() {
        let reduced = RoleSpec::new("admin", "Admin (custom)", "trimmed down")
            .grant(Resource::Reports, &[Action::Read])
            .validate(0)
            .unwrap();
        let existing = Role::from_new(reduced, RoleId::new(), Utc::now());
        let store = InMemoryAccessStore::new().with_role(existing.clone());
        let directory = InMemoryPrincipalDirectory::new();
        let engine = ProvisioningEngine::new(&store, &directory, options());

        let report = engine
            .ensure_system_roles(&DesiredState::builtin().roles)
            .await
            .unwrap();

        assert_eq!(report.counts.skipped, 1);
        assert_eq!(report.counts.created, 3);
        let admin = store
            .find_roles(&RoleFilter::by_name(RoleName::parse("ADMIN").unwrap()))
            .await
            .unwrap();
        assert_eq!(admin, vec![existing]);

        let doctor = store
            .find_roles(&RoleFilter::by_name(RoleName::parse("DOCTOR").unwrap()))
            .await
            .unwrap();
        assert!(doctor[0].is_system_role);
        assert!(doctor[0].is_active);
        assert_eq!(doctor[0].created_by, None);
    }

    #[tokio::test]
    async fn actor_is_recorded_on_roles_and_assignments() {
        let store = InMemoryAccessStore::new();
        let directory = InMemoryPrincipalDirectory::with([principal(ADMIN_EMAIL, 1)]);
        let actor = PrincipalId::new();
        let engine = ProvisioningEngine::new(
            &store,
            &directory,
            ProvisioningOptions {
                actor: Some(actor),
                ..options()
            },
        );

        engine
            .ensure_system_roles(&[RoleSpec::new("nurse", "Nurse", "")])
            .await
            .unwrap();
        engine.reconcile(&doctors_desired()).await.unwrap();

        let roles = store.find_roles(&RoleFilter::all()).await.unwrap();
        assert_eq!(roles[0].created_by, Some(actor));
        let assignments = store.find_assignments(&AssignmentFilter::all()).await.unwrap();
        assert!(assignments.iter().all(|a| a.granted_by == Some(actor)));
    }

    #[tokio::test]
    async fn assignment_is_not_duplicated() {
        let store = InMemoryAccessStore::new();
        let admin = principal(ADMIN_EMAIL, 1);
        let directory = InMemoryPrincipalDirectory::with([admin.clone()]);
        let engine = ProvisioningEngine::new(&store, &directory, options());

        engine.reconcile(&doctors_desired()).await.unwrap();
        let view = store
            .find_permissions(&PermissionFilter::by_name("View Doctors"))
            .await
            .unwrap()
            .remove(0);

        let again = store
            .insert_assignment(NewAssignment {
                principal_id: admin.id,
                permission_id: view.id,
                granted_by: None,
            })
            .await;
        assert!(again.unwrap_err().is_duplicate_key());

        let rows = store
            .find_assignments(&AssignmentFilter::by_permission(view.id))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    /// Store that loses every role and assignment insert to a concurrent
    /// writer: the row ends up stored, but the caller sees a duplicate key.
    struct ConcurrentWriterStore {
        inner: InMemoryAccessStore,
    }

    #[async_trait]
    impl AccessStore for ConcurrentWriterStore {
        async fn find_permissions(
            &self,
            filter: &PermissionFilter,
        ) -> Result<Vec<Permission>, StoreError> {
            self.inner.find_permissions(filter).await
        }

        async fn insert_permission(&self, new: NewPermission) -> Result<Permission, StoreError> {
            self.inner.insert_permission(new).await
        }

        async fn insert_permissions(
            &self,
            batch: Vec<NewPermission>,
        ) -> Result<Vec<Result<Permission, StoreError>>, StoreError> {
            self.inner.insert_permissions(batch).await
        }

        async fn update_permissions(
            &self,
            filter: &PermissionFilter,
            patch: &PermissionPatch,
        ) -> Result<u64, StoreError> {
            self.inner.update_permissions(filter, patch).await
        }

        async fn delete_permissions(&self, filter: &PermissionFilter) -> Result<u64, StoreError> {
            self.inner.delete_permissions(filter).await
        }

        async fn find_roles(&self, filter: &RoleFilter) -> Result<Vec<Role>, StoreError> {
            self.inner.find_roles(filter).await
        }

        async fn insert_role(&self, new: NewRole) -> Result<Role, StoreError> {
            let name = new.name.clone();
            self.inner.insert_role(new).await?;
            Err(StoreError::DuplicateKey(format!("role name '{name}'")))
        }

        async fn update_roles(
            &self,
            filter: &RoleFilter,
            patch: &RolePatch,
        ) -> Result<u64, StoreError> {
            self.inner.update_roles(filter, patch).await
        }

        async fn delete_role(&self, name: &RoleName) -> Result<bool, StoreError> {
            self.inner.delete_role(name).await
        }

        async fn find_assignments(
            &self,
            filter: &AssignmentFilter,
        ) -> Result<Vec<Assignment>, StoreError> {
            self.inner.find_assignments(filter).await
        }

        async fn insert_assignment(&self, new: NewAssignment) -> Result<Assignment, StoreError> {
            self.inner.insert_assignment(new.clone()).await?;
            self.inner.insert_assignment(new).await
        }

        async fn delete_assignments(&self, filter: &AssignmentFilter) -> Result<u64, StoreError> {
            self.inner.delete_assignments(filter).await
        }

        async fn close(&self) {
            self.inner.close().await;
        }
    }

    #[tokio::test]
    async fn concurrent_inserts_count_as_existing() {
        let store = ConcurrentWriterStore {
            inner: InMemoryAccessStore::new(),
        };
        let admin = principal(ADMIN_EMAIL, 1);
        let directory = InMemoryPrincipalDirectory::with([admin.clone()]);
        let engine = ProvisioningEngine::new(&store, &directory, options());

        let roles = engine
            .ensure_system_roles(&[RoleSpec::new("nurse", "Nurse", "Ward staff")])
            .await
            .unwrap();
        assert_eq!(
            roles.counts,
            EntityCounts {
                created: 0,
                skipped: 1,
                failed: 0
            }
        );

        let report = engine.reconcile(&doctors_desired()).await.unwrap();
        assert_eq!(report.permissions.created, 2);
        assert_eq!(
            report.assignments,
            EntityCounts {
                created: 0,
                skipped: 2,
                failed: 0
            }
        );
        let assignment_outcomes: Vec<&RecordOutcome> = report
            .records
            .iter()
            .filter(|r| r.kind == RecordKind::Assignment)
            .map(|r| &r.outcome)
            .collect();
        assert_eq!(assignment_outcomes.len(), 2);
        assert!(assignment_outcomes
            .iter()
            .all(|o| **o == RecordOutcome::AlreadyExists));
        assert!(matches!(
            report.assignment_step,
            AssignmentStep::Assigned { principal_id, .. } if principal_id == admin.id
        ));

        let rows = store
            .find_assignments(&AssignmentFilter::by_principal(admin.id))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn invalid_records_are_reported_and_the_rest_proceed() {
        let store = InMemoryAccessStore::new();
        let directory = InMemoryPrincipalDirectory::new();
        let engine = ProvisioningEngine::new(&store, &directory, options());

        let desired = vec![
            PermissionSpec::new("Read Payments", "", "payments", "read"),
            PermissionSpec::new("Fly Payments", "", "payments", "fly"),
            PermissionSpec::new("", "", "wallets", "read"),
        ];
        let report = engine.reconcile(&desired).await.unwrap();

        assert_eq!(report.permissions.created, 1);
        assert_eq!(report.permissions.failed, 2);
        let failed: Vec<&str> = report.failures().map(|r| r.key.as_str()).collect();
        assert_eq!(failed, vec!["Fly Payments", "#2"]);
        match &report.failures().next().unwrap().outcome {
            RecordOutcome::Failed { reason } => assert!(reason.contains("field `action`")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn name_collision_across_groups_counts_as_existing() {
        let store = InMemoryAccessStore::new();
        let directory = InMemoryPrincipalDirectory::new();
        let engine = ProvisioningEngine::new(&store, &directory, options());

        let desired = vec![
            PermissionSpec::new("Export", "", "reports", "export"),
            PermissionSpec::new("Export", "", "portfolios", "export"),
            PermissionSpec::new("Read Portfolios", "", "portfolios", "read"),
        ];
        let report = engine.reconcile(&desired).await.unwrap();

        assert_eq!(
            report.permissions,
            EntityCounts {
                created: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(
            permission_names(&store).await,
            vec!["Export".to_string(), "Read Portfolios".to_string()]
        );
    }

    #[tokio::test]
    async fn seeded_resource_is_not_backfilled() {
        let store = InMemoryAccessStore::new();
        let directory = InMemoryPrincipalDirectory::new();
        let engine = ProvisioningEngine::new(&store, &directory, options());

        engine.reconcile(&doctors_desired()).await.unwrap();
        engine.remove_permission("Create Doctors").await.unwrap();

        let report = engine.reconcile(&doctors_desired()).await.unwrap();
        assert_eq!(report.permissions.created, 0);
        assert_eq!(permission_names(&store).await, vec!["View Doctors".to_string()]);
    }

    #[tokio::test]
    async fn force_is_accepted_but_ignored() {
        let store = InMemoryAccessStore::new();
        let directory = InMemoryPrincipalDirectory::new();
        let engine = ProvisioningEngine::new(
            &store,
            &directory,
            ProvisioningOptions {
                force: true,
                skip_roles: true,
                ..options()
            },
        );
        let desired = DesiredState {
            permissions: doctors_desired(),
            roles: Vec::new(),
        };

        engine.run(&desired).await.unwrap();
        let report = engine.run(&desired).await.unwrap();

        assert!(report.force_ignored);
        assert!(report.roles.is_none());
        assert_eq!(report.catalog.permissions.created, 0);
        assert_eq!(permission_names(&store).await.len(), 2);
    }

    #[tokio::test]
    async fn cascade_cleanup_removes_dangling_assignments() {
        let store = InMemoryAccessStore::new();
        let admin = principal(ADMIN_EMAIL, 1);
        let directory = InMemoryPrincipalDirectory::with([admin.clone()]);
        let engine = ProvisioningEngine::new(&store, &directory, options());
        engine.reconcile(&doctors_desired()).await.unwrap();

        let cascade = engine.remove_permission("View Doctors").await.unwrap().unwrap();
        assert_eq!(cascade.assignments_removed, 1);
        assert_eq!(cascade.permissions_removed, 1);
        assert!(engine.remove_permission("View Doctors").await.unwrap().is_none());

        assert_eq!(engine.remove_principal_assignments(admin.id).await.unwrap(), 1);
        assert!(store.find_assignments(&AssignmentFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_store_aborts_the_run() {
        let store = InMemoryAccessStore::new();
        let directory = InMemoryPrincipalDirectory::new();
        let engine = ProvisioningEngine::new(&store, &directory, options());
        store.close().await;

        let err = engine.run(&DesiredState::builtin()).await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn provisioned_state_authorizes_exact_pairs() {
        let store = InMemoryAccessStore::new();
        let admin = principal(ADMIN_EMAIL, 1);
        let directory = InMemoryPrincipalDirectory::with([admin.clone()]);
        let engine = ProvisioningEngine::new(&store, &directory, options());

        engine
            .run(&DesiredState {
                permissions: vec![PermissionSpec::new("Read Payments", "", "payments", "read")],
                roles: vec![RoleSpec::new("cashier", "Cashier", "")
                    .grant(Resource::Payments, &[Action::Read])],
            })
            .await
            .unwrap();

        let snapshot = store.snapshot().await.unwrap();
        let strategy = AuthorizationStrategy::default();

        let direct = PrincipalRef::new(admin.id);
        assert_eq!(snapshot.authorize(&direct, strategy, "payments", "read"), Ok(true));
        assert_eq!(snapshot.authorize(&direct, strategy, "payments", "approve"), Ok(false));

        let cashier = PrincipalRef::with_role(PrincipalId::new(), RoleName::parse("CASHIER").unwrap());
        assert_eq!(snapshot.authorize(&cashier, strategy, "payments", "read"), Ok(true));
        assert!(snapshot.authorize(&cashier, strategy, "payments", "refund").is_err());
    }
}
