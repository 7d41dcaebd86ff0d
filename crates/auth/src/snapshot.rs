//! Point-in-time, read-only view of roles, permissions and assignments.

use std::collections::HashMap;

use wardgate_core::{PermissionId, PrincipalId};

use crate::{
    explain_authorization, parse_request, Assignment, AuthorizationExplanation,
    AuthorizationStrategy, AuthzError, Permission, PermissionSet, PrincipalGrants, PrincipalRef,
    Role, RoleGrant, RoleName,
};

/// Immutable snapshot the evaluator reads at decision time.
///
/// Shares nothing mutable; wrap it in an `Arc` and hand it to as many
/// concurrent callers as needed. Refreshing means building a new snapshot.
#[derive(Debug, Clone, Default)]
pub struct AccessSnapshot {
    roles: HashMap<RoleName, Role>,
    permissions: HashMap<PermissionId, Permission>,
    assigned: HashMap<PrincipalId, Vec<PermissionId>>,
}

impl AccessSnapshot {
    pub fn new(
        roles: impl IntoIterator<Item = Role>,
        permissions: impl IntoIterator<Item = Permission>,
        assignments: impl IntoIterator<Item = Assignment>,
    ) -> Self {
        let roles = roles.into_iter().map(|r| (r.name.clone(), r)).collect();
        let permissions = permissions.into_iter().map(|p| (p.id, p)).collect();

        let mut assigned: HashMap<PrincipalId, Vec<PermissionId>> = HashMap::new();
        for a in assignments {
            assigned.entry(a.principal_id).or_default().push(a.permission_id);
        }

        Self {
            roles,
            permissions,
            assigned,
        }
    }

    /// Resolve both grant sources for a principal.
    ///
    /// Assignments pointing at permissions missing from the snapshot are
    /// ignored.
    pub fn grants_for(&self, principal: &PrincipalRef) -> PrincipalGrants {
        let role = principal.role.as_ref().map(|name| match self.roles.get(name) {
            Some(role) => match role.effective_permissions() {
                Some(set) => RoleGrant::Active(name.clone(), set.clone()),
                None => RoleGrant::Inactive(name.clone()),
            },
            None => RoleGrant::Unknown(name.clone()),
        });

        let assigned: PermissionSet = self
            .assigned
            .get(&principal.id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.permissions.get(id))
            .map(|p| (p.resource, p.action))
            .collect();

        PrincipalGrants { role, assigned }
    }

    pub fn authorize(
        &self,
        principal: &PrincipalRef,
        strategy: AuthorizationStrategy,
        resource: &str,
        action: &str,
    ) -> Result<bool, AuthzError> {
        let (resource, action) = parse_request(resource, action)?;
        let effective = strategy.effective(&self.grants_for(principal));
        Ok(effective.allows(resource, action))
    }

    pub fn explain(
        &self,
        principal: &PrincipalRef,
        strategy: AuthorizationStrategy,
        resource: &str,
        action: &str,
    ) -> Result<AuthorizationExplanation, AuthzError> {
        explain_authorization(
            principal.id,
            &self.grants_for(principal),
            strategy,
            resource,
            action,
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use wardgate_core::{AssignmentId, RoleId};

    use super::*;
    use crate::{Action, NewAssignment, NewPermission, Resource, RoleSpec};

    fn role(name: &str, active: bool, resource: Resource, actions: &[Action]) -> Role {
        let spec = RoleSpec::new(name, "", "").grant(resource, actions);
        let mut role = Role::from_new(spec.validate(0).unwrap(), RoleId::new(), Utc::now());
        role.is_active = active;
        role
    }

    fn permission(resource: Resource, action: Action) -> Permission {
        Permission::from_new(
            NewPermission::standard(resource, action),
            PermissionId::new(),
            Utc::now(),
        )
    }

    fn assign(principal: PrincipalId, permission: &Permission) -> Assignment {
        Assignment::from_new(
            NewAssignment {
                principal_id: principal,
                permission_id: permission.id,
                granted_by: None,
            },
            AssignmentId::new(),
            Utc::now(),
        )
    }

    #[test]
    fn union_combines_role_and_direct_grants() {
        let user = PrincipalId::new();
        let view_doctors = permission(Resource::Doctors, Action::View);
        let snapshot = AccessSnapshot::new(
            [role("cashier", true, Resource::Payments, &[Action::Read])],
            [view_doctors.clone()],
            [assign(user, &view_doctors)],
        );
        let principal = PrincipalRef::with_role(user, RoleName::parse("cashier").unwrap());

        let s = AuthorizationStrategy::Union;
        assert_eq!(snapshot.authorize(&principal, s, "payments", "read"), Ok(true));
        assert_eq!(snapshot.authorize(&principal, s, "doctors", "view"), Ok(true));
        assert_eq!(snapshot.authorize(&principal, s, "doctors", "delete"), Ok(false));

        let r = AuthorizationStrategy::RoleBased;
        assert_eq!(snapshot.authorize(&principal, r, "doctors", "view"), Ok(false));
    }

    #[test]
    fn inactive_and_unknown_roles_grant_nothing() {
        let snapshot = AccessSnapshot::new(
            [role("cashier", false, Resource::Payments, &[Action::Read])],
            Vec::<Permission>::new(),
            Vec::<Assignment>::new(),
        );
        let s = AuthorizationStrategy::RoleBased;

        let inactive =
            PrincipalRef::with_role(PrincipalId::new(), RoleName::parse("cashier").unwrap());
        assert_eq!(snapshot.authorize(&inactive, s, "payments", "read"), Ok(false));

        let unknown =
            PrincipalRef::with_role(PrincipalId::new(), RoleName::parse("ghost").unwrap());
        assert_eq!(
            snapshot.grants_for(&unknown).role,
            Some(RoleGrant::Unknown(RoleName::parse("ghost").unwrap()))
        );
        assert_eq!(snapshot.authorize(&unknown, s, "payments", "read"), Ok(false));
    }

    #[test]
    fn dangling_assignments_are_ignored() {
        let user = PrincipalId::new();
        let removed = permission(Resource::Reports, Action::Export);
        let snapshot = AccessSnapshot::new(
            Vec::<Role>::new(),
            Vec::<Permission>::new(),
            [assign(user, &removed)],
        );

        let grants = snapshot.grants_for(&PrincipalRef::new(user));
        assert!(grants.assigned.is_empty());
    }

    #[test]
    fn snapshot_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AccessSnapshot>();
    }
}
