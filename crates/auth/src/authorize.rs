//! Authorization evaluator and decision explanations.

use serde::Serialize;
use thiserror::Error;

use wardgate_core::PrincipalId;

use crate::{Action, PermissionSet, Resource, RoleName, VocabularyError};

/// Authorization could not be evaluated.
///
/// A denial is `Ok(false)`, never an error. Errors here mean the caller asked
/// about something outside the closed vocabulary, which is a configuration bug.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("authorization misconfigured: {0}")]
    Configuration(#[from] VocabularyError),
}

/// Validate a raw (resource, action) request against the closed vocabulary.
pub fn parse_request(resource: &str, action: &str) -> Result<(Resource, Action), AuthzError> {
    Ok((resource.parse()?, action.parse()?))
}

/// Authorize a raw (resource, action) request against a set of grants.
///
/// - No IO
/// - No panics
/// - No inference (`update` does not imply `read`)
pub fn authorize(grants: &PermissionSet, resource: &str, action: &str) -> Result<bool, AuthzError> {
    let (resource, action) = parse_request(resource, action)?;
    Ok(grants.allows(resource, action))
}

/// How a principal's grants are derived.
///
/// The coarse role field and the fine-grained assignments are independent
/// sources. `Union` grants when either source does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStrategy {
    RoleBased,
    AssignmentBased,
    #[default]
    Union,
}

/// How the principal's coarse role resolved against the role store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleGrant {
    Active(RoleName, PermissionSet),
    Inactive(RoleName),
    Unknown(RoleName),
}

/// Both grant sources of a principal, resolved from a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalGrants {
    pub role: Option<RoleGrant>,
    pub assigned: PermissionSet,
}

impl PrincipalGrants {
    fn role_permissions(&self) -> Option<&PermissionSet> {
        match &self.role {
            Some(RoleGrant::Active(_, set)) => Some(set),
            _ => None,
        }
    }
}

impl AuthorizationStrategy {
    /// Effective grants under this strategy.
    pub fn effective(&self, grants: &PrincipalGrants) -> PermissionSet {
        let mut out = PermissionSet::new();
        if self.uses_role() {
            if let Some(set) = grants.role_permissions() {
                out.merge(set);
            }
        }
        if self.uses_assignments() {
            out.merge(&grants.assigned);
        }
        out
    }

    fn uses_role(&self) -> bool {
        matches!(self, Self::RoleBased | Self::Union)
    }

    fn uses_assignments(&self) -> bool {
        matches!(self, Self::AssignmentBased | Self::Union)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub resource: Resource,
    pub action: Action,
    pub strategy: AuthorizationStrategy,
    pub granted: bool,
    /// Human-readable reason for the decision.
    pub reason: String,
    /// Which sources carried the grant, if any.
    pub granted_by: Vec<GrantSource>,
    pub principal: PrincipalState,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    Role,
    Assignment,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub principal_id: PrincipalId,
    pub role: Option<String>,
    pub role_active: Option<bool>,
    /// Effective grants as `resource:action`, sorted.
    pub effective_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    UnknownRole,
    RoleInactive,
    MissingPermission,
}

/// Explain why a request would be allowed or denied.
///
/// Answers "why was this request denied?" for a principal whose grants were
/// already resolved (see [`crate::AccessSnapshot::grants_for`]).
pub fn explain_authorization(
    principal_id: PrincipalId,
    grants: &PrincipalGrants,
    strategy: AuthorizationStrategy,
    resource: &str,
    action: &str,
) -> Result<AuthorizationExplanation, AuthzError> {
    let (resource, action) = parse_request(resource, action)?;
    let effective = strategy.effective(grants);

    let mut granted_by = Vec::new();
    if strategy.uses_role()
        && grants
            .role_permissions()
            .is_some_and(|set| set.allows(resource, action))
    {
        granted_by.push(GrantSource::Role);
    }
    if strategy.uses_assignments() && grants.assigned.allows(resource, action) {
        granted_by.push(GrantSource::Assignment);
    }

    let (role, role_active) = match &grants.role {
        Some(RoleGrant::Active(name, _)) => (Some(name.to_string()), Some(true)),
        Some(RoleGrant::Inactive(name)) => (Some(name.to_string()), Some(false)),
        Some(RoleGrant::Unknown(name)) => (Some(name.to_string()), None),
        None => (None, None),
    };

    let principal = PrincipalState {
        principal_id,
        role,
        role_active,
        effective_permissions: effective
            .pairs()
            .map(|(r, a)| format!("{r}:{a}"))
            .collect(),
    };

    let required = format!("{resource}:{action}");
    let granted = !granted_by.is_empty();

    if granted {
        let sources: Vec<&str> = granted_by
            .iter()
            .map(|s| match s {
                GrantSource::Role => "role",
                GrantSource::Assignment => "direct assignment",
            })
            .collect();
        return Ok(AuthorizationExplanation {
            resource,
            action,
            strategy,
            granted,
            reason: format!("'{required}' granted by {}", sources.join(" and ")),
            granted_by,
            principal,
            denial_reason: None,
        });
    }

    let denial = match (&grants.role, strategy.uses_role()) {
        (Some(RoleGrant::Unknown(name)), true) => DenialReason {
            kind: DenialKind::UnknownRole,
            message: format!("Principal's role {name} does not exist"),
            suggestions: vec![
                format!("Create role {name} or correct the principal's role field"),
                format!("Assign the '{required}' permission directly to the principal"),
            ],
        },
        (Some(RoleGrant::Inactive(name)), true) => DenialReason {
            kind: DenialKind::RoleInactive,
            message: format!("Principal's role {name} is deactivated"),
            suggestions: vec![
                format!("Reactivate role {name}"),
                format!("Assign the '{required}' permission directly to the principal"),
            ],
        },
        _ => {
            let mut suggestions = Vec::new();
            if strategy.uses_role() {
                suggestions.push(format!("Grant '{required}' to the principal's role"));
            }
            if strategy.uses_assignments() {
                suggestions.push(format!(
                    "Assign a permission for '{required}' directly to the principal"
                ));
            }
            DenialReason {
                kind: DenialKind::MissingPermission,
                message: format!("Missing required permission: '{required}'"),
                suggestions,
            }
        }
    };

    Ok(AuthorizationExplanation {
        resource,
        action,
        strategy,
        granted,
        reason: format!(
            "Principal does not have '{required}'. Current permissions: {:?}",
            principal.effective_permissions
        ),
        granted_by,
        principal,
        denial_reason: Some(denial),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn payments_reader() -> PermissionSet {
        PermissionSet::new().with(Resource::Payments, [Action::Read])
    }

    fn admin() -> RoleName {
        RoleName::parse("ADMIN").unwrap()
    }

    #[test]
    fn payments_read_is_not_payments_approve() {
        let grants = payments_reader();
        assert_eq!(authorize(&grants, "payments", "approve"), Ok(false));
        assert_eq!(authorize(&grants, "payments", "read"), Ok(true));
    }

    #[test]
    fn no_implied_actions() {
        let grants = PermissionSet::new().with(Resource::Doctors, [Action::Update]);
        assert_eq!(authorize(&grants, "doctors", "view"), Ok(false));
        assert_eq!(authorize(&grants, "doctors", "read"), Ok(false));
    }

    #[test]
    fn unknown_vocabulary_is_an_error_not_a_denial() {
        let grants = payments_reader();
        assert_eq!(
            authorize(&grants, "wallets", "read"),
            Err(AuthzError::Configuration(VocabularyError::UnknownResource(
                "wallets".to_string()
            )))
        );
        assert_eq!(
            authorize(&grants, "payments", "refund"),
            Err(AuthzError::Configuration(VocabularyError::UnknownAction(
                "refund".to_string()
            )))
        );
    }

    #[test]
    fn strategies_select_sources() {
        let grants = PrincipalGrants {
            role: Some(RoleGrant::Active(admin(), payments_reader())),
            assigned: PermissionSet::new().with(Resource::Doctors, [Action::View]),
        };

        let role_only = AuthorizationStrategy::RoleBased.effective(&grants);
        assert!(role_only.allows(Resource::Payments, Action::Read));
        assert!(!role_only.allows(Resource::Doctors, Action::View));

        let direct_only = AuthorizationStrategy::AssignmentBased.effective(&grants);
        assert!(!direct_only.allows(Resource::Payments, Action::Read));
        assert!(direct_only.allows(Resource::Doctors, Action::View));

        let union = AuthorizationStrategy::Union.effective(&grants);
        assert!(union.allows(Resource::Payments, Action::Read));
        assert!(union.allows(Resource::Doctors, Action::View));
    }

    #[test]
    fn explanation_reports_inactive_role() {
        let grants = PrincipalGrants {
            role: Some(RoleGrant::Inactive(admin())),
            assigned: PermissionSet::new(),
        };
        let explanation = explain_authorization(
            PrincipalId::new(),
            &grants,
            AuthorizationStrategy::Union,
            "payments",
            "read",
        )
        .unwrap();

        assert!(!explanation.granted);
        assert_eq!(explanation.principal.role_active, Some(false));
        let denial = explanation.denial_reason.unwrap();
        assert_eq!(denial.kind, DenialKind::RoleInactive);
    }

    #[test]
    fn explanation_lists_every_granting_source() {
        let grants = PrincipalGrants {
            role: Some(RoleGrant::Active(admin(), payments_reader())),
            assigned: payments_reader(),
        };
        let explanation = explain_authorization(
            PrincipalId::new(),
            &grants,
            AuthorizationStrategy::Union,
            "payments",
            "read",
        )
        .unwrap();

        assert!(explanation.granted);
        assert_eq!(
            explanation.granted_by,
            vec![GrantSource::Role, GrantSource::Assignment]
        );
        assert_eq!(explanation.principal.effective_permissions, vec!["payments:read"]);
    }

    fn arb_resource() -> impl Strategy<Value = Resource> {
        proptest::sample::select(Resource::ALL.to_vec())
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        proptest::sample::select(Action::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn authorize_is_exact_membership(
            pairs in proptest::collection::vec((arb_resource(), arb_action()), 0..24),
            resource in arb_resource(),
            action in arb_action(),
        ) {
            let grants: PermissionSet = pairs.iter().copied().collect();
            let expected = pairs.iter().any(|(r, a)| *r == resource && *a == action);
            prop_assert_eq!(
                authorize(&grants, resource.as_str(), action.as_str()),
                Ok(expected)
            );
            if !pairs.iter().any(|(r, _)| *r == resource) {
                prop_assert_eq!(grants.allows(resource, action), false);
            }
        }
    }
}
