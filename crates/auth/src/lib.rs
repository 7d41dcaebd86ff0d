//! `wardgate-auth`: pure access-control model and authorization evaluator.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod assignment;
pub mod authorize;
pub mod grants;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod snapshot;
pub mod vocabulary;

pub use assignment::{Assignment, NewAssignment};
pub use authorize::{
    authorize, explain_authorization, parse_request, AuthorizationExplanation,
    AuthorizationStrategy, AuthzError, DenialKind, DenialReason, GrantSource, PrincipalGrants,
    PrincipalState, RoleGrant,
};
pub use grants::{PermissionEntry, PermissionSet};
pub use permissions::{NewPermission, Permission, PermissionSpec, ValidationError};
pub use principal::{PrincipalRecord, PrincipalRef};
pub use roles::{NewRole, RawPermissionEntry, Role, RoleName, RoleSpec};
pub use snapshot::AccessSnapshot;
pub use vocabulary::{Action, Resource, VocabularyError};

pub use wardgate_core::{AssignmentId, PermissionId, PrincipalId, RoleId};
