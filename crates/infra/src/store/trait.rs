use async_trait::async_trait;
use thiserror::Error;

use wardgate_auth::{
    AccessSnapshot, Action, Assignment, NewAssignment, NewPermission, NewRole, Permission,
    PermissionSet, Resource, Role, RoleName,
};
use wardgate_core::{PermissionId, PrincipalId};

/// Storage operation error.
///
/// `DuplicateKey` is distinct from every other failure: callers
/// that reconcile desired state treat it as "already exists", never as fatal.
///
/// ## Error Categories
///
/// - **DuplicateKey**: a unique constraint rejected the write (permission name,
///   role name, or assignment pair)
/// - **Connection**: the backend is unreachable or rejected our credentials
/// - **Protected**: the record may not be deleted (system roles)
/// - **Corrupt**: a stored row could not be decoded into the domain model
/// - **Backend**: anything else the backend reported
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("storage unavailable: {0}")]
    Connection(String),

    #[error("protected record: {0}")]
    Protected(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

/// Filter over catalog entries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionFilter {
    pub name: Option<String>,
    pub resource: Option<Resource>,
    pub action: Option<Action>,
}

impl PermissionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn by_resource(resource: Resource) -> Self {
        Self {
            resource: Some(resource),
            ..Self::default()
        }
    }

    pub fn matches(&self, p: &Permission) -> bool {
        self.name.as_ref().is_none_or(|n| *n == p.name)
            && self.resource.is_none_or(|r| r == p.resource)
            && self.action.is_none_or(|a| a == p.action)
    }
}

/// The only mutable attribute of a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionPatch {
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleFilter {
    pub name: Option<RoleName>,
    pub is_system_role: Option<bool>,
    pub is_active: Option<bool>,
}

impl RoleFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_name(name: RoleName) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }

    pub fn matches(&self, r: &Role) -> bool {
        self.name.as_ref().is_none_or(|n| *n == r.name)
            && self.is_system_role.is_none_or(|s| s == r.is_system_role)
            && self.is_active.is_none_or(|a| a == r.is_active)
    }
}

/// Editable role attributes. Names are never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePatch {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<PermissionSet>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentFilter {
    pub principal_id: Option<PrincipalId>,
    pub permission_id: Option<PermissionId>,
}

impl AssignmentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_principal(principal_id: PrincipalId) -> Self {
        Self {
            principal_id: Some(principal_id),
            ..Self::default()
        }
    }

    pub fn by_permission(permission_id: PermissionId) -> Self {
        Self {
            permission_id: Some(permission_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, a: &Assignment) -> bool {
        self.principal_id.is_none_or(|p| p == a.principal_id)
            && self.permission_id.is_none_or(|p| p == a.permission_id)
    }
}

/// Access-control storage boundary.
///
/// The provisioning engine depends only on these operations: unique-constrained
/// insert, find-by-filter, bulk insert, update-many-by-filter, and the
/// delete-by-filter used by cascade cleanup. `close` ends the connection
/// lifecycle; implementations must reject further calls afterwards.
///
/// ## Bulk Insert Semantics
///
/// `insert_permissions` returns one result per input, in input order. A
/// duplicate name fails only that entry. The outer `Err` is reserved for
/// failures that lose the whole batch (connection loss, commit failure).
#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn find_permissions(
        &self,
        filter: &PermissionFilter,
    ) -> Result<Vec<Permission>, StoreError>;

    async fn insert_permission(&self, new: NewPermission) -> Result<Permission, StoreError>;

    async fn insert_permissions(
        &self,
        batch: Vec<NewPermission>,
    ) -> Result<Vec<Result<Permission, StoreError>>, StoreError>;

    async fn update_permissions(
        &self,
        filter: &PermissionFilter,
        patch: &PermissionPatch,
    ) -> Result<u64, StoreError>;

    async fn delete_permissions(&self, filter: &PermissionFilter) -> Result<u64, StoreError>;

    async fn find_roles(&self, filter: &RoleFilter) -> Result<Vec<Role>, StoreError>;

    async fn insert_role(&self, new: NewRole) -> Result<Role, StoreError>;

    async fn update_roles(&self, filter: &RoleFilter, patch: &RolePatch) -> Result<u64, StoreError>;

    /// Delete a custom role. System roles yield `StoreError::Protected`.
    async fn delete_role(&self, name: &RoleName) -> Result<bool, StoreError>;

    async fn find_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Assignment>, StoreError>;

    async fn insert_assignment(&self, new: NewAssignment) -> Result<Assignment, StoreError>;

    async fn delete_assignments(&self, filter: &AssignmentFilter) -> Result<u64, StoreError>;

    /// Point-in-time view for the authorization evaluator.
    async fn snapshot(&self) -> Result<AccessSnapshot, StoreError> {
        let roles = self.find_roles(&RoleFilter::all()).await?;
        let permissions = self.find_permissions(&PermissionFilter::all()).await?;
        let assignments = self.find_assignments(&AssignmentFilter::all()).await?;
        Ok(AccessSnapshot::new(roles, permissions, assignments))
    }

    /// Disconnect. Idempotent.
    async fn close(&self);
}
