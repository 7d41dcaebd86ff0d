//! Direct principal↔permission grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wardgate_core::{AssignmentId, PermissionId, PrincipalId};

/// A stored assignment row.
///
/// `(principal_id, permission_id)` is unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub principal_id: PrincipalId,
    pub permission_id: PermissionId,
    pub granted_by: Option<PrincipalId>,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    pub fn from_new(new: NewAssignment, id: AssignmentId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            principal_id: new.principal_id,
            permission_id: new.permission_id,
            granted_by: new.granted_by,
            created_at,
        }
    }

    pub fn key(&self) -> (PrincipalId, PermissionId) {
        (self.principal_id, self.permission_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    pub principal_id: PrincipalId,
    pub permission_id: PermissionId,
    pub granted_by: Option<PrincipalId>,
}

impl NewAssignment {
    pub fn key(&self) -> (PrincipalId, PermissionId) {
        (self.principal_id, self.permission_id)
    }
}
