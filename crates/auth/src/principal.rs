//! Directory-side view of a principal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wardgate_core::PrincipalId;

use crate::RoleName;

/// The identity the evaluator authorizes.
///
/// Construction is decoupled from storage and transport: callers derive it
/// from whatever authenticated the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRef {
    pub id: PrincipalId,
    /// Coarse single-role field, if the principal carries one.
    pub role: Option<RoleName>,
}

impl PrincipalRef {
    pub fn new(id: PrincipalId) -> Self {
        Self { id, role: None }
    }

    pub fn with_role(id: PrincipalId, role: RoleName) -> Self {
        Self {
            id,
            role: Some(role),
        }
    }
}

/// What the principal directory exposes about a user.
///
/// Credentials are never part of this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRecord {
    pub id: PrincipalId,
    /// Identifying attribute used for lookups (an email address).
    pub identifier: String,
    pub role: Option<RoleName>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PrincipalRecord {
    pub fn to_principal_ref(&self) -> PrincipalRef {
        PrincipalRef {
            id: self.id,
            role: self.role.clone(),
        }
    }
}
