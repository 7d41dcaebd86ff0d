//! Role definitions: normalized names, per-role permission sets and the
//! system-role flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wardgate_core::{DomainError, DomainResult, PrincipalId, RoleId};

use crate::{Action, PermissionSet, Resource, ValidationError};

/// Role name, normalized to trimmed uppercase.
///
/// Lookups and uniqueness are always on the normalized form, so `"admin"` and
/// `" ADMIN "` name the same role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleName(String);

impl RoleName {
    pub fn parse(name: &str) -> DomainResult<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("role name must not be empty"));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RoleName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoleName> for String {
    fn from(value: RoleName) -> Self {
        value.0
    }
}

impl core::fmt::Display for RoleName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored role definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: RoleName,
    pub display_name: String,
    pub description: String,
    pub permissions: PermissionSet,
    pub is_active: bool,
    pub is_system_role: bool,
    pub created_by: Option<PrincipalId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn from_new(new: NewRole, id: RoleId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            display_name: new.display_name,
            description: new.description,
            permissions: new.permissions,
            is_active: true,
            is_system_role: new.is_system_role,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Grants of this role as seen by the evaluator. Inactive roles grant nothing.
    pub fn effective_permissions(&self) -> Option<&PermissionSet> {
        self.is_active.then_some(&self.permissions)
    }

    /// System roles may not be renamed or deleted.
    pub fn ensure_mutable(&self) -> DomainResult<()> {
        if self.is_system_role {
            return Err(DomainError::invariant(format!(
                "role {} is a system role",
                self.name
            )));
        }
        Ok(())
    }
}

/// A validated role ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: RoleName,
    pub display_name: String,
    pub description: String,
    pub permissions: PermissionSet,
    pub is_system_role: bool,
    pub created_by: Option<PrincipalId>,
}

/// Raw permission entry of a desired role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPermissionEntry {
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// A desired role as declared by an operator (raw, unvalidated).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<RawPermissionEntry>,
}

impl RoleSpec {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            permissions: Vec::new(),
        }
    }

    pub fn grant(mut self, resource: Resource, actions: &[Action]) -> Self {
        self.permissions.push(RawPermissionEntry {
            resource: resource.as_str().to_string(),
            actions: actions.iter().map(|a| a.as_str().to_string()).collect(),
        });
        self
    }

    /// Validate into a [`NewRole`]. The result is not yet marked as a system
    /// role; the bootstrap routine decides that.
    pub fn validate(&self, index: usize) -> Result<NewRole, ValidationError> {
        let name = RoleName::parse(&self.name)
            .map_err(|_| ValidationError::new(index, &self.name, "name", "is required"))?;

        let mut permissions = PermissionSet::new();
        for (pos, entry) in self.permissions.iter().enumerate() {
            let resource: Resource = entry.resource.parse().map_err(|e| {
                ValidationError::new(
                    index,
                    name.as_str(),
                    "permissions.resource",
                    format!("(entry {pos}) {e}"),
                )
            })?;
            for raw in &entry.actions {
                let action: Action = raw.parse().map_err(|e| {
                    ValidationError::new(
                        index,
                        name.as_str(),
                        "permissions.actions",
                        format!("(entry {pos}) {e}"),
                    )
                })?;
                permissions.grant(resource, action);
            }
        }

        let display_name = match self.display_name.trim() {
            "" => name.as_str().to_string(),
            other => other.to_string(),
        };

        Ok(NewRole {
            name,
            display_name,
            description: self.description.trim().to_string(),
            permissions,
            is_system_role: false,
            created_by: None,
        })
    }
}
