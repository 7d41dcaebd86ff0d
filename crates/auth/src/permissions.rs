//! Permission catalog records and desired-permission validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wardgate_core::PermissionId;

use crate::{Action, Resource};

/// A stored catalog entry: a named, uniquely identified (resource, action) grant.
///
/// `name` is globally unique. The same (resource, action) pair may appear under
/// several names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub description: String,
    pub resource: Resource,
    pub action: Action,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn from_new(new: NewPermission, id: PermissionId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            description: new.description,
            resource: new.resource,
            action: new.action,
            created_at,
        }
    }
}

/// A validated permission ready to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPermission {
    pub name: String,
    pub description: String,
    pub resource: Resource,
    pub action: Action,
}

impl NewPermission {
    /// Build a permission named after its action and resource ("View Doctors").
    pub fn standard(resource: Resource, action: Action) -> Self {
        Self {
            name: format!("{} {}", action.label(), resource.label()),
            description: format!("Can {} {}", action.as_str(), resource.as_str()),
            resource,
            action,
        }
    }
}

/// A desired permission as declared by an operator (raw, unvalidated).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub action: String,
}

/// A desired record failed validation.
///
/// Identifies the record by its position in the desired list (and its name when
/// one was given) plus the offending field.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("record #{index}{}: field `{field}` {reason}", label(.name))]
pub struct ValidationError {
    pub index: usize,
    pub name: Option<String>,
    pub field: &'static str,
    pub reason: String,
}

fn label(name: &Option<String>) -> String {
    match name {
        Some(n) => format!(" ('{n}')"),
        None => String::new(),
    }
}

impl ValidationError {
    pub fn new(index: usize, name: &str, field: &'static str, reason: impl Into<String>) -> Self {
        let name = name.trim();
        Self {
            index,
            name: (!name.is_empty()).then(|| name.to_string()),
            field,
            reason: reason.into(),
        }
    }
}

impl PermissionSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Check required fields and the closed vocabulary.
    ///
    /// `index` is the record's position in the desired list and is carried into
    /// the error so the operator can find it.
    pub fn validate(&self, index: usize) -> Result<NewPermission, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::new(index, name, "name", "is required"));
        }
        if self.resource.trim().is_empty() {
            return Err(ValidationError::new(index, name, "resource", "is required"));
        }
        if self.action.trim().is_empty() {
            return Err(ValidationError::new(index, name, "action", "is required"));
        }

        let resource: Resource = self
            .resource
            .parse()
            .map_err(|e| ValidationError::new(index, name, "resource", format!("{e}")))?;
        let action: Action = self
            .action
            .parse()
            .map_err(|e| ValidationError::new(index, name, "action", format!("{e}")))?;

        Ok(NewPermission {
            name: name.to_string(),
            description: self.description.trim().to_string(),
            resource,
            action,
        })
    }
}

impl From<NewPermission> for PermissionSpec {
    fn from(value: NewPermission) -> Self {
        Self {
            name: value.name,
            description: value.description,
            resource: value.resource.as_str().to_string(),
            action: value.action.as_str().to_string(),
        }
    }
}
