//! Closed vocabulary of resources and actions.
//!
//! Anything outside these enumerations is a configuration error, never a
//! silent denial.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named subject of access control.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Users,
    Roles,
    Doctors,
    Patients,
    Appointments,
    Payments,
    Invoices,
    Portfolios,
    Reports,
    Settings,
}

/// A named operation on a resource.
///
/// `View` and `Read` come from two vocabularies that coexist in stored data;
/// they are distinct actions and neither implies the other.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Read,
    Create,
    Update,
    Delete,
    Export,
    Approve,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VocabularyError {
    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

impl Resource {
    pub const ALL: [Resource; 10] = [
        Resource::Users,
        Resource::Roles,
        Resource::Doctors,
        Resource::Patients,
        Resource::Appointments,
        Resource::Payments,
        Resource::Invoices,
        Resource::Portfolios,
        Resource::Reports,
        Resource::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Roles => "roles",
            Resource::Doctors => "doctors",
            Resource::Patients => "patients",
            Resource::Appointments => "appointments",
            Resource::Payments => "payments",
            Resource::Invoices => "invoices",
            Resource::Portfolios => "portfolios",
            Resource::Reports => "reports",
            Resource::Settings => "settings",
        }
    }

    /// Human-readable label used when composing permission names.
    pub fn label(&self) -> &'static str {
        match self {
            Resource::Users => "Users",
            Resource::Roles => "Roles",
            Resource::Doctors => "Doctors",
            Resource::Patients => "Patients",
            Resource::Appointments => "Appointments",
            Resource::Payments => "Payments",
            Resource::Invoices => "Invoices",
            Resource::Portfolios => "Portfolios",
            Resource::Reports => "Reports",
            Resource::Settings => "Settings",
        }
    }
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::View,
        Action::Read,
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::Export,
        Action::Approve,
    ];

    /// The four-verb vocabulary used by clinical modules.
    pub const CRUD_VIEW: [Action; 4] = [Action::View, Action::Create, Action::Update, Action::Delete];

    /// The richer vocabulary used by financial modules.
    pub const FINANCIAL: [Action; 6] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Export,
        Action::Approve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Export => "export",
            Action::Approve => "approve",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::View => "View",
            Action::Read => "Read",
            Action::Create => "Create",
            Action::Update => "Update",
            Action::Delete => "Delete",
            Action::Export => "Export",
            Action::Approve => "Approve",
        }
    }
}

impl FromStr for Resource {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| VocabularyError::UnknownResource(s.to_string()))
    }
}

impl FromStr for Action {
    type Err = VocabularyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| VocabularyError::UnknownAction(s.to_string()))
    }
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
