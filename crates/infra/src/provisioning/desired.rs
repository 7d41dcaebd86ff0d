//! Desired access-control state: the built-in catalog and operator-supplied
//! JSON files of the same shape.
//!
//! ```json
//! {
//!   "permissions": [
//!     { "name": "View Doctors", "description": "Can view doctors", "resource": "doctors", "action": "view" }
//!   ],
//!   "roles": [
//!     { "name": "DOCTOR", "displayName": "Doctor", "permissions": [{ "resource": "patients", "actions": ["view"] }] }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use wardgate_auth::{Action, NewPermission, PermissionSpec, Resource, RoleSpec};

#[derive(Debug, Error)]
pub enum DesiredStateError {
    #[error("failed to read desired state from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid desired state JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Raw desired state. Records are validated by the engine, one at a time, so a
/// single bad record never rejects the whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    #[serde(default)]
    pub permissions: Vec<PermissionSpec>,
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
}

const CLINICAL: [Resource; 6] = [
    Resource::Users,
    Resource::Roles,
    Resource::Doctors,
    Resource::Patients,
    Resource::Appointments,
    Resource::Settings,
];

const FINANCIAL: [Resource; 4] = [
    Resource::Payments,
    Resource::Invoices,
    Resource::Portfolios,
    Resource::Reports,
];

impl DesiredState {
    /// The catalog and system roles every deployment starts from.
    ///
    /// Administrative and clinical modules get view/create/update/delete;
    /// financial modules get create/read/update/delete/export/approve.
    pub fn builtin() -> Self {
        let mut permissions: Vec<PermissionSpec> = Vec::new();
        for resource in CLINICAL {
            for action in Action::CRUD_VIEW {
                permissions.push(NewPermission::standard(resource, action).into());
            }
        }
        for resource in FINANCIAL {
            for action in Action::FINANCIAL {
                permissions.push(NewPermission::standard(resource, action).into());
            }
        }

        let admin = Resource::ALL.iter().fold(
            RoleSpec::new("ADMIN", "Administrator", "Full access to every module"),
            |role, &resource| {
                let actions: &[Action] = if FINANCIAL.contains(&resource) {
                    &Action::FINANCIAL
                } else {
                    &Action::CRUD_VIEW
                };
                role.grant(resource, actions)
            },
        );

        let doctor = RoleSpec::new("DOCTOR", "Doctor", "Clinical staff")
            .grant(Resource::Patients, &[Action::View, Action::Create, Action::Update])
            .grant(Resource::Appointments, &[Action::View, Action::Update])
            .grant(Resource::Doctors, &[Action::View]);

        let accountant = RoleSpec::new("ACCOUNTANT", "Accountant", "Finance and billing")
            .grant(Resource::Payments, &Action::FINANCIAL)
            .grant(Resource::Invoices, &Action::FINANCIAL)
            .grant(Resource::Portfolios, &[Action::Read, Action::Export])
            .grant(Resource::Reports, &[Action::Read, Action::Export]);

        let receptionist = RoleSpec::new("RECEPTIONIST", "Receptionist", "Front desk")
            .grant(Resource::Patients, &[Action::View, Action::Create, Action::Update])
            .grant(Resource::Appointments, &Action::CRUD_VIEW)
            .grant(Resource::Doctors, &[Action::View])
            .grant(Resource::Payments, &[Action::Create, Action::Read]);

        Self {
            permissions,
            roles: vec![admin, doctor, accountant, receptionist],
        }
    }

    pub fn from_json(json: &str) -> Result<Self, DesiredStateError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DesiredStateError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| DesiredStateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn builtin_catalog_is_valid_and_uniquely_named() {
        let desired = DesiredState::builtin();
        assert_eq!(desired.permissions.len(), 6 * 4 + 4 * 6);

        let mut names = HashSet::new();
        for (i, spec) in desired.permissions.iter().enumerate() {
            let new = spec.validate(i).unwrap();
            assert!(names.insert(new.name), "duplicate name in builtin catalog");
        }
    }

    #[test]
    fn builtin_roles_validate() {
        let desired = DesiredState::builtin();
        let names: Vec<String> = desired
            .roles
            .iter()
            .enumerate()
            .map(|(i, r)| r.validate(i).unwrap().name.to_string())
            .collect();
        assert_eq!(names, ["ADMIN", "DOCTOR", "ACCOUNTANT", "RECEPTIONIST"]);

        let admin = desired.roles[0].validate(0).unwrap();
        assert!(admin.permissions.allows(Resource::Payments, Action::Approve));
        assert!(admin.permissions.allows(Resource::Settings, Action::Delete));
        assert!(!admin.permissions.allows(Resource::Settings, Action::Approve));
    }

    #[test]
    fn json_fields_default_when_missing() {
        let desired = DesiredState::from_json(
            r#"{ "permissions": [{ "name": "View Doctors", "resource": "doctors", "action": "view" }] }"#,
        )
        .unwrap();
        assert_eq!(desired.permissions[0].description, "");
        assert!(desired.roles.is_empty());
    }

    #[test]
    fn role_specs_use_camel_case() {
        let desired = DesiredState::from_json(
            r#"{ "roles": [{ "name": "nurse", "displayName": "Nurse",
                 "permissions": [{ "resource": "patients", "actions": ["view"] }] }] }"#,
        )
        .unwrap();
        let nurse = desired.roles[0].validate(0).unwrap();
        assert_eq!(nurse.name.as_str(), "NURSE");
        assert_eq!(nurse.display_name, "Nurse");
        assert!(nurse.permissions.allows(Resource::Patients, Action::View));
    }

    #[test]
    fn unreadable_file_is_an_io_error() {
        let err = DesiredState::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, DesiredStateError::Io { .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = DesiredState::from_json("{ not json").unwrap_err();
        assert!(matches!(err, DesiredStateError::Parse(_)));
    }
}
