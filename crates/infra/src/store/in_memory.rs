use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use wardgate_auth::{
    Assignment, NewAssignment, NewPermission, NewRole, Permission, Role, RoleName,
};
use wardgate_core::{AssignmentId, PermissionId, RoleId};

use super::r#trait::{
    AccessStore, AssignmentFilter, PermissionFilter, PermissionPatch, RoleFilter, RolePatch,
    StoreError,
};

#[derive(Debug, Default)]
struct Tables {
    permissions: Vec<Permission>,
    roles: Vec<Role>,
    assignments: Vec<Assignment>,
}

/// In-memory access-control store.
///
/// Intended for tests/dev. Enforces the same unique constraints as the
/// Postgres schema: permission name, role name, (principal, permission).
#[derive(Debug, Default)]
pub struct InMemoryAccessStore {
    tables: RwLock<Tables>,
    closed: AtomicBool,
}

impl InMemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a role row directly, bypassing bootstrap rules (tests/fixtures).
    pub fn with_role(self, role: Role) -> Self {
        if let Ok(mut tables) = self.tables.write() {
            tables.roles.push(role);
        }
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Connection("store is closed".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.ensure_open()?;
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.ensure_open()?;
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn insert_permission_locked(
        tables: &mut Tables,
        new: NewPermission,
    ) -> Result<Permission, StoreError> {
        if tables.permissions.iter().any(|p| p.name == new.name) {
            return Err(StoreError::DuplicateKey(format!(
                "permission name '{}'",
                new.name
            )));
        }
        let stored = Permission::from_new(new, PermissionId::new(), Utc::now());
        tables.permissions.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl AccessStore for InMemoryAccessStore {
    async fn find_permissions(
        &self,
        filter: &PermissionFilter,
    ) -> Result<Vec<Permission>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .permissions
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn insert_permission(&self, new: NewPermission) -> Result<Permission, StoreError> {
        let mut tables = self.write()?;
        Self::insert_permission_locked(&mut tables, new)
    }

    async fn insert_permissions(
        &self,
        batch: Vec<NewPermission>,
    ) -> Result<Vec<Result<Permission, StoreError>>, StoreError> {
        let mut tables = self.write()?;
        Ok(batch
            .into_iter()
            .map(|new| Self::insert_permission_locked(&mut tables, new))
            .collect())
    }

    async fn update_permissions(
        &self,
        filter: &PermissionFilter,
        patch: &PermissionPatch,
    ) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let mut touched = 0;
        for p in tables.permissions.iter_mut().filter(|p| filter.matches(p)) {
            if let Some(description) = &patch.description {
                p.description = description.clone();
            }
            touched += 1;
        }
        Ok(touched)
    }

    async fn delete_permissions(&self, filter: &PermissionFilter) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let before = tables.permissions.len();
        tables.permissions.retain(|p| !filter.matches(p));
        Ok((before - tables.permissions.len()) as u64)
    }

    async fn find_roles(&self, filter: &RoleFilter) -> Result<Vec<Role>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .roles
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn insert_role(&self, new: NewRole) -> Result<Role, StoreError> {
        let mut tables = self.write()?;
        if tables.roles.iter().any(|r| r.name == new.name) {
            return Err(StoreError::DuplicateKey(format!("role name '{}'", new.name)));
        }
        let stored = Role::from_new(new, RoleId::new(), Utc::now());
        tables.roles.push(stored.clone());
        Ok(stored)
    }

    async fn update_roles(&self, filter: &RoleFilter, patch: &RolePatch) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let now = Utc::now();
        let mut touched = 0;
        for r in tables.roles.iter_mut().filter(|r| filter.matches(r)) {
            if let Some(display_name) = &patch.display_name {
                r.display_name = display_name.clone();
            }
            if let Some(description) = &patch.description {
                r.description = description.clone();
            }
            if let Some(permissions) = &patch.permissions {
                r.permissions = permissions.clone();
            }
            if let Some(is_active) = patch.is_active {
                r.is_active = is_active;
            }
            r.updated_at = now;
            touched += 1;
        }
        Ok(touched)
    }

    async fn delete_role(&self, name: &RoleName) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let Some(pos) = tables.roles.iter().position(|r| r.name == *name) else {
            return Ok(false);
        };
        tables.roles[pos]
            .ensure_mutable()
            .map_err(|e| StoreError::Protected(e.to_string()))?;
        tables.roles.remove(pos);
        Ok(true)
    }

    async fn find_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Assignment>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .assignments
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn insert_assignment(&self, new: NewAssignment) -> Result<Assignment, StoreError> {
        let mut tables = self.write()?;
        if tables.assignments.iter().any(|a| a.key() == new.key()) {
            return Err(StoreError::DuplicateKey(format!(
                "assignment ({}, {})",
                new.principal_id, new.permission_id
            )));
        }
        let stored = Assignment::from_new(new, AssignmentId::new(), Utc::now());
        tables.assignments.push(stored.clone());
        Ok(stored)
    }

    async fn delete_assignments(&self, filter: &AssignmentFilter) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let before = tables.assignments.len();
        tables.assignments.retain(|a| !filter.matches(a));
        Ok((before - tables.assignments.len()) as u64)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
