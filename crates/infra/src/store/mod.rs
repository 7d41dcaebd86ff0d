//! Access-control storage boundary.
//!
//! Roles, the permission catalog and principal↔permission assignments live
//! behind one async trait so the provisioning engine never assumes a backend.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryAccessStore;
pub use postgres::PostgresAccessStore;
pub use r#trait::{
    AccessStore, AssignmentFilter, PermissionFilter, PermissionPatch, RoleFilter, RolePatch,
    StoreError,
};
