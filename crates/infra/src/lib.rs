//! Infrastructure layer: storage backends, the principal directory, and the
//! provisioning engine that seeds them.

pub mod directory;
pub mod provisioning;
pub mod store;

mod integration_tests;
