//! Trait definitions for the external stores the domain depends on.
//!
//! These traits are the seams between the control loop and its
//! collaborators. Implementations live in `crate::infrastructure`; mock
//! implementations are auto-generated via `mockall` for unit tests.
//!
//! - [`Registry`] - Short path mappings and click counters
//! - [`ResourceStore`] - ShortURL objects and their status subresource

pub mod registry;
pub mod resource_store;

pub use registry::{Registry, RegistryError, RegistryResult, counter_key, with_deadline};
pub use resource_store::{ResourceStore, ResourceStoreError};

#[cfg(test)]
pub use registry::MockRegistry;
#[cfg(test)]
pub use resource_store::MockResourceStore;
