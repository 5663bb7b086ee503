//! Resource store trait for ShortURL objects and their status subresource.

use crate::domain::entities::{ResourceId, ShortUrl, ShortUrlStatus};
use async_trait::async_trait;

/// Errors returned by the resource store.
#[derive(Debug, thiserror::Error)]
pub enum ResourceStoreError {
    /// The write was based on a stale `resource_version`.
    #[error("Resource {0} was modified concurrently")]
    Conflict(ResourceId),

    #[error("Resource {0} not found")]
    NotFound(ResourceId),

    #[error("Resource store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to ShortURL resources and write access to their status.
///
/// The reconciler never writes the spec; it only reads snapshots, updates
/// the status subresource and finalizes resources marked for deletion.
///
/// # Implementations
///
/// - [`crate::infrastructure::resources::MemoryResourceStore`] - In-process store
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetches the current snapshot of a resource.
    ///
    /// Returns `Ok(None)` if the resource no longer exists.
    async fn get(&self, id: &ResourceId) -> Result<Option<ShortUrl>, ResourceStoreError>;

    /// Snapshots of every resource, including those marked for deletion.
    async fn list(&self) -> Result<Vec<ShortUrl>, ResourceStoreError>;

    /// Replaces the status of a resource.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceStoreError::Conflict`] if `expected_version` no longer
    /// matches the stored object, and [`ResourceStoreError::NotFound`] if the
    /// resource is gone.
    async fn update_status(
        &self,
        id: &ResourceId,
        status: ShortUrlStatus,
        expected_version: u64,
    ) -> Result<ShortUrl, ResourceStoreError>;

    /// Removes a resource whose deletion was requested, once its external
    /// resources were released.
    ///
    /// Finalizing an absent resource succeeds.
    async fn finalize(&self, id: &ResourceId) -> Result<(), ResourceStoreError>;
}
