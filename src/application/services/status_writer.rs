//! Status subresource writer with conflict handling.

use std::sync::Arc;

use tracing::debug;

use crate::domain::entities::{ShortUrl, ShortUrlStatus};
use crate::domain::repositories::{ResourceStore, ResourceStoreError};
use crate::error::ReconcileError;

/// Number of write attempts before a conflict is surfaced to the caller.
const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Persists observed status back to the resource store.
///
/// A write based on a stale snapshot is never forced through: on conflict
/// the writer re-reads the resource and re-applies the same mutation to the
/// fresh status. If the spec changed in the meantime the mutation may no
/// longer be valid, so the conflict is surfaced and the whole
/// reconciliation runs again.
pub struct StatusWriter<S: ResourceStore + ?Sized> {
    store: Arc<S>,
    max_attempts: usize,
}

impl<S: ResourceStore + ?Sized> StatusWriter<S> {
    /// Creates a writer over a resource store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Overrides the number of attempts made before giving up on conflicts.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Applies `mutate` to the status of `resource` and persists the result.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(resource))` with the stored snapshot after the write, or
    ///   the unchanged snapshot when the mutation was a no-op
    /// - `Ok(None)` if the resource disappeared before the write landed
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::StatusConflict`] if every attempt conflicted
    /// or the spec changed between attempts, and
    /// [`ReconcileError::StoreUnavailable`] on store faults.
    pub async fn update<F>(
        &self,
        resource: &ShortUrl,
        mutate: F,
    ) -> Result<Option<ShortUrl>, ReconcileError>
    where
        F: Fn(&mut ShortUrlStatus) + Send,
    {
        let mut snapshot = resource.clone();

        for attempt in 1..=self.max_attempts {
            let mut status = snapshot.status.clone();
            mutate(&mut status);
            if status == snapshot.status {
                return Ok(Some(snapshot));
            }

            match self
                .store
                .update_status(&snapshot.id, status, snapshot.resource_version)
                .await
            {
                Ok(updated) => return Ok(Some(updated)),
                Err(ResourceStoreError::NotFound(_)) => return Ok(None),
                Err(ResourceStoreError::Conflict(id)) => {
                    debug!(resource = %id, attempt, "Status write conflicted, re-reading");

                    let Some(fresh) = self.store.get(&id).await? else {
                        return Ok(None);
                    };
                    if fresh.spec != snapshot.spec {
                        return Err(ReconcileError::StatusConflict(id));
                    }
                    snapshot = fresh;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReconcileError::StatusConflict(snapshot.id))
    }
}
