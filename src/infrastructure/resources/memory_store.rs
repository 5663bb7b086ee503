//! In-process ShortURL resource store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::domain::entities::{ResourceId, ShortUrl, ShortUrlSpec, ShortUrlStatus};
use crate::domain::reconcile_request::ReconcileRequest;
use crate::domain::repositories::{ResourceStore, ResourceStoreError};

/// Result of declaring a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
    /// The resource is being deleted; the spec is re-created once the
    /// deletion is finalized.
    PendingDeletion,
}

#[derive(Default)]
struct Contents {
    objects: BTreeMap<ResourceId, ShortUrl>,
    /// Specs declared while their resource was being deleted.
    redeclared: BTreeMap<ResourceId, ShortUrlSpec>,
}

/// Resource store kept in process memory.
///
/// Mirrors the semantics of a declarative resource API:
///
/// - every write bumps `resource_version`; status writes based on a stale
///   version are rejected with [`ResourceStoreError::Conflict`]
/// - [`MemoryResourceStore::mark_deleted`] only sets a deletion timestamp;
///   the object stays until the reconciler calls
///   [`ResourceStore::finalize`]
/// - spec changes and deletions emit a [`ReconcileRequest`] on the watch
///   channel; status writes do not
pub struct MemoryResourceStore {
    contents: RwLock<Contents>,
    watch: Option<mpsc::Sender<ReconcileRequest>>,
}

impl MemoryResourceStore {
    /// Creates a store that emits reconcile requests on `watch`.
    pub fn new(watch: mpsc::Sender<ReconcileRequest>) -> Self {
        Self {
            contents: RwLock::new(Contents::default()),
            watch: Some(watch),
        }
    }

    /// Creates a store without change notifications.
    pub fn unwatched() -> Self {
        Self {
            contents: RwLock::new(Contents::default()),
            watch: None,
        }
    }

    /// Creates a resource or replaces its spec.
    ///
    /// Declaring a resource that is being deleted records the spec; the
    /// resource is created again from it when the deletion is finalized.
    pub async fn apply(&self, id: ResourceId, spec: ShortUrlSpec) -> ApplyOutcome {
        let outcome = {
            let mut contents = self.contents.write().await;
            let Contents {
                objects,
                redeclared,
            } = &mut *contents;
            match objects.get_mut(&id) {
                None => {
                    objects.insert(id.clone(), ShortUrl::new(id.clone(), spec));
                    ApplyOutcome::Created
                }
                Some(existing) if existing.is_being_deleted() => {
                    redeclared.insert(id.clone(), spec);
                    ApplyOutcome::PendingDeletion
                }
                Some(existing) if existing.spec == spec => ApplyOutcome::Unchanged,
                Some(existing) => {
                    existing.spec = spec;
                    existing.resource_version += 1;
                    ApplyOutcome::Updated
                }
            }
        };

        match outcome {
            ApplyOutcome::Created | ApplyOutcome::Updated => {
                self.notify(ReconcileRequest::new(id)).await
            }
            ApplyOutcome::PendingDeletion => {
                info!(resource = %id, "Resource is being deleted, re-creating it once finalized")
            }
            ApplyOutcome::Unchanged => {}
        }
        outcome
    }

    /// Requests deletion of a resource; the object remains until finalized.
    ///
    /// Drops any spec declared since the deletion started. Returns false if
    /// the resource does not exist.
    pub async fn mark_deleted(&self, id: &ResourceId) -> bool {
        let snapshot = {
            let mut contents = self.contents.write().await;
            contents.redeclared.remove(id);
            let Some(existing) = contents.objects.get_mut(id) else {
                return false;
            };
            if existing.deletion_timestamp.is_none() {
                existing.deletion_timestamp = Some(Utc::now());
                existing.resource_version += 1;
            }
            existing.status.clone()
        };

        self.notify(ReconcileRequest::new(id.clone()).with_last_observed(snapshot))
            .await;
        true
    }

    /// Removes a resource immediately, bypassing finalization.
    ///
    /// The emitted request carries the last status so its registry entry
    /// can still be released.
    pub async fn remove(&self, id: &ResourceId) -> Option<ShortUrl> {
        let removed = {
            let mut contents = self.contents.write().await;
            contents.redeclared.remove(id);
            contents.objects.remove(id)?
        };
        self.notify(ReconcileRequest::new(id.clone()).with_last_observed(removed.status.clone()))
            .await;
        Some(removed)
    }

    /// Returns all resources ordered by id.
    pub async fn list(&self) -> Vec<ShortUrl> {
        self.contents.read().await.objects.values().cloned().collect()
    }

    async fn notify(&self, request: ReconcileRequest) {
        let Some(watch) = &self.watch else {
            return;
        };
        if watch.send(request).await.is_err() {
            warn!("Reconcile queue closed, change notification dropped");
        }
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get(&self, id: &ResourceId) -> Result<Option<ShortUrl>, ResourceStoreError> {
        Ok(self.contents.read().await.objects.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ShortUrl>, ResourceStoreError> {
        Ok(MemoryResourceStore::list(self).await)
    }

    async fn update_status(
        &self,
        id: &ResourceId,
        status: ShortUrlStatus,
        expected_version: u64,
    ) -> Result<ShortUrl, ResourceStoreError> {
        let mut contents = self.contents.write().await;
        let existing = contents
            .objects
            .get_mut(id)
            .ok_or_else(|| ResourceStoreError::NotFound(id.clone()))?;

        if existing.resource_version != expected_version {
            return Err(ResourceStoreError::Conflict(id.clone()));
        }

        existing.status = status;
        existing.resource_version += 1;
        Ok(existing.clone())
    }

    async fn finalize(&self, id: &ResourceId) -> Result<(), ResourceStoreError> {
        let recreated = {
            let mut contents = self.contents.write().await;
            match contents.objects.get(id) {
                Some(existing) if existing.is_being_deleted() => {
                    contents.objects.remove(id);
                    debug!(resource = %id, "Resource removed");
                    match contents.redeclared.remove(id) {
                        Some(spec) => {
                            contents
                                .objects
                                .insert(id.clone(), ShortUrl::new(id.clone(), spec));
                            true
                        }
                        None => false,
                    }
                }
                Some(_) => {
                    warn!(resource = %id, "Finalize requested for a live resource, ignoring");
                    false
                }
                None => false,
            }
        };

        if recreated {
            info!(resource = %id, "Resource re-created from its declared spec");
            self.notify(ReconcileRequest::new(id.clone())).await;
        }
        Ok(())
    }
}
