//! Reconciliation engine: converges one ShortURL resource per invocation.
//!
//! Each call re-derives everything from the current resource snapshot and
//! the current registry contents; nothing is cached between calls, so
//! redelivered requests are safe.
//!
//! # Flow
//!
//! 1. Fetch the resource. Gone → release the last observed short path.
//!    Marked for deletion → release its short path and finalize it.
//! 2. Validate `spec.targetURL`.
//! 3. Keep the current short path if its registry entry still holds the
//!    target URL; otherwise assign a new one, release the superseded entry
//!    and write the new entry and `status.shortPath`.
//! 4. Copy the click counter into `status.clickCount`.
//! 5. Ask to be re-run after the re-check interval.
//!
//! A short path belongs to at most one resource. Resources sharing a target
//! URL get distinct paths, and an entry is never released while another
//! live resource records it in its status. If two resources end up
//! recording the same path, the one with the smaller id keeps it.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::application::services::StatusWriter;
use crate::domain::entities::{ResourceId, ShortUrl};
use crate::domain::reconcile_request::ReconcileRequest;
use crate::domain::repositories::{Registry, ResourceStore, counter_key};
use crate::error::ReconcileError;
use crate::utils::short_path::{ShortPathGenerator, is_short_path};
use crate::utils::target_url::validate_target_url;

/// What the caller should do after a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Re-check after the given interval so counter drift is observed.
    After(Duration),
    /// The resource is gone; nothing left to converge.
    Never,
}

/// Tunables passed in from configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub short_path_length: usize,
    pub click_key_prefix: String,
    pub recheck_interval: Duration,
}

/// Drives desired → observed convergence for ShortURL resources.
pub struct Reconciler<R: Registry + ?Sized, S: ResourceStore + ?Sized> {
    registry: Arc<R>,
    store: Arc<S>,
    status_writer: StatusWriter<S>,
    generator: ShortPathGenerator,
    click_key_prefix: String,
    recheck_interval: Duration,
}

impl<R: Registry + ?Sized, S: ResourceStore + ?Sized> Reconciler<R, S> {
    /// Creates a reconciler over a shared registry and resource store.
    pub fn new(registry: Arc<R>, store: Arc<S>, config: ReconcilerConfig) -> Self {
        Self {
            registry,
            status_writer: StatusWriter::new(store.clone()),
            store,
            generator: ShortPathGenerator::new(config.short_path_length),
            click_key_prefix: config.click_key_prefix,
            recheck_interval: config.recheck_interval,
        }
    }

    /// Converges the resource named by `request`.
    ///
    /// Every blocking step observes `cancel`; a cancelled run returns
    /// [`ReconcileError::Cancelled`] and keeps whatever was already durably
    /// written. The next run re-derives state from the registry.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Validation`] if the target URL is malformed; the
    ///   registry and status are left untouched
    /// - [`ReconcileError::StoreUnavailable`] on registry or store faults,
    ///   including a failed release of a superseded entry
    /// - [`ReconcileError::StatusConflict`] if the status kept changing
    /// - [`ReconcileError::PathExhausted`] if no short path candidate is free
    /// - [`ReconcileError::Cancelled`] if `cancel` fired mid-run
    #[instrument(skip_all, fields(resource = %request.id))]
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
        cancel: &CancellationToken,
    ) -> Result<Requeue, ReconcileError> {
        metrics::counter!("url_shortener_reconciles_total").increment(1);

        let Some(resource) = guarded(cancel, self.store.get(&request.id)).await? else {
            self.release_last_observed(request, cancel).await?;
            return Ok(Requeue::Never);
        };

        if resource.is_being_deleted() {
            self.finalize(&resource, cancel).await?;
            return Ok(Requeue::Never);
        }

        validate_target_url(&resource.spec.target_url).map_err(|source| {
            ReconcileError::Validation {
                url: resource.spec.target_url.clone(),
                source,
            }
        })?;

        let Some(resource) = self.ensure_short_path(resource, cancel).await? else {
            return Ok(Requeue::Never);
        };

        if self.sync_click_count(&resource, cancel).await?.is_none() {
            debug!("Resource disappeared during status write");
            return Ok(Requeue::Never);
        }

        Ok(Requeue::After(self.recheck_interval))
    }

    /// Keeps the current short path if it is live for the target URL, or
    /// assigns a new one.
    async fn ensure_short_path(
        &self,
        resource: ShortUrl,
        cancel: &CancellationToken,
    ) -> Result<Option<ShortUrl>, ReconcileError> {
        let target_url = resource.spec.target_url.as_str();
        let current = resource.status.short_path.as_str();

        let mut reclaimable = current;
        if resource.status.is_assigned() {
            match guarded(cancel, self.registry.get(current)).await? {
                Some(stored) if stored == target_url => {
                    let claims = self.claimed_by_others(&resource.id, cancel).await?;
                    match claims.get(current) {
                        Some(owner) if *owner < resource.id => {
                            info!(path = current, owner = %owner, "Short path also recorded by another resource");
                            reclaimable = "";
                        }
                        _ => return Ok(Some(resource)),
                    }
                }
                Some(stored) => {
                    info!(path = current, stored = %stored, target_url, "Target URL changed");
                }
                None => info!(path = current, "Registry entry missing"),
            }
        }

        let new_path = self
            .assign_path(&resource.id, target_url, reclaimable, cancel)
            .await?;

        if resource.status.is_assigned()
            && current != new_path
            && self.release(&resource.id, current, cancel).await?
        {
            info!(path = current, "Released superseded short path");
        }

        guarded(cancel, self.registry.set(&new_path, target_url)).await?;
        info!(path = %new_path, target_url, "Short path assigned");

        let assigned = new_path.clone();
        let updated = guarded(
            cancel,
            self.status_writer
                .update(&resource, move |status| status.short_path = assigned.clone()),
        )
        .await?;

        if updated.is_none() && self.release(&resource.id, &new_path, cancel).await? {
            info!(path = %new_path, "Resource disappeared before its status was written, released its short path");
        }
        Ok(updated)
    }

    /// Picks the first candidate path that is free, already ours, or held
    /// by the same target URL without another resource recording it.
    ///
    /// `reclaimable` is the path currently recorded in status; its entry is
    /// about to be rewritten, so it counts as free.
    async fn assign_path(
        &self,
        id: &ResourceId,
        target_url: &str,
        reclaimable: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ReconcileError> {
        let claims = self.claimed_by_others(id, cancel).await?;

        for candidate in self.generator.candidates(target_url) {
            if candidate == reclaimable {
                return Ok(candidate);
            }
            if let Some(owner) = claims.get(&candidate) {
                debug!(path = %candidate, owner = %owner, "Short path recorded by another resource");
                continue;
            }
            match guarded(cancel, self.registry.get(&candidate)).await? {
                None => return Ok(candidate),
                Some(existing) if existing == target_url => return Ok(candidate),
                Some(existing) => {
                    warn!(
                        path = %candidate,
                        existing_target = %existing,
                        target_url,
                        "Short path collision, trying a longer prefix"
                    );
                }
            }
        }

        Err(ReconcileError::PathExhausted {
            url: target_url.to_string(),
        })
    }

    /// Mirrors the click counter of the assigned path into status.
    async fn sync_click_count(
        &self,
        resource: &ShortUrl,
        cancel: &CancellationToken,
    ) -> Result<Option<ShortUrl>, ReconcileError> {
        let key = counter_key(&self.click_key_prefix, &resource.status.short_path);
        let clicks = guarded(cancel, self.registry.get_counter(&key)).await?;

        if clicks == resource.status.click_count {
            return Ok(Some(resource.clone()));
        }

        debug!(
            path = %resource.status.short_path,
            previous = resource.status.click_count,
            clicks,
            "Updating click count"
        );
        guarded(
            cancel,
            self.status_writer
                .update(resource, move |status| status.click_count = clicks),
        )
        .await
    }

    /// Releases the registry entry of a resource whose object is gone.
    async fn release_last_observed(
        &self,
        request: &ReconcileRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        match request.last_short_path() {
            Some(path) => {
                if self.release(&request.id, path, cancel).await? {
                    info!(path, "Released short path of deleted resource");
                }
            }
            None => debug!("Resource not found and no short path known"),
        }
        Ok(())
    }

    /// Releases the registry entry of a resource marked for deletion, then
    /// lets the object go.
    async fn finalize(
        &self,
        resource: &ShortUrl,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError> {
        let path = resource.status.short_path.as_str();
        if resource.status.is_assigned() && self.release(&resource.id, path, cancel).await? {
            info!(path, "Released short path of deleted resource");
        }
        guarded(cancel, self.store.finalize(&resource.id)).await?;
        info!("Resource finalized");
        Ok(())
    }

    /// Deletes a mapping entry and its click counter on behalf of `id`.
    /// Absent keys are fine.
    ///
    /// Returns false, leaving both keys in place, while another live
    /// resource records `path` in its status.
    async fn release(
        &self,
        id: &ResourceId,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ReconcileError> {
        if let Some(owner) = self.claimed_by_others(id, cancel).await?.get(path) {
            info!(path, owner = %owner, "Short path recorded by another resource, keeping its entry");
            return Ok(false);
        }
        self.delete_entry(path, cancel).await?;
        Ok(true)
    }

    async fn delete_entry(&self, path: &str, cancel: &CancellationToken) -> Result<(), ReconcileError> {
        guarded(cancel, self.registry.delete(path)).await?;
        let key = counter_key(&self.click_key_prefix, path);
        guarded(cancel, self.registry.delete(&key)).await?;
        Ok(())
    }

    /// Short paths recorded by live resources other than `id`, with the id
    /// recording each.
    async fn claimed_by_others(
        &self,
        id: &ResourceId,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, ResourceId>, ReconcileError> {
        let resources = guarded(cancel, self.store.list()).await?;
        let mut claims: HashMap<String, ResourceId> = HashMap::new();
        for other in resources {
            if other.id == *id || other.is_being_deleted() || !other.status.is_assigned() {
                continue;
            }
            let held_by_smaller = claims
                .get(&other.status.short_path)
                .is_some_and(|owner: &ResourceId| *owner <= other.id);
            if !held_by_smaller {
                claims.insert(other.status.short_path, other.id);
            }
        }
        Ok(claims)
    }

    /// Deletes mapping entries and click counters no resource can own.
    ///
    /// Run once after the resources are loaded at startup, since status is
    /// not kept across restarts. An entry is kept when a resource records
    /// its path, or when it holds the target URL of a resource for which
    /// the path is a candidate. A counter is kept when its path could
    /// belong to some resource. Keys without short path syntax are never
    /// touched.
    ///
    /// Safe to run while reconciles are in flight: every entry a reconcile
    /// writes satisfies the keep rule.
    ///
    /// Returns the number of orphaned short paths released, counting
    /// counters left without an entry.
    #[instrument(skip_all)]
    pub async fn sweep_orphans(&self, cancel: &CancellationToken) -> Result<usize, ReconcileError> {
        let resources = guarded(cancel, self.store.list()).await?;

        let recorded: HashSet<&str> = resources
            .iter()
            .filter(|r| r.status.is_assigned())
            .map(|r| r.status.short_path.as_str())
            .collect();
        let mut derivable: HashMap<String, HashSet<&str>> = HashMap::new();
        for resource in &resources {
            let target_url = resource.spec.target_url.as_str();
            for candidate in self.generator.candidates(target_url) {
                derivable.entry(candidate).or_default().insert(target_url);
            }
        }

        let mut removed = 0;

        for path in guarded(cancel, self.registry.keys_with_prefix("/")).await? {
            if !is_short_path(&path) || recorded.contains(path.as_str()) {
                continue;
            }
            let orphaned = match derivable.get(&path) {
                None => true,
                Some(targets) => guarded(cancel, self.registry.get(&path))
                    .await?
                    .is_some_and(|stored| !targets.contains(stored.as_str())),
            };
            if orphaned {
                self.delete_entry(&path, cancel).await?;
                debug!(path = %path, "Released orphaned short path");
                removed += 1;
            }
        }

        let prefix = self.click_key_prefix.as_str();
        for key in guarded(cancel, self.registry.keys_with_prefix(prefix)).await? {
            let Some(path) = key.strip_prefix(prefix) else {
                continue;
            };
            if is_short_path(path) && !recorded.contains(path) && !derivable.contains_key(path) {
                guarded(cancel, self.registry.delete(&key)).await?;
                debug!(key = %key, "Deleted orphaned click counter");
                removed += 1;
            }
        }

        info!(removed, resources = resources.len(), "Orphan sweep finished");
        Ok(removed)
    }
}

/// Awaits a store operation unless `cancel` fires first.
async fn guarded<T, E, F>(cancel: &CancellationToken, operation: F) -> Result<T, ReconcileError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<ReconcileError>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReconcileError::Cancelled),
        result = operation => result.map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ResourceId, ShortUrlSpec, ShortUrlStatus};
    use crate::domain::repositories::{
        MockRegistry, MockResourceStore, RegistryError, ResourceStoreError,
    };
    use chrono::Utc;
    use mockall::predicate::eq;

    const TARGET: &str = "https://example.com/a";

    fn config() -> ReconcilerConfig {
        ReconcilerConfig {
            short_path_length: 3,
            click_key_prefix: "clicks:".to_string(),
            recheck_interval: Duration::from_secs(30),
        }
    }

    fn expected_path(url: &str) -> String {
        ShortPathGenerator::new(3).generate(url)
    }

    fn resource(target: &str, path: &str, clicks: u64) -> ShortUrl {
        let mut resource =
            ShortUrl::new(ResourceId::new("default/docs"), ShortUrlSpec::new(target));
        resource.status = ShortUrlStatus {
            short_path: path.to_string(),
            click_count: clicks,
        };
        resource
    }

    fn request() -> ReconcileRequest {
        ReconcileRequest::new(ResourceId::new("default/docs"))
    }

    fn store_returning(snapshot: ShortUrl) -> MockResourceStore {
        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        store
            .expect_get()
            .returning(move |_| Ok(Some(snapshot.clone())));
        store.expect_update_status().returning(|id, status, _| {
            let mut updated = ShortUrl::new(id.clone(), ShortUrlSpec::new(TARGET));
            updated.status = status;
            updated.resource_version = 2;
            Ok(updated)
        });
        store
    }

    fn other_resource(target: &str, path: &str) -> ShortUrl {
        let mut other = ShortUrl::new(ResourceId::new("default/aaa"), ShortUrlSpec::new(target));
        other.status.short_path = path.to_string();
        other
    }

    fn reconciler(registry: MockRegistry, store: MockResourceStore) -> Reconciler<MockRegistry, MockResourceStore> {
        Reconciler::new(Arc::new(registry), Arc::new(store), config())
    }

    #[tokio::test]
    async fn test_first_reconcile_assigns_short_path() {
        let path = expected_path(TARGET);
        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .with(eq(path.clone()))
            .times(1)
            .returning(|_| Ok(None));
        registry
            .expect_set()
            .with(eq(path.clone()), eq(TARGET))
            .times(1)
            .returning(|_, _| Ok(()));
        registry
            .expect_get_counter()
            .with(eq(format!("clicks:{}", path)))
            .times(1)
            .returning(|_| Ok(0));
        registry.expect_delete().times(0);

        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        store
            .expect_get()
            .returning(|_| Ok(Some(resource(TARGET, "", 0))));
        let written = path.clone();
        store
            .expect_update_status()
            .withf(move |_, status, _| status.short_path == written)
            .times(1)
            .returning(|id, status, _| {
                let mut updated = ShortUrl::new(id.clone(), ShortUrlSpec::new(TARGET));
                updated.status = status;
                Ok(updated)
            });

        let outcome = reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, Requeue::After(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_converged_resource_causes_no_writes() {
        let path = expected_path(TARGET);
        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .with(eq(path.clone()))
            .times(1)
            .returning(|_| Ok(Some(TARGET.to_string())));
        registry.expect_get_counter().times(1).returning(|_| Ok(4));
        registry.expect_set().times(0);
        registry.expect_delete().times(0);

        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        let snapshot = resource(TARGET, &path, 4);
        store
            .expect_get()
            .returning(move |_| Ok(Some(snapshot.clone())));
        store.expect_update_status().times(0);

        let outcome = reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, Requeue::After(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_click_count_drift_is_copied_into_status() {
        let path = expected_path(TARGET);
        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .returning(|_| Ok(Some(TARGET.to_string())));
        registry.expect_get_counter().returning(|_| Ok(12));

        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        let snapshot = resource(TARGET, &path, 3);
        store
            .expect_get()
            .returning(move |_| Ok(Some(snapshot.clone())));
        store
            .expect_update_status()
            .withf(|_, status, _| status.click_count == 12)
            .times(1)
            .returning(|id, status, _| {
                let mut updated = ShortUrl::new(id.clone(), ShortUrlSpec::new(TARGET));
                updated.status = status;
                Ok(updated)
            });

        reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_target_change_releases_old_path() {
        let new_target = "https://example.com/b";
        let new_path = expected_path(new_target);
        let old_path = "/old".to_string();

        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .with(eq(old_path.clone()))
            .returning(|_| Ok(Some(TARGET.to_string())));
        registry
            .expect_get()
            .with(eq(new_path.clone()))
            .returning(|_| Ok(None));
        registry
            .expect_delete()
            .with(eq(old_path.clone()))
            .times(1)
            .returning(|_| Ok(()));
        registry
            .expect_delete()
            .with(eq("clicks:/old".to_string()))
            .times(1)
            .returning(|_| Ok(()));
        registry
            .expect_set()
            .with(eq(new_path.clone()), eq(new_target))
            .times(1)
            .returning(|_, _| Ok(()));
        registry.expect_get_counter().returning(|_| Ok(0));

        let store = store_returning(resource(new_target, &old_path, 5));

        reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_release_of_old_path_is_surfaced() {
        let new_target = "https://example.com/b";

        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .with(eq("/old".to_string()))
            .returning(|_| Ok(Some(TARGET.to_string())));
        registry.expect_get().returning(|_| Ok(None));
        registry
            .expect_delete()
            .returning(|_| Err(RegistryError::Unavailable("connection reset".to_string())));
        registry.expect_set().times(0);

        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        let snapshot = resource(new_target, "/old", 0);
        store
            .expect_get()
            .returning(move |_| Ok(Some(snapshot.clone())));
        store.expect_update_status().times(0);

        let result = reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ReconcileError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_missing_entry_is_rewritten_at_same_path() {
        let path = expected_path(TARGET);
        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .with(eq(path.clone()))
            .times(1)
            .returning(|_| Ok(None));
        registry.expect_delete().times(0);
        registry
            .expect_set()
            .with(eq(path.clone()), eq(TARGET))
            .times(1)
            .returning(|_, _| Ok(()));
        registry.expect_get_counter().returning(|_| Ok(0));

        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        let snapshot = resource(TARGET, &path, 0);
        store
            .expect_get()
            .returning(move |_| Ok(Some(snapshot.clone())));
        store.expect_update_status().times(0);

        reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_collision_falls_back_to_longer_prefix() {
        let generator = ShortPathGenerator::new(3);
        let candidates: Vec<String> = generator.candidates(TARGET).take(2).collect();

        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .with(eq(candidates[0].clone()))
            .returning(|_| Ok(Some("https://someone-else.example".to_string())));
        registry
            .expect_get()
            .with(eq(candidates[1].clone()))
            .returning(|_| Ok(None));
        registry
            .expect_set()
            .with(eq(candidates[1].clone()), eq(TARGET))
            .times(1)
            .returning(|_, _| Ok(()));
        registry.expect_get_counter().returning(|_| Ok(0));

        let store = store_returning(resource(TARGET, "", 0));

        reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_mutation() {
        let mut registry = MockRegistry::new();
        registry.expect_get().times(0);
        registry.expect_set().times(0);
        registry.expect_delete().times(0);

        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        store
            .expect_get()
            .returning(|_| Ok(Some(resource("not-a-url", "/abc", 0))));
        store.expect_update_status().times(0);

        let result = reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ReconcileError::Validation { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_deleted_resource_releases_last_observed_path() {
        let mut registry = MockRegistry::new();
        registry
            .expect_delete()
            .with(eq("/abc".to_string()))
            .times(1)
            .returning(|_| Ok(()));
        registry
            .expect_delete()
            .with(eq("clicks:/abc".to_string()))
            .times(1)
            .returning(|_| Ok(()));

        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        store.expect_get().returning(|_| Ok(None));

        let request = request().with_last_observed(ShortUrlStatus {
            short_path: "/abc".to_string(),
            click_count: 3,
        });

        let outcome = reconciler(registry, store)
            .reconcile(&request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, Requeue::Never);
    }

    #[tokio::test]
    async fn test_deleted_resource_without_snapshot_is_noop() {
        let mut registry = MockRegistry::new();
        registry.expect_delete().times(0);

        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        store.expect_get().returning(|_| Ok(None));

        let outcome = reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, Requeue::Never);
    }

    #[tokio::test]
    async fn test_resource_marked_for_deletion_is_finalized() {
        let mut registry = MockRegistry::new();
        registry.expect_delete().times(2).returning(|_| Ok(()));
        registry.expect_set().times(0);

        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        store.expect_get().returning(|_| {
            let mut snapshot = resource("not-a-url", "/abc", 1);
            snapshot.deletion_timestamp = Some(Utc::now());
            Ok(Some(snapshot))
        });
        store.expect_finalize().times(1).returning(|_| Ok(()));

        let outcome = reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, Requeue::Never);
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let registry = MockRegistry::new();
        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        store
            .expect_get()
            .returning(|_| Err(ResourceStoreError::Unavailable("timeout".to_string())));

        let result = reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ReconcileError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cancelled_run_aborts_before_store_calls() {
        let mut registry = MockRegistry::new();
        registry.expect_set().times(0);
        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        store
            .expect_get()
            .returning(|_| Ok(Some(resource(TARGET, "", 0))));
        store.expect_update_status().times(0);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = reconciler(registry, store).reconcile(&request(), &cancel).await;

        assert!(matches!(result, Err(ReconcileError::Cancelled)));
    }

    #[tokio::test]
    async fn test_same_target_as_another_resource_gets_distinct_path() {
        let generator = ShortPathGenerator::new(3);
        let candidates: Vec<String> = generator.candidates(TARGET).take(2).collect();

        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .with(eq(candidates[0].clone()))
            .times(0);
        registry
            .expect_get()
            .with(eq(candidates[1].clone()))
            .returning(|_| Ok(None));
        registry
            .expect_set()
            .with(eq(candidates[1].clone()), eq(TARGET))
            .times(1)
            .returning(|_, _| Ok(()));
        registry.expect_get_counter().returning(|_| Ok(0));

        let mut store = MockResourceStore::new();
        let snapshot = resource(TARGET, "", 0);
        store
            .expect_get()
            .returning(move |_| Ok(Some(snapshot.clone())));
        let claimed = other_resource(TARGET, &candidates[0]);
        store
            .expect_list()
            .returning(move || Ok(vec![claimed.clone()]));
        let written = candidates[1].clone();
        store
            .expect_update_status()
            .withf(move |_, status, _| status.short_path == written)
            .times(1)
            .returning(|id, status, _| {
                let mut updated = ShortUrl::new(id.clone(), ShortUrlSpec::new(TARGET));
                updated.status = status;
                Ok(updated)
            });

        reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_path_recorded_by_smaller_id_is_given_up() {
        let generator = ShortPathGenerator::new(3);
        let candidates: Vec<String> = generator.candidates(TARGET).take(2).collect();

        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .with(eq(candidates[0].clone()))
            .returning(|_| Ok(Some(TARGET.to_string())));
        registry
            .expect_get()
            .with(eq(candidates[1].clone()))
            .returning(|_| Ok(None));
        registry.expect_delete().times(0);
        registry
            .expect_set()
            .with(eq(candidates[1].clone()), eq(TARGET))
            .times(1)
            .returning(|_, _| Ok(()));
        registry.expect_get_counter().returning(|_| Ok(0));

        let mut store = MockResourceStore::new();
        let snapshot = resource(TARGET, &candidates[0], 0);
        store
            .expect_get()
            .returning(move |_| Ok(Some(snapshot.clone())));
        let claimed = other_resource(TARGET, &candidates[0]);
        store
            .expect_list()
            .returning(move || Ok(vec![claimed.clone()]));
        store.expect_update_status().times(1).returning(|id, status, _| {
            let mut updated = ShortUrl::new(id.clone(), ShortUrlSpec::new(TARGET));
            updated.status = status;
            Ok(updated)
        });

        reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deletion_keeps_path_recorded_by_another_resource() {
        let mut registry = MockRegistry::new();
        registry.expect_delete().times(0);

        let mut store = MockResourceStore::new();
        store.expect_get().returning(|_| {
            let mut snapshot = resource(TARGET, "/abc", 1);
            snapshot.deletion_timestamp = Some(Utc::now());
            Ok(Some(snapshot))
        });
        store
            .expect_list()
            .returning(|| Ok(vec![other_resource(TARGET, "/abc")]));
        store.expect_finalize().times(1).returning(|_| Ok(()));

        let outcome = reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, Requeue::Never);
    }

    #[tokio::test]
    async fn test_entry_released_when_resource_vanishes_before_status_write() {
        let path = expected_path(TARGET);
        let mut registry = MockRegistry::new();
        registry.expect_get().returning(|_| Ok(None));
        registry
            .expect_set()
            .with(eq(path.clone()), eq(TARGET))
            .times(1)
            .returning(|_, _| Ok(()));
        registry
            .expect_delete()
            .with(eq(path.clone()))
            .times(1)
            .returning(|_| Ok(()));
        registry
            .expect_delete()
            .with(eq(format!("clicks:{}", path)))
            .times(1)
            .returning(|_| Ok(()));
        registry.expect_get_counter().times(0);

        let mut store = MockResourceStore::new();
        store.expect_list().returning(|| Ok(Vec::new()));
        store
            .expect_get()
            .returning(|_| Ok(Some(resource(TARGET, "", 0))));
        store
            .expect_update_status()
            .times(1)
            .returning(|id, _, _| Err(ResourceStoreError::NotFound(id.clone())));

        let outcome = reconciler(registry, store)
            .reconcile(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, Requeue::Never);
    }
}
