//! Redirect resolution and click counting.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::repositories::{Registry, RegistryError, counter_key};

/// Result of resolving a short path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// Redirect to the stored target URL.
    Found(String),
    /// No mapping entry exists for the path.
    NotFound,
}

/// Resolves short paths against the registry and counts served redirects.
///
/// Read-only on mapping entries; the only writer of click counters.
pub struct RedirectService<R: Registry + ?Sized> {
    registry: Arc<R>,
    click_key_prefix: String,
}

impl<R: Registry + ?Sized> RedirectService<R> {
    /// Creates a redirect service over the shared registry.
    pub fn new(registry: Arc<R>, click_key_prefix: impl Into<String>) -> Self {
        Self {
            registry,
            click_key_prefix: click_key_prefix.into(),
        }
    }

    /// Looks up `short_path` and, on a hit, counts the click.
    ///
    /// The counter uses the registry's atomic increment, so concurrent
    /// requests to the same path are never lost. A failed increment is
    /// logged and does not change the outcome.
    ///
    /// # Errors
    ///
    /// Returns the registry error if the lookup itself fails; the counter is
    /// not touched in that case.
    pub async fn resolve(&self, short_path: &str) -> Result<RedirectOutcome, RegistryError> {
        let Some(target_url) = self.registry.get(short_path).await? else {
            debug!(path = short_path, "Short path not found");
            return Ok(RedirectOutcome::NotFound);
        };

        let key = counter_key(&self.click_key_prefix, short_path);
        match self.registry.increment(&key).await {
            Ok(clicks) => debug!(path = short_path, clicks, "Click counted"),
            Err(e) => {
                warn!(path = short_path, error = %e, "Failed to increment click count");
                metrics::counter!("url_shortener_click_increment_failures_total").increment(1);
            }
        }

        Ok(RedirectOutcome::Found(target_url))
    }

    /// Checks whether the registry answers.
    pub async fn is_ready(&self) -> bool {
        self.registry.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::MockRegistry;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn test_resolve_found_counts_click() {
        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .with(eq("/abc"))
            .times(1)
            .returning(|_| Ok(Some("https://example.com".to_string())));
        registry
            .expect_increment()
            .with(eq("clicks:/abc"))
            .times(1)
            .returning(|_| Ok(1));

        let service = RedirectService::new(Arc::new(registry), "clicks:");
        let outcome = service.resolve("/abc").await.unwrap();

        assert_eq!(
            outcome,
            RedirectOutcome::Found("https://example.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_resolve_not_found_leaves_counter_alone() {
        let mut registry = MockRegistry::new();
        registry.expect_get().times(1).returning(|_| Ok(None));
        registry.expect_increment().times(0);

        let service = RedirectService::new(Arc::new(registry), "clicks:");
        let outcome = service.resolve("/xyz").await.unwrap();

        assert_eq!(outcome, RedirectOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_resolve_lookup_failure_is_error() {
        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .returning(|_| Err(RegistryError::Unavailable("connection refused".to_string())));
        registry.expect_increment().times(0);

        let service = RedirectService::new(Arc::new(registry), "clicks:");
        let result = service.resolve("/abc").await;

        assert!(matches!(result, Err(RegistryError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_increment_failure_still_redirects() {
        let mut registry = MockRegistry::new();
        registry
            .expect_get()
            .returning(|_| Ok(Some("https://example.com".to_string())));
        registry.expect_increment().times(1).returning(|_| {
            Err(RegistryError::Timeout(std::time::Duration::from_millis(5)))
        });

        let service = RedirectService::new(Arc::new(registry), "clicks:");
        let outcome = service.resolve("/abc").await.unwrap();

        assert_eq!(
            outcome,
            RedirectOutcome::Found("https://example.com".to_string())
        );
    }
}
