#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use shorturl_operator::application::services::{Reconciler, ReconcilerConfig};
use shorturl_operator::domain::entities::{ResourceId, ShortUrl};
use shorturl_operator::domain::repositories::ResourceStore;
use shorturl_operator::infrastructure::registry::MemoryRegistry;
use shorturl_operator::infrastructure::resources::MemoryResourceStore;
use shorturl_operator::state::AppState;
use shorturl_operator::utils::short_path::ShortPathGenerator;

pub const CLICK_PREFIX: &str = "clicks:";
pub const RECHECK: Duration = Duration::from_secs(30);

pub type TestReconciler = Reconciler<MemoryRegistry, MemoryResourceStore>;

pub fn create_test_state(registry: Arc<MemoryRegistry>) -> AppState {
    AppState::new(registry, CLICK_PREFIX)
}

pub fn reconciler_config() -> ReconcilerConfig {
    ReconcilerConfig {
        short_path_length: 3,
        click_key_prefix: CLICK_PREFIX.to_string(),
        recheck_interval: RECHECK,
    }
}

pub fn create_reconciler(
    registry: Arc<MemoryRegistry>,
    store: Arc<MemoryResourceStore>,
) -> Arc<TestReconciler> {
    Arc::new(Reconciler::new(registry, store, reconciler_config()))
}

pub fn path_for(url: &str) -> String {
    ShortPathGenerator::new(3).generate(url)
}

pub fn clicks_key(path: &str) -> String {
    format!("{CLICK_PREFIX}{path}")
}

pub async fn fetch(store: &MemoryResourceStore, id: &str) -> Option<ShortUrl> {
    store.get(&ResourceId::new(id)).await.unwrap()
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
