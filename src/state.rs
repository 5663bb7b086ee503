//! Shared state injected into HTTP handlers.

use std::sync::Arc;

use crate::application::services::RedirectService;
use crate::domain::repositories::Registry;

/// Application state shared by the redirect and probe routers.
#[derive(Clone)]
pub struct AppState {
    pub redirect_service: Arc<RedirectService<dyn Registry>>,
}

impl AppState {
    /// Builds the state over a shared registry handle.
    pub fn new(registry: Arc<dyn Registry>, click_key_prefix: impl Into<String>) -> Self {
        Self {
            redirect_service: Arc::new(RedirectService::new(registry, click_key_prefix)),
        }
    }
}
