//! # ShortURL Operator
//!
//! Keeps a shared key-value registry in sync with declared ShortURL
//! resources and serves the resulting short paths as redirects.
//!
//! ## Architecture
//!
//! - **Domain Layer** ([`domain`]) - Resource entities and store traits
//! - **Application Layer** ([`application`]) - Reconciler, status writer,
//!   redirect service and the per-resource controller
//! - **Infrastructure Layer** ([`infrastructure`]) - Redis and in-memory
//!   registries, in-memory resource store, manifest loading
//! - **API Layer** ([`api`]) - Redirect and probe handlers
//!
//! ## Flow
//!
//! 1. A resource declares `targetURL`
//! 2. The reconciler derives a short path from the URL digest and writes the
//!    mapping entry `/<path> → targetURL` to the registry
//! 3. `GET /<path>` redirects with 302 and increments `clicks:/<path>`
//! 4. Periodic reconciles copy the counter into the resource status
//!
//! ## Quick Start
//!
//! ```bash
//! export REDIS_URL="redis://localhost:6379"
//! export RESOURCES_FILE="./shorturls.json"
//! cargo run
//! ```
//!
//! ## Configuration
//!
//! Service configuration is loaded from environment variables via
//! [`config::Config`].

pub mod api;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod state;
pub mod utils;

pub mod config;
pub mod server;

pub mod routes;

pub use error::{AppError, ReconcileError};
pub use state::AppState;

/// Commonly used types for external consumers.
///
/// Re-exports frequently used types to simplify imports for library users
/// and integration tests.
pub mod prelude {
    pub use crate::application::controller::{ControllerConfig, run_controller};
    pub use crate::application::services::{
        RedirectOutcome, RedirectService, Reconciler, ReconcilerConfig, Requeue,
    };
    pub use crate::domain::entities::{ResourceId, ShortUrl, ShortUrlSpec, ShortUrlStatus};
    pub use crate::domain::reconcile_request::ReconcileRequest;
    pub use crate::domain::repositories::{Registry, ResourceStore};
    pub use crate::error::{AppError, ReconcileError};
    pub use crate::infrastructure::registry::MemoryRegistry;
    pub use crate::infrastructure::resources::MemoryResourceStore;
    pub use crate::state::AppState;
}
