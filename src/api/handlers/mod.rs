//! HTTP request handlers.
//!
//! - [`redirect`] - public short path redirects
//! - [`health`] - liveness and readiness probes

pub mod health;
pub mod redirect;

pub use health::{liveness_handler, readiness_handler};
pub use redirect::redirect_handler;
