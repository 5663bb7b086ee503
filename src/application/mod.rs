//! Application layer: the reconciliation engine, the redirect service and
//! the dispatcher that drives reconciliation.
//!
//! # Components
//!
//! - [`services::Reconciler`] - Converges one resource per invocation
//! - [`services::StatusWriter`] - Conflict-aware status persistence
//! - [`services::RedirectService`] - Short path lookup and click counting
//! - [`controller::run_controller`] - Per-id serialized dispatch with requeue and backoff

pub mod controller;
pub mod services;
