//! Domain layer containing the resource model and store contracts.
//!
//! # Architecture
//!
//! - [`entities`] - ShortURL resource, spec and status
//! - [`repositories`] - Registry and resource store trait definitions
//! - [`reconcile_request`] - Unit of work delivered to the controller
//!
//! # Design Principles
//!
//! - Domain layer has no dependencies on infrastructure or presentation layers
//! - Store traits define contracts implemented by the infrastructure layer
//! - Control logic lives in services (see [`crate::application::services`])
//!
//! # Data Ownership
//!
//! - The reconciler is the only writer of mapping entries and of `status.shortPath`
//! - The redirect service is the only writer of click counters
//! - The reconciler copies counters into `status.clickCount`, read-only

pub mod entities;
pub mod reconcile_request;
pub mod repositories;
