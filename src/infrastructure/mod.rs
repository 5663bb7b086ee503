//! Infrastructure layer for external integrations.
//!
//! This layer implements the store traits defined by the domain layer.
//!
//! # Modules
//!
//! - [`registry`] - Registry implementations (Redis and in-memory)
//! - [`resources`] - In-memory resource store and manifest loading

pub mod registry;
pub mod resources;
