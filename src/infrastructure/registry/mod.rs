//! Registry implementations.
//!
//! - [`RedisRegistry`] - Production Redis-backed registry
//! - [`MemoryRegistry`] - In-process registry for development and tests

mod memory_registry;
mod redis_registry;

pub use memory_registry::MemoryRegistry;
pub use redis_registry::RedisRegistry;
