//! In-process registry with the same semantics as the Redis one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::repositories::{Registry, RegistryError, RegistryResult};

/// A registry kept in process memory.
///
/// Like Redis, mapping entries and counters share one keyspace and counters
/// are stored as decimal strings. Every operation runs under a single lock,
/// so increments are atomic.
///
/// # Use Cases
///
/// - Development without Redis (`REDIS_URL` unset)
/// - Tests that need a real registry rather than a mock
pub struct MemoryRegistry {
    entries: Mutex<HashMap<String, String>>,
    offline: AtomicBool,
    writes: AtomicU64,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        debug!("Using in-memory registry");
        Self {
            entries: Mutex::new(HashMap::new()),
            offline: AtomicBool::new(false),
            writes: AtomicU64::new(0),
        }
    }

    /// Simulates an unreachable store: every operation fails until reset.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `set` and `delete` calls served so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(&self) -> RegistryResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable(
                "in-memory registry is offline".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_counter(key: &str, raw: &str) -> RegistryResult<u64> {
    raw.parse().map_err(|_| RegistryError::InvalidValue {
        key: key.to_string(),
        reason: format!("not a counter: {:?}", raw),
    })
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn get(&self, key: &str) -> RegistryResult<Option<String>> {
        self.check_online()?;
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> RegistryResult<()> {
        self.check_online()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> RegistryResult<()> {
        self.check_online()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.lock().remove(key);
        Ok(())
    }

    async fn increment(&self, counter_key: &str) -> RegistryResult<u64> {
        self.check_online()?;
        let mut entries = self.lock();
        let current = match entries.get(counter_key) {
            Some(raw) => parse_counter(counter_key, raw)?,
            None => 0,
        };
        let next = current + 1;
        entries.insert(counter_key.to_string(), next.to_string());
        Ok(next)
    }

    async fn get_counter(&self, counter_key: &str) -> RegistryResult<u64> {
        self.check_online()?;
        match self.lock().get(counter_key) {
            Some(raw) => parse_counter(counter_key, raw),
            None => Ok(0),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> RegistryResult<Vec<String>> {
        self.check_online()?;
        Ok(self
            .lock()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn ping(&self) -> bool {
        self.check_online().is_ok()
    }
}
