//! Registry trait: the key-value store holding short path mappings and
//! click counters.

use async_trait::async_trait;
use std::time::Duration;

/// Errors returned by registry operations.
///
/// A missing key is never an error; lookups return `Ok(None)` instead.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Registry holds a malformed value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Builds the click counter key for a short path (`clicks:` + `/abc`).
pub fn counter_key(prefix: &str, short_path: &str) -> String {
    format!("{}{}", prefix, short_path)
}

/// Key-value operations over mapping entries and click counters.
///
/// Implementations are shared process-wide behind an `Arc` and must be safe
/// for concurrent use without external locking. Every operation is bounded
/// by the deadline the implementation was constructed with; expiry yields
/// [`RegistryError::Timeout`]. Callers cancel an operation by dropping its
/// future.
///
/// # Implementations
///
/// - [`crate::infrastructure::registry::RedisRegistry`] - Redis-backed registry
/// - [`crate::infrastructure::registry::MemoryRegistry`] - In-process registry
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    /// Reads the target URL stored under a short path.
    ///
    /// Returns `Ok(None)` if the key is absent.
    async fn get(&self, key: &str) -> RegistryResult<Option<String>>;

    /// Upserts a mapping entry without expiration.
    async fn set(&self, key: &str, value: &str) -> RegistryResult<()>;

    /// Deletes a key. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> RegistryResult<()>;

    /// Atomically increments a counter by one and returns the new value.
    ///
    /// Concurrent increments are never lost; an absent counter starts at zero.
    async fn increment(&self, counter_key: &str) -> RegistryResult<u64>;

    /// Reads a counter, treating an absent key as zero.
    async fn get_counter(&self, counter_key: &str) -> RegistryResult<u64>;

    /// Lists every key starting with `prefix`, in no particular order.
    ///
    /// Iterates the keyspace incrementally; keys written or removed while
    /// the listing runs may or may not be included.
    async fn keys_with_prefix(&self, prefix: &str) -> RegistryResult<Vec<String>>;

    /// Checks whether the backing store answers.
    async fn ping(&self) -> bool;
}

/// Runs a registry operation under a deadline.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> RegistryResult<T>
where
    F: std::future::Future<Output = RegistryResult<T>>,
{
    tokio::time::timeout(deadline, operation)
        .await
        .unwrap_or(Err(RegistryError::Timeout(deadline)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_key_uses_prefix() {
        assert_eq!(counter_key("clicks:", "/abc"), "clicks:/abc");
        assert_eq!(counter_key("", "/abc"), "/abc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_times_out() {
        let result: RegistryResult<()> = with_deadline(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(RegistryError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_with_deadline_passes_result_through() {
        let result = with_deadline(Duration::from_secs(1), async { Ok(7u64) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
