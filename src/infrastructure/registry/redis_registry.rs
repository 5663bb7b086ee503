//! Redis-backed registry.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::{debug, info};

use crate::domain::repositories::{Registry, RegistryError, RegistryResult, with_deadline};

/// Registry stored in Redis.
///
/// Mapping entries are plain string keys (`/abc` → target URL) without TTL;
/// click counters are integer keys updated with `INCR`. The underlying
/// `ConnectionManager` multiplexes one connection, reconnects on failure and
/// is cheap to clone, so one instance is shared by the reconciler and the
/// redirect handlers.
pub struct RedisRegistry {
    client: ConnectionManager,
    op_timeout: Duration,
}

impl RedisRegistry {
    /// Connects to Redis and validates the connection with a PING.
    ///
    /// # Arguments
    ///
    /// - `redis_url` - Redis connection string (e.g., `"redis://localhost:6379"`)
    /// - `op_timeout` - deadline applied to every registry operation
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unavailable`] if the URL is invalid, the
    /// connection cannot be established, or the PING fails.
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> RegistryResult<Self> {
        info!("Connecting to Redis registry");

        let client = Client::open(redis_url).map_err(|e| {
            RegistryError::Unavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let manager = with_deadline(op_timeout, async {
            ConnectionManager::new(client).await.map_err(|e| {
                RegistryError::Unavailable(format!("Failed to connect to Redis: {}", e))
            })
        })
        .await?;

        let mut test_conn = manager.clone();
        with_deadline(op_timeout, async {
            test_conn
                .ping::<()>()
                .await
                .map_err(|e| RegistryError::Unavailable(format!("Redis PING failed: {}", e)))
        })
        .await?;

        info!("✓ Connected to Redis registry");

        Ok(Self {
            client: manager,
            op_timeout,
        })
    }
}

/// Keys requested per `SCAN` round trip.
const SCAN_PAGE_SIZE: usize = 500;

/// Escapes Redis glob metacharacters so `prefix` matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn unavailable(e: redis::RedisError) -> RegistryError {
    RegistryError::Unavailable(e.to_string())
}

#[async_trait]
impl Registry for RedisRegistry {
    async fn get(&self, key: &str) -> RegistryResult<Option<String>> {
        let mut conn = self.client.clone();
        with_deadline(self.op_timeout, async {
            conn.get::<_, Option<String>>(key).await.map_err(unavailable)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> RegistryResult<()> {
        let mut conn = self.client.clone();
        with_deadline(self.op_timeout, async {
            conn.set::<_, _, ()>(key, value).await.map_err(unavailable)
        })
        .await?;
        debug!(key, value, "Registry SET");
        Ok(())
    }

    async fn delete(&self, key: &str) -> RegistryResult<()> {
        let mut conn = self.client.clone();
        let deleted = with_deadline(self.op_timeout, async {
            conn.del::<_, i64>(key).await.map_err(unavailable)
        })
        .await?;
        if deleted > 0 {
            debug!(key, "Registry DEL");
        }
        Ok(())
    }

    async fn increment(&self, counter_key: &str) -> RegistryResult<u64> {
        let mut conn = self.client.clone();
        let value = with_deadline(self.op_timeout, async {
            conn.incr::<_, _, i64>(counter_key, 1).await.map_err(unavailable)
        })
        .await?;

        u64::try_from(value).map_err(|_| RegistryError::InvalidValue {
            key: counter_key.to_string(),
            reason: format!("negative counter {}", value),
        })
    }

    async fn get_counter(&self, counter_key: &str) -> RegistryResult<u64> {
        let mut conn = self.client.clone();
        let raw = with_deadline(self.op_timeout, async {
            conn.get::<_, Option<String>>(counter_key)
                .await
                .map_err(unavailable)
        })
        .await?;

        match raw {
            None => Ok(0),
            Some(raw) => raw.parse().map_err(|_| RegistryError::InvalidValue {
                key: counter_key.to_string(),
                reason: format!("not a counter: {:?}", raw),
            }),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> RegistryResult<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.client.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, page): (u64, Vec<String>) = with_deadline(self.op_timeout, async {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_PAGE_SIZE)
                    .query_async(&mut conn)
                    .await
                    .map_err(unavailable)
            })
            .await?;

            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(prefix, keys = keys.len(), "Registry SCAN");
        Ok(keys)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.client.clone();
        with_deadline(self.op_timeout, async {
            conn.ping::<()>().await.map_err(unavailable)
        })
        .await
        .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("clicks:"), "clicks:");
        assert_eq!(escape_glob("/"), "/");
        assert_eq!(escape_glob("a*b?[c]"), r"a\*b\?\[c\]");
    }
}
