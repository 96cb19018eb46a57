//! Named mutual exclusion over the Redis transport
//!
//! For actions at most one process may perform at a time (e.g. handling a
//! stop command during a rolling deploy). Locks are leased: they expire
//! after their TTL even if the holder dies, and release is guarded so an
//! expired holder cannot delete a successor's lock.

use crate::errors::{CoreError, CoreResult};
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Factory for named distributed locks
#[derive(Clone)]
pub struct LockManager {
    conn: ConnectionManager,
    key_prefix: String,
}

impl LockManager {
    pub async fn connect(redis_url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CoreError::external("redis", e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CoreError::external("redis", e.to_string()))?;

        Ok(Self {
            conn,
            key_prefix: "wacast:lock:".to_string(),
        })
    }

    /// Try to take the named lock; None when another holder owns it
    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> CoreResult<Option<LockGuard>> {
        let key = format!("{}{}", self.key_prefix, name);
        let token = Uuid::new_v4().to_string();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| CoreError::external("redis", e.to_string()))?;

        if acquired.is_none() {
            return Ok(None);
        }

        debug!(name, "acquired distributed lock");

        Ok(Some(LockGuard {
            conn: self.conn.clone(),
            key,
            token,
        }))
    }
}

/// A held lock; call [`LockGuard::release`] when done. An unreleased guard
/// expires with its TTL.
pub struct LockGuard {
    conn: ConnectionManager,
    key: String,
    token: String,
}

impl LockGuard {
    /// Release the lock if this guard still holds it
    pub async fn release(self) -> CoreResult<()> {
        let released: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| CoreError::external("redis", e.to_string()))?;

        if released == 0 {
            debug!(key = %self.key, "lock already expired at release");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_acquire_and_release_roundtrip() {
        // This test requires a Redis instance running
        // Skip in CI or when Redis is not available
        if std::env::var("REDIS_URL").is_err() {
            println!("Skipping distributed lock test - REDIS_URL not set");
            return;
        }

        let redis_url = std::env::var("REDIS_URL").unwrap();
        let manager = LockManager::connect(&redis_url).await.unwrap();
        let name = format!("test-roundtrip-{}", Uuid::new_v4());

        let guard = manager
            .try_acquire(&name, Duration::from_secs(5))
            .await
            .unwrap()
            .expect("first acquire should win");

        // A contender is refused while the lock is held.
        let contender = manager
            .try_acquire(&name, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(contender.is_none());

        guard.release().await.unwrap();

        // A released lock can be taken again.
        let retaken = manager
            .try_acquire(&name, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(retaken.is_some());
        retaken.unwrap().release().await.unwrap();
    }

    #[tokio::test]
    async fn expired_guard_cannot_release_a_successor() {
        // This test requires a Redis instance running
        // Skip in CI or when Redis is not available
        if std::env::var("REDIS_URL").is_err() {
            println!("Skipping distributed lock test - REDIS_URL not set");
            return;
        }

        let redis_url = std::env::var("REDIS_URL").unwrap();
        let manager = LockManager::connect(&redis_url).await.unwrap();
        let name = format!("test-cas-{}", Uuid::new_v4());

        let stale = manager
            .try_acquire(&name, Duration::from_millis(100))
            .await
            .unwrap()
            .expect("first acquire should win");

        // Let the lease lapse, then hand the lock to a successor.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let successor = manager
            .try_acquire(&name, Duration::from_secs(5))
            .await
            .unwrap()
            .expect("expired lock should be acquirable");

        // The stale guard's release must not delete the successor's lock.
        stale.release().await.unwrap();
        let contender = manager
            .try_acquire(&name, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(contender.is_none());

        successor.release().await.unwrap();
    }
}
