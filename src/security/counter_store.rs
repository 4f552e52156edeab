//! Counter Store Backends
//!
//! Hourly request counters keyed by `(user_id, endpoint, hour_bucket)`:
//! - Redis for counters shared across processes and devices
//! - In-memory for development and single-instance deployments

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::security::clock::{Clock, SystemClock};
use crate::security::rate_limit::{CounterSnapshot, CounterStore};

/// Seconds in one counting window
pub const WINDOW_SECS: i64 = 3600;

/// Index of the hour containing `at`
pub fn hour_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(WINDOW_SECS)
}

/// Storage key for one counter
pub fn counter_key(prefix: &str, user_id: &str, endpoint: &str, bucket: i64) -> String {
    format!("{}:{}:{}:{}", prefix, user_id, endpoint, bucket)
}

/// Compare-and-increment executed server side so no other client can
/// interleave. Returns `{allowed, count}`.
const CHECK_AND_INCREMENT_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local limit = tonumber(ARGV[1])
if current >= limit then
  return {0, current}
end
current = redis.call('INCR', KEYS[1])
if current == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return {1, current}
"#;

/// Redis-backed counter store
#[derive(Clone)]
pub struct RedisCounterStore {
    connection_manager: ConnectionManager,
    script: Arc<redis::Script>,
    key_prefix: String,
    clock: Arc<dyn Clock>,
}

impl RedisCounterStore {
    /// Connect and verify the server answers PING
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("Failed to create Redis client for rate limiting: {}", e);
            AppError::StoreUnavailable(format!("Failed to create Redis client: {}", e))
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            warn!("Failed to create connection manager for rate limiting: {}", e);
            AppError::StoreUnavailable(format!("Failed to create connection manager: {}", e))
        })?;

        let mut conn = connection_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        debug!("Connected to Redis for rate limiting");

        Ok(Self {
            connection_manager,
            script: Arc::new(redis::Script::new(CHECK_AND_INCREMENT_SCRIPT)),
            key_prefix: key_prefix.into(),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn key(&self, user_id: &str, endpoint: &str) -> String {
        counter_key(&self.key_prefix, user_id, endpoint, hour_bucket(self.clock.now()))
    }

    /// Round-trip used by readiness checks
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn check_and_increment(
        &self,
        user_id: &str,
        endpoint: &str,
        limit: u64,
    ) -> Result<CounterSnapshot> {
        let mut conn = self.connection_manager.clone();
        let (allowed, current_count): (i64, u64) = self
            .script
            .key(self.key(user_id, endpoint))
            .arg(limit)
            .arg(WINDOW_SECS)
            .invoke_async(&mut conn)
            .await?;

        Ok(CounterSnapshot {
            allowed: allowed == 1,
            current_count,
            limit,
        })
    }

    async fn current_count(&self, user_id: &str, endpoint: &str) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let value: Option<u64> = redis::cmd("GET")
            .arg(self.key(user_id, endpoint))
            .query_async(&mut conn)
            .await?;
        Ok(value.unwrap_or(0))
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

/// In-memory counter store for a single process.
///
/// Each key's compare-and-increment runs under its DashMap shard lock.
/// Counters from earlier hours are dropped lazily on access and by
/// [`purge_stale`](Self::purge_stale).
pub struct InMemoryCounterStore {
    counters: DashMap<String, u64>,
    key_prefix: String,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            key_prefix: "rate_limit".to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Remove counters for hours other than the current one
    pub fn purge_stale(&self) -> usize {
        let suffix = format!(":{}", hour_bucket(self.clock.now()));
        let before = self.counters.len();
        self.counters.retain(|key, _| key.ends_with(&suffix));
        before.saturating_sub(self.counters.len())
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn key(&self, user_id: &str, endpoint: &str) -> String {
        counter_key(&self.key_prefix, user_id, endpoint, hour_bucket(self.clock.now()))
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn check_and_increment(
        &self,
        user_id: &str,
        endpoint: &str,
        limit: u64,
    ) -> Result<CounterSnapshot> {
        let mut count = self.counters.entry(self.key(user_id, endpoint)).or_insert(0);
        let allowed = *count < limit;
        if allowed {
            *count += 1;
        }
        Ok(CounterSnapshot {
            allowed,
            current_count: *count,
            limit,
        })
    }

    async fn current_count(&self, user_id: &str, endpoint: &str) -> Result<u64> {
        Ok(self
            .counters
            .get(&self.key(user_id, endpoint))
            .map(|c| *c.value())
            .unwrap_or(0))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for InMemoryCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCounterStore")
            .field("key_prefix", &self.key_prefix)
            .field("counters", &self.counters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::ManualClock;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_hour_bucket_boundaries() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(hour_bucket(t), hour_bucket(t + Duration::minutes(59)));
        assert_ne!(hour_bucket(t), hour_bucket(t + Duration::minutes(60)));
    }

    #[tokio::test]
    async fn test_in_memory_stops_at_limit() {
        let store = InMemoryCounterStore::new();

        for expected in 1..=3 {
            let snap = store.check_and_increment("u1", "save_event", 3).await.unwrap();
            assert!(snap.allowed);
            assert_eq!(snap.current_count, expected);
        }

        let denied = store.check_and_increment("u1", "save_event", 3).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.current_count, 3);
        assert_eq!(store.current_count("u1", "save_event").await.unwrap(), 3);
        assert_eq!(store.current_count("u1", "weather_api").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_in_memory_resets_on_new_hour() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = InMemoryCounterStore::new().with_clock(clock.clone());

        store.check_and_increment("u1", "weather_api", 1).await.unwrap();
        assert!(!store.check_and_increment("u1", "weather_api", 1).await.unwrap().allowed);

        clock.advance(Duration::minutes(30));
        assert!(store.check_and_increment("u1", "weather_api", 1).await.unwrap().allowed);

        assert_eq!(store.purge_stale(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_memory_never_exceeds_limit_under_concurrency() {
        let store = Arc::new(InMemoryCounterStore::new());
        let mut handles = Vec::new();
        for _ in 0..200 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .check_and_increment("u1", "weather_api", 100)
                    .await
                    .unwrap()
                    .allowed
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 100);
        assert_eq!(store.current_count("u1", "weather_api").await.unwrap(), 100);
    }
}
