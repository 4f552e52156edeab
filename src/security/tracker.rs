//! Failed Login Tracker
//!
//! Per-identifier failure windows. Each identifier is either clean (absent)
//! or tracking `{count, window_start}`. A failure outside the window
//! re-anchors it at `count = 1`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureWindow {
    /// Failures counted in the current window
    pub count: u32,
    /// Time of the first failure in the current window
    pub window_start: DateTime<Utc>,
}

impl FailureWindow {
    fn start(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    /// Window length is inclusive: a failure exactly `window` after the
    /// anchor still counts.
    pub fn is_expired(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.window_start > window
    }

    /// Apply one failure and return the new state
    pub fn advance(current: Option<Self>, now: DateTime<Utc>, window: Duration) -> Self {
        match current {
            Some(state) if !state.is_expired(now, window) => Self {
                count: state.count.saturating_add(1),
                ..state
            },
            _ => Self::start(now),
        }
    }
}

/// Storage for failure windows.
///
/// `record_failure` must apply the transition atomically per key so
/// concurrent reports for one identifier are serialized.
#[async_trait]
pub trait FailureStore: Send + Sync {
    async fn record_failure(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<FailureWindow>;

    async fn get(&self, key: &str) -> Result<Option<FailureWindow>>;

    async fn clear(&self, key: &str) -> Result<()>;

    /// Drop entries anchored more than `ttl` ago; returns how many were removed
    async fn evict_expired(&self, now: DateTime<Utc>, ttl: Duration) -> Result<usize>;
}

/// Process-local failure store
#[derive(Debug, Default)]
pub struct InMemoryFailureStore {
    windows: DashMap<String, FailureWindow>,
}

impl InMemoryFailureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl FailureStore for InMemoryFailureStore {
    async fn record_failure(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<FailureWindow> {
        // The entry guard holds the shard lock for the whole transition
        let next = match self.windows.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let next = FailureWindow::advance(Some(*occupied.get()), now, window);
                occupied.insert(next);
                next
            }
            Entry::Vacant(vacant) => *vacant.insert(FailureWindow::advance(None, now, window)),
        };
        Ok(next)
    }

    async fn get(&self, key: &str) -> Result<Option<FailureWindow>> {
        Ok(self.windows.get(key).map(|w| *w.value()))
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.windows.remove(key);
        Ok(())
    }

    async fn evict_expired(&self, now: DateTime<Utc>, ttl: Duration) -> Result<usize> {
        let before = self.windows.len();
        self.windows.retain(|_, w| now - w.window_start <= ttl);
        Ok(before.saturating_sub(self.windows.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_within_window_increments() {
        let t0 = Utc::now();
        let window = Duration::minutes(5);

        let first = FailureWindow::advance(None, t0, window);
        let second = FailureWindow::advance(Some(first), t0 + Duration::minutes(2), window);

        assert_eq!(first.count, 1);
        assert_eq!(second.count, 2);
        assert_eq!(second.window_start, t0);
    }

    #[test]
    fn test_advance_after_window_reanchors() {
        let t0 = Utc::now();
        let window = Duration::minutes(5);
        let state = FailureWindow {
            count: 2,
            window_start: t0,
        };

        let next = FailureWindow::advance(Some(state), t0 + Duration::minutes(6), window);
        assert_eq!(next.count, 1);
        assert_eq!(next.window_start, t0 + Duration::minutes(6));
    }

    #[tokio::test]
    async fn test_store_clear_and_evict() {
        let store = InMemoryFailureStore::new();
        let t0 = Utc::now();
        let window = Duration::minutes(5);

        store.record_failure("a", t0, window).await.unwrap();
        store.record_failure("b", t0 + Duration::minutes(9), window).await.unwrap();
        store.clear("missing").await.unwrap();
        assert_eq!(store.len(), 2);

        let evicted = store
            .evict_expired(t0 + Duration::minutes(11), Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(evicted, 1);
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.get("b").await.unwrap().is_some());
    }
}
