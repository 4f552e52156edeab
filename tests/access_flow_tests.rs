// Integration tests for the access flow
//
// Tests cover:
// - Quota exhaustion for a user on one endpoint
// - Store outage under both failure policies
// - Brute force detection next to rate limiting

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use lawnbud_access::error::{AppError, Result};
use lawnbud_access::security::telemetry::MemoryTelemetrySink;
use lawnbud_access::security::{
    AccessControl, BruteForceConfig, CounterSnapshot, CounterStore, FailurePolicy,
    InMemoryCounterStore, InMemoryFailureStore, InMemoryIdentityProvider, Identity,
    RateLimitTiers, RateLimiter, Role, RoleResolver, SecurityMonitor, Severity,
};

/// Counter store that replays scripted answers
#[derive(Default)]
struct ScriptedCounterStore {
    answers: Mutex<VecDeque<Result<CounterSnapshot>>>,
    calls: Mutex<Vec<(String, String, u64)>>,
}

impl ScriptedCounterStore {
    fn answer(&self, answer: Result<CounterSnapshot>) {
        self.answers.lock().push_back(answer);
    }
}

#[async_trait]
impl CounterStore for ScriptedCounterStore {
    async fn check_and_increment(
        &self,
        user_id: &str,
        endpoint: &str,
        limit: u64,
    ) -> Result<CounterSnapshot> {
        self.calls
            .lock()
            .push((user_id.to_string(), endpoint.to_string(), limit));
        self.answers
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Internal("no scripted answer".to_string())))
    }

    async fn current_count(&self, _user_id: &str, _endpoint: &str) -> Result<u64> {
        Ok(0)
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

#[tokio::test]
async fn test_weather_api_quota_runs_out_at_one_hundred() {
    let store = Arc::new(ScriptedCounterStore::default());
    store.answer(Ok(CounterSnapshot {
        allowed: true,
        current_count: 99,
        limit: 100,
    }));
    store.answer(Ok(CounterSnapshot {
        allowed: false,
        current_count: 100,
        limit: 100,
    }));
    store.answer(Ok(CounterSnapshot {
        allowed: false,
        current_count: 100,
        limit: 100,
    }));

    let limiter = RateLimiter::new(store.clone(), RateLimitTiers::default());
    let identity = Identity::new("gardener-7");

    let first = limiter
        .check_limit(Some(&identity), "weather_api", Role::User)
        .await;
    assert!(first.allowed);
    assert_eq!(first.remaining, 1);

    let second = limiter
        .check_limit(Some(&identity), "weather_api", Role::User)
        .await;
    assert!(!second.allowed);
    assert_eq!(second.remaining, 0);

    let err = limiter
        .enforce_limit(Some(&identity), "weather_api", Role::User)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AppError::RateLimitExceeded {
            endpoint: "weather_api".to_string(),
            limit: 100,
        }
    );
    let message = err.to_string();
    assert!(message.contains("weather_api"));
    assert!(message.contains("100"));

    let calls = store.calls.lock().clone();
    assert_eq!(calls.len(), 3);
    assert!(
        calls
            .iter()
            .all(|(user, endpoint, limit)| user == "gardener-7"
                && endpoint == "weather_api"
                && *limit == 100)
    );
}

#[tokio::test]
async fn test_store_outage_respects_failure_policy() {
    let identity = Identity::new("gardener-7");

    let open_store = Arc::new(ScriptedCounterStore::default());
    open_store.answer(Err(AppError::StoreUnavailable("redis down".to_string())));
    let open = RateLimiter::new(open_store, RateLimitTiers::default());
    let decision = open
        .check_limit(Some(&identity), "weather_api", Role::User)
        .await;
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 100);

    let closed_store = Arc::new(ScriptedCounterStore::default());
    closed_store.answer(Err(AppError::StoreUnavailable("redis down".to_string())));
    let closed = RateLimiter::new(closed_store, RateLimitTiers::default())
        .with_policy(FailurePolicy::FailClosed);
    let decision = closed
        .check_limit(Some(&identity), "weather_api", Role::User)
        .await;
    assert!(!decision.allowed);
    assert_eq!(decision.remaining, 0);
}

#[tokio::test]
async fn test_concurrent_callers_never_exceed_quota() {
    let tiers = RateLimitTiers {
        user: 25,
        premium: 50,
        admin: 100,
    };
    let limiter = Arc::new(RateLimiter::new(
        Arc::new(InMemoryCounterStore::new()),
        tiers,
    ));

    let mut handles = Vec::new();
    for _ in 0..80 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter
                .check_limit(Some(&Identity::new("tabs-open")), "plant_id", Role::User)
                .await
                .allowed
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 25);
}

#[tokio::test]
async fn test_login_and_access_flow() {
    let provider = Arc::new(InMemoryIdentityProvider::new());
    provider.assign_role("gardener-7", Role::Premium);

    let access = AccessControl::new(
        Arc::new(RoleResolver::new(provider.clone())),
        Arc::new(RateLimiter::new(
            Arc::new(InMemoryCounterStore::new()),
            RateLimitTiers::default(),
        )),
    );
    let sink = Arc::new(MemoryTelemetrySink::new());
    let monitor = SecurityMonitor::new(
        Arc::new(InMemoryFailureStore::new()),
        sink.clone(),
        BruteForceConfig::default(),
    );

    for _ in 0..3 {
        monitor
            .record_failure("gardener@example.com", Some("wrong password"))
            .await;
    }
    let events = sink.security_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Medium);

    monitor.record_success("gardener@example.com").await;
    let next = monitor.record_failure("gardener@example.com", None).await;
    assert_eq!(next.count, 1);
    assert!(!next.suspicious);

    let identity = Identity::new("gardener-7");
    let grant = access
        .authorize(Some(&identity), "plant_id", Role::Premium)
        .await
        .unwrap();
    assert_eq!(grant.role, Role::Premium);
    assert_eq!(grant.remaining, 999);

    let info = access.limit_info(Some(&identity), "plant_id").await;
    assert_eq!(info.current, 1);
    assert_eq!(info.limit, 1000);
    assert_eq!(info.remaining, 999);
}
