//! Rate Limiting Module
//!
//! Per-(user, endpoint) hourly quotas with role-based tiers. Counting is
//! delegated to a [`CounterStore`] whose check-and-increment is atomic; this
//! module never reads a counter and writes it back in two steps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::observability::AppMetrics;
use crate::security::identity::Identity;
use crate::security::role::Role;

/// Hourly quota per role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitTiers {
    pub user: u64,
    pub premium: u64,
    /// Large but finite so a runaway admin session is still bounded
    pub admin: u64,
}

impl Default for RateLimitTiers {
    fn default() -> Self {
        Self {
            user: 100,
            premium: 1000,
            admin: 999_999,
        }
    }
}

impl RateLimitTiers {
    pub fn limit_for(&self, role: Role) -> u64 {
        match role {
            Role::User => self.user,
            Role::Premium => self.premium,
            Role::Admin => self.admin,
        }
    }

    /// Higher roles never get a smaller quota than lower ones
    pub fn is_monotonic(&self) -> bool {
        self.user <= self.premium && self.premium <= self.admin
    }
}

/// What to do when the counter store errors or times out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Allow the request with a full quota; rate limiting is suspended
    /// for the duration of the outage
    #[default]
    FailOpen,
    /// Deny the request
    FailClosed,
}

/// Counter state reported by one atomic check-and-increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub allowed: bool,
    pub current_count: u64,
    pub limit: u64,
}

/// Counter store collaborator.
///
/// `check_and_increment` must compare and increment as one indivisible
/// operation (transaction, script, CAS loop) for the current hour bucket.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn check_and_increment(
        &self,
        user_id: &str,
        endpoint: &str,
        limit: u64,
    ) -> Result<CounterSnapshot>;

    /// Current count for the hour bucket without incrementing
    async fn current_count(&self, user_id: &str, endpoint: &str) -> Result<u64>;

    /// Short name for logs and health checks
    fn backend_name(&self) -> &'static str;
}

/// Rate limit decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
}

impl RateLimitDecision {
    pub fn denied() -> Self {
        Self {
            allowed: false,
            remaining: 0,
        }
    }
}

/// Rate limit information for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub current: u64,
    pub limit: u64,
    pub remaining: u64,
}

/// Role-tiered rate limiter over a shared counter store
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    tiers: RateLimitTiers,
    policy: FailurePolicy,
    store_timeout: Duration,
    metrics: Option<Arc<AppMetrics>>,
}

impl RateLimiter {
    /// Default store timeout
    pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(store: Arc<dyn CounterStore>, tiers: RateLimitTiers) -> Self {
        Self {
            store,
            tiers,
            policy: FailurePolicy::default(),
            store_timeout: Self::DEFAULT_STORE_TIMEOUT,
            metrics: None,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn tiers(&self) -> &RateLimitTiers {
        &self.tiers
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn limit_for(&self, role: Role) -> u64 {
        self.tiers.limit_for(role)
    }

    /// Count this request against the caller's quota.
    ///
    /// An unknown principal is always denied. Store errors and timeouts are
    /// resolved by the configured [`FailurePolicy`].
    pub async fn check_limit(
        &self,
        identity: Option<&Identity>,
        endpoint: &str,
        role: Role,
    ) -> RateLimitDecision {
        let Some(identity) = identity else {
            debug!(endpoint, "Rate limit check without identity, denying");
            self.record_check(false);
            return RateLimitDecision::denied();
        };

        let limit = self.tiers.limit_for(role);
        let call = self
            .store
            .check_and_increment(&identity.user_id, endpoint, limit);

        let decision = match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(snapshot)) => RateLimitDecision {
                allowed: snapshot.allowed,
                remaining: snapshot.limit.saturating_sub(snapshot.current_count),
            },
            Ok(Err(e)) => self.on_store_failure(endpoint, role, limit, &e),
            Err(elapsed) => self.on_store_failure(endpoint, role, limit, &AppError::from(elapsed)),
        };

        debug!(
            user_id = %identity.user_id,
            endpoint,
            role = %role,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Rate limit checked"
        );
        self.record_check(decision.allowed);
        decision
    }

    /// Like [`check_limit`](Self::check_limit) but fails with
    /// [`AppError::RateLimitExceeded`] when the request is not allowed.
    pub async fn enforce_limit(
        &self,
        identity: Option<&Identity>,
        endpoint: &str,
        role: Role,
    ) -> Result<RateLimitDecision> {
        let decision = self.check_limit(identity, endpoint, role).await;
        if !decision.allowed {
            return Err(AppError::RateLimitExceeded {
                endpoint: endpoint.to_string(),
                limit: self.tiers.limit_for(role),
            });
        }
        Ok(decision)
    }

    /// Quota usage for display. Reads the counter without consuming quota.
    pub async fn get_limit_info(
        &self,
        identity: Option<&Identity>,
        endpoint: &str,
        role: Role,
    ) -> RateLimitInfo {
        let limit = self.tiers.limit_for(role);

        let remaining = match identity {
            None => 0,
            Some(identity) => {
                let read = self.store.current_count(&identity.user_id, endpoint);
                match tokio::time::timeout(self.store_timeout, read).await {
                    Ok(Ok(current)) => limit.saturating_sub(current),
                    Ok(Err(e)) => self.on_store_failure(endpoint, role, limit, &e).remaining,
                    Err(elapsed) => {
                        self.on_store_failure(endpoint, role, limit, &AppError::from(elapsed))
                            .remaining
                    }
                }
            }
        };

        RateLimitInfo {
            current: limit - remaining,
            limit,
            remaining,
        }
    }

    fn on_store_failure(
        &self,
        endpoint: &str,
        role: Role,
        limit: u64,
        error: &AppError,
    ) -> RateLimitDecision {
        if let Some(metrics) = &self.metrics {
            metrics.record_store_failure();
        }

        match self.policy {
            FailurePolicy::FailOpen => {
                warn!(
                    target: "security",
                    backend = self.store.backend_name(),
                    endpoint,
                    role = %role,
                    error = %error,
                    "Counter store unavailable, failing open: rate limiting suspended"
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: limit,
                }
            }
            FailurePolicy::FailClosed => {
                warn!(
                    target: "security",
                    backend = self.store.backend_name(),
                    endpoint,
                    role = %role,
                    error = %error,
                    "Counter store unavailable, failing closed"
                );
                RateLimitDecision::denied()
            }
        }
    }

    fn record_check(&self, allowed: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_rate_limit_check(allowed);
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend", &self.store.backend_name())
            .field("tiers", &self.tiers)
            .field("policy", &self.policy)
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}
