//! Security Module
//!
//! The access-control core:
//! - Role hierarchy and permission checks
//! - Role resolution from the identity collaborator
//! - Role-tiered hourly rate limiting over an atomic counter store
//! - Brute-force login detection with anonymized security events

pub mod access;
pub mod auth;
pub mod clock;
pub mod counter_store;
pub mod identity;
pub mod middleware;
pub mod monitor;
pub mod rate_limit;
pub mod redact;
pub mod resolver;
pub mod role;
pub mod telemetry;
pub mod tracker;


pub use access::{AccessControl, AccessGrant};
pub use auth::{Claims, JwtTokenGenerator, JwtVerifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter_store::{InMemoryCounterStore, RedisCounterStore};
pub use identity::{Identity, IdentityProvider, InMemoryIdentityProvider, Subscription};
pub use monitor::{BruteForceConfig, FailureAssessment, SecurityMonitor};
pub use rate_limit::{
    CounterSnapshot, CounterStore, FailurePolicy, RateLimitDecision, RateLimitInfo,
    RateLimitTiers, RateLimiter,
};
pub use resolver::{RoleResolution, RoleResolver};
pub use role::{Role, RoleFlags, has_permission, is_admin_user, is_premium_user};
pub use telemetry::{SecurityEvent, Severity, TelemetryEvent, TelemetrySink};
pub use tracker::{FailureStore, FailureWindow, InMemoryFailureStore};
