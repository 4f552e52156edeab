//! Role Resolver Module
//!
//! Resolves the caller's role from the identity collaborator and keeps a
//! cached copy current across session changes. Resolution never escalates
//! privilege on failure: anything short of a successful lookup yields
//! [`Role::User`].

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::observability::AppMetrics;
use crate::security::identity::{Identity, IdentityProvider, Subscription};
use crate::security::role::Role;

/// Resolved role plus the lookup error, if any.
///
/// `error` lets callers tell "anonymous" (no identity, no error) apart from
/// "lookup broke" (role defaulted, error set).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleResolution {
    pub identity: Option<Identity>,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoleResolution {
    pub fn anonymous() -> Self {
        Self {
            identity: None,
            role: Role::User,
            error: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn is_premium(&self) -> bool {
        self.role.is_premium()
    }

    pub fn lookup_failed(&self) -> bool {
        self.error.is_some()
    }
}

struct Watch {
    subscription: Subscription,
    task: JoinHandle<()>,
}

pub struct RoleResolver {
    provider: Arc<dyn IdentityProvider>,
    lookup_timeout: Duration,
    cached: Arc<RwLock<Option<RoleResolution>>>,
    /// Bumped on every session change; results computed under an older
    /// generation are discarded instead of cached
    generation: Arc<AtomicU64>,
    changed: Arc<Notify>,
    watch: Mutex<Option<Watch>>,
    metrics: Option<Arc<AppMetrics>>,
}

impl RoleResolver {
    pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            lookup_timeout: Self::DEFAULT_LOOKUP_TIMEOUT,
            cached: Arc::new(RwLock::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            changed: Arc::new(Notify::new()),
            watch: Mutex::new(None),
            metrics: None,
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Resolve the role for an explicit identity. Does not touch the cache.
    pub async fn resolve_role(&self, identity: Option<&Identity>) -> RoleResolution {
        let Some(identity) = identity else {
            return RoleResolution::anonymous();
        };

        let lookup = tokio::time::timeout(self.lookup_timeout, self.provider.fetch_role(identity));
        let outcome = match lookup.await {
            Ok(result) => result,
            Err(elapsed) => Err(AppError::from(elapsed)),
        };

        match outcome {
            Ok(Some(role)) => RoleResolution {
                identity: Some(identity.clone()),
                role,
                error: None,
            },
            Ok(None) => RoleResolution {
                identity: Some(identity.clone()),
                role: Role::User,
                error: None,
            },
            Err(e) => self.lookup_failure(Some(identity.clone()), e),
        }
    }

    /// Role of the current session, served from cache when still valid
    pub async fn current(&self) -> RoleResolution {
        let cached = self.cached.read().clone();
        match cached {
            Some(resolution) => resolution,
            None => self.refresh().await,
        }
    }

    /// Drop the cache and resolve the current session again
    pub async fn refresh(&self) -> RoleResolution {
        let generation = self.generation.load(Ordering::SeqCst);

        let current = tokio::time::timeout(self.lookup_timeout, self.provider.current_identity());
        let identity = match current.await {
            Ok(Ok(identity)) => identity,
            Ok(Err(e)) => return self.store(generation, self.lookup_failure(None, e)),
            Err(elapsed) => {
                return self.store(generation, self.lookup_failure(None, AppError::from(elapsed)));
            }
        };

        let resolution = self.resolve_role(identity.as_ref()).await;
        self.store(generation, resolution)
    }

    /// Forget the cached role
    pub fn invalidate(&self) {
        invalidate(&self.generation, &self.cached);
    }

    /// Subscribe to session changes and re-resolve on each one.
    ///
    /// Calling this twice replaces the earlier subscription.
    pub fn watch_sessions(self: &Arc<Self>) {
        let generation = Arc::clone(&self.generation);
        let cached = Arc::clone(&self.cached);
        let changed = Arc::clone(&self.changed);

        let subscription = self.provider.on_session_change(Arc::new(move || {
            invalidate(&generation, &cached);
            changed.notify_one();
        }));

        let resolver = Arc::downgrade(self);
        let changed = Arc::clone(&self.changed);
        let task = tokio::spawn(async move {
            loop {
                changed.notified().await;
                let Some(resolver) = resolver.upgrade() else {
                    break;
                };
                let resolution = resolver.refresh().await;
                debug!(role = %resolution.role, "Role re-resolved after session change");
            }
        });

        if let Some(previous) = self.watch.lock().replace(Watch { subscription, task }) {
            cancel_watch(previous);
        }
    }

    /// Cancel the session-change subscription, if any
    pub fn stop(&self) {
        if let Some(watch) = self.watch.lock().take() {
            cancel_watch(watch);
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watch.lock().is_some()
    }

    fn store(&self, generation: u64, resolution: RoleResolution) -> RoleResolution {
        let mut cached = self.cached.write();
        if self.generation.load(Ordering::SeqCst) == generation {
            *cached = Some(resolution.clone());
        }
        resolution
    }

    fn lookup_failure(&self, identity: Option<Identity>, error: AppError) -> RoleResolution {
        if let Some(metrics) = &self.metrics {
            metrics.record_role_lookup_failure();
        }
        warn!(
            target: "security",
            user_id = identity.as_ref().map(|i| i.user_id.as_str()).unwrap_or("-"),
            error = %error,
            "Role lookup failed, defaulting to user"
        );
        RoleResolution {
            identity,
            role: Role::User,
            error: Some(AppError::RoleLookupFailed(error.to_string()).to_string()),
        }
    }
}

fn invalidate(generation: &AtomicU64, cached: &RwLock<Option<RoleResolution>>) {
    let mut cached = cached.write();
    generation.fetch_add(1, Ordering::SeqCst);
    *cached = None;
}

fn cancel_watch(mut watch: Watch) {
    watch.subscription.cancel();
    watch.task.abort();
}

impl Drop for RoleResolver {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RoleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleResolver")
            .field("lookup_timeout", &self.lookup_timeout)
            .field("cached", &*self.cached.read())
            .field("watching", &self.is_watching())
            .finish()
    }
}
