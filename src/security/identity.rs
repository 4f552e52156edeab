//! Identity Collaborator Module
//!
//! The access core never authenticates anyone itself. It consumes an
//! [`IdentityProvider`] that knows the current principal, can look up the
//! principal's role, and notifies subscribers when the session changes.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::Result;
use crate::security::role::Role;

/// An established principal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id (never an email)
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_id)
    }
}

/// Callback invoked on every session change
pub type SessionCallback = Arc<dyn Fn() + Send + Sync>;

/// Handle to a session-change subscription.
///
/// Cancelling is idempotent; dropping the handle cancels it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that holds nothing
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Identity collaborator contract
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current principal, `None` when nobody is signed in
    async fn current_identity(&self) -> Result<Option<Identity>>;

    /// Look up the stored role; `Ok(None)` means no role row exists
    async fn fetch_role(&self, identity: &Identity) -> Result<Option<Role>>;

    /// Register a callback fired whenever the session changes
    fn on_session_change(&self, callback: SessionCallback) -> Subscription;
}

/// In-process identity collaborator backed by a role table.
///
/// Used by the standalone service (role table from configuration) and by tests.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    current: RwLock<Option<Identity>>,
    roles: DashMap<String, Role>,
    listeners: Arc<DashMap<u64, SessionCallback>>,
    next_listener: AtomicU64,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the role table
    pub fn with_roles(roles: HashMap<String, Role>) -> Self {
        let provider = Self::new();
        for (user_id, role) in roles {
            provider.roles.insert(user_id, role);
        }
        provider
    }

    pub fn assign_role(&self, user_id: &str, role: Role) {
        self.roles.insert(user_id.to_string(), role);
    }

    pub fn revoke_role(&self, user_id: &str) {
        self.roles.remove(user_id);
    }

    /// Switch the session to `identity` and notify subscribers
    pub fn set_identity(&self, identity: Option<Identity>) {
        *self.current.write() = identity;
        self.notify_session_change();
    }

    pub fn notify_session_change(&self) {
        // Snapshot first so callbacks may (un)subscribe without deadlocking the map
        let callbacks: Vec<SessionCallback> =
            self.listeners.iter().map(|entry| entry.value().clone()).collect();
        debug!(listeners = callbacks.len(), "Session changed");
        for callback in callbacks {
            callback();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn current_identity(&self) -> Result<Option<Identity>> {
        Ok(self.current.read().clone())
    }

    async fn fetch_role(&self, identity: &Identity) -> Result<Option<Role>> {
        Ok(self.roles.get(&identity.user_id).map(|r| *r.value()))
    }

    fn on_session_change(&self, callback: SessionCallback) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(id, callback);
        let listeners = Arc::clone(&self.listeners);
        Subscription::new(move || {
            listeners.remove(&id);
        })
    }
}
