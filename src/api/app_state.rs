use crate::observability::AppMetrics;
use crate::security::access::AccessControl;
use crate::security::auth::JwtVerifier;
use crate::security::monitor::SecurityMonitor;
use std::sync::Arc;

/// Application state containing the shared access-control components
#[derive(Clone)]
pub struct AppState {
    /// Role resolution plus rate limiting
    pub access: AccessControl,
    /// Brute-force login detection
    pub monitor: Arc<SecurityMonitor>,
    /// Bearer token validation
    pub verifier: JwtVerifier,
    /// Process-wide counters
    pub metrics: Arc<AppMetrics>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("access", &self.access)
            .field("monitor", &self.monitor)
            .field("verifier", &self.verifier)
            .finish()
    }
}

impl AppState {
    /// Create new application state
    pub fn new(
        access: AccessControl,
        monitor: Arc<SecurityMonitor>,
        verifier: JwtVerifier,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            access,
            monitor,
            verifier,
            metrics,
        }
    }
}
