//! Security Monitor Module
//!
//! Watches authentication outcomes for brute-force patterns: N failures for
//! one identifier inside a rolling window raise a medium-severity security
//! event. A single success clears the identifier.

use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::config::BruteForceSettings;
use crate::observability::AppMetrics;
use crate::security::clock::{Clock, SystemClock};
use crate::security::redact::{DEFAULT_ERROR_MAX_LEN, hash_identifier, normalize_error};
use crate::security::telemetry::{
    AuthEvent, AuthEventKind, SecurityEvent, Severity, TelemetryEvent, TelemetrySink,
};
use crate::security::tracker::{FailureStore, FailureWindow};

/// Brute force detection parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BruteForceConfig {
    /// Failures within the window that flag an identifier
    pub threshold: u32,
    /// Rolling window length
    pub window: Duration,
    /// Idle entries older than this are evicted
    pub tracker_ttl: Duration,
    /// Upper bound on one telemetry append
    pub telemetry_timeout: std::time::Duration,
    /// Cap on normalized error messages attached to auth events
    pub error_max_len: usize,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            window: Duration::minutes(5),
            tracker_ttl: Duration::minutes(10),
            telemetry_timeout: std::time::Duration::from_secs(2),
            error_max_len: DEFAULT_ERROR_MAX_LEN,
        }
    }
}

impl From<&BruteForceSettings> for BruteForceConfig {
    fn from(settings: &BruteForceSettings) -> Self {
        Self {
            threshold: settings.threshold,
            window: Duration::seconds(settings.window_secs as i64),
            tracker_ttl: Duration::seconds(settings.tracker_ttl_secs as i64),
            telemetry_timeout: std::time::Duration::from_millis(settings.telemetry_timeout_ms),
            error_max_len: settings.error_max_len,
        }
    }
}

/// Outcome of reporting one failed login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailureAssessment {
    /// Failures counted in the current window
    pub count: u32,
    /// Threshold reached inside the window
    pub suspicious: bool,
}

pub struct SecurityMonitor {
    store: Arc<dyn FailureStore>,
    sink: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    config: BruteForceConfig,
    metrics: Option<Arc<AppMetrics>>,
    detached_telemetry: bool,
}

impl SecurityMonitor {
    pub fn new(
        store: Arc<dyn FailureStore>,
        sink: Arc<dyn TelemetrySink>,
        config: BruteForceConfig,
    ) -> Self {
        Self {
            store,
            sink,
            clock: Arc::new(SystemClock),
            config,
            metrics: None,
            detached_telemetry: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Emit telemetry from spawned tasks instead of awaiting each append.
    /// Requires a running tokio runtime.
    pub fn with_detached_telemetry(mut self) -> Self {
        self.detached_telemetry = true;
        self
    }

    pub fn config(&self) -> &BruteForceConfig {
        &self.config
    }

    /// Report a failed login for `identifier`.
    ///
    /// The tracker transition is applied before any telemetry is awaited, so
    /// a success reported for the same identifier afterwards always wins.
    /// Emits a `login_failed` auth event (error text normalized) and, once the
    /// count reaches the threshold inside the window, a brute-force security
    /// event on every further failure. Never fails: store and telemetry
    /// problems are logged and absorbed.
    pub async fn record_failure(&self, identifier: &str, error: Option<&str>) -> FailureAssessment {
        let key = hash_identifier(identifier);
        let now = self.clock.now();

        if let Some(metrics) = &self.metrics {
            metrics.record_login_failure();
        }

        let tracked = self
            .store
            .record_failure(&key, now, self.config.window)
            .await;

        let mut auth_event = AuthEvent::new(AuthEventKind::LoginFailed, now);
        if let Some(error) = error {
            auth_event =
                auth_event.with_metadata("error", normalize_error(error, self.config.error_max_len));
        }

        let state = match tracked {
            Ok(state) => state,
            Err(e) => {
                warn!(target: "security", identifier_hash = %key, error = %e, "Failure tracker unavailable, skipping brute force check");
                self.emit(TelemetryEvent::Auth(auth_event)).await;
                return FailureAssessment {
                    count: 0,
                    suspicious: false,
                };
            }
        };

        debug!(
            identifier_hash = %key,
            failed_attempts = state.count,
            threshold = self.config.threshold,
            "Recorded failed login"
        );

        let suspicious = state.count >= self.config.threshold;
        self.emit(TelemetryEvent::Auth(auth_event)).await;
        if suspicious {
            self.report_brute_force(&key, &state).await;
        }

        FailureAssessment {
            count: state.count,
            suspicious,
        }
    }

    /// Report a successful login; the identifier returns to the clean state.
    pub async fn record_success(&self, identifier: &str) {
        let key = hash_identifier(identifier);

        if let Err(e) = self.store.clear(&key).await {
            warn!(target: "security", identifier_hash = %key, error = %e, "Failed to clear failure tracker");
        }

        debug!(identifier_hash = %key, "Failure tracker cleared after successful login");

        self.emit(TelemetryEvent::Auth(AuthEvent::new(
            AuthEventKind::LoginSuccess,
            self.clock.now(),
        )))
        .await;
    }

    /// Current window for `identifier`, if it is being tracked
    pub async fn failure_state(&self, identifier: &str) -> Option<FailureWindow> {
        self.store
            .get(&hash_identifier(identifier))
            .await
            .ok()
            .flatten()
    }

    /// Evict tracker entries idle longer than the configured TTL
    pub async fn evict_expired(&self) -> usize {
        match self
            .store
            .evict_expired(self.clock.now(), self.config.tracker_ttl)
            .await
        {
            Ok(evicted) => {
                if evicted > 0 {
                    debug!(evicted, "Evicted idle failure trackers");
                }
                evicted
            }
            Err(e) => {
                warn!(error = %e, "Failure tracker eviction failed");
                0
            }
        }
    }

    async fn report_brute_force(&self, key: &str, state: &FailureWindow) {
        warn!(
            target: "security",
            identifier_hash = %key,
            failed_attempts = state.count,
            "Brute force suspected"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_brute_force_event();
        }

        let event = SecurityEvent::new(
            Severity::Medium,
            format!(
                "brute force suspected: {} failed logins in {}m",
                state.count,
                self.config.window.num_minutes()
            ),
            self.clock.now(),
        )
        .with_metadata("identifier_hash", key)
        .with_metadata("failed_attempt_count", state.count);

        self.emit(TelemetryEvent::Security(event)).await;
    }

    /// Best-effort append bounded by the telemetry timeout. Detached monitors
    /// hand the append to a spawned task and return at once.
    async fn emit(&self, event: TelemetryEvent) {
        let sink = self.sink.clone();
        let metrics = self.metrics.clone();
        let timeout = self.config.telemetry_timeout;

        if self.detached_telemetry {
            tokio::spawn(deliver(sink, metrics, timeout, event));
        } else {
            deliver(sink, metrics, timeout, event).await;
        }
    }
}

async fn deliver(
    sink: Arc<dyn TelemetrySink>,
    metrics: Option<Arc<AppMetrics>>,
    timeout: std::time::Duration,
    event: TelemetryEvent,
) {
    let failure = match tokio::time::timeout(timeout, sink.append(event)).await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(_) => "timed out".to_string(),
    };

    if let Some(metrics) = &metrics {
        metrics.record_telemetry_failure();
    }
    warn!(target: "security", error = %failure, "Dropping telemetry event");
}

impl std::fmt::Debug for SecurityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityMonitor")
            .field("config", &self.config)
            .field("detached_telemetry", &self.detached_telemetry)
            .finish()
    }
}
