//! Telemetry Collaborator Module
//!
//! Security and auth events are append-only records handed to a
//! [`TelemetrySink`]. Sinks may fail; callers in this crate always treat
//! telemetry as best-effort.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, Result};

/// Security event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Suspicious-activity record. Metadata must never hold raw identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub severity: Severity,
    pub reason: String,
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(severity: Severity, reason: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            severity,
            reason: reason.into(),
            metadata: Map::new(),
            timestamp,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Authentication outcome kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    LoginSuccess,
    LoginFailed,
}

/// Authentication outcome record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthEvent {
    pub name: AuthEventKind,
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl AuthEvent {
    pub fn new(name: AuthEventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            name,
            metadata: Map::new(),
            timestamp,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Security(SecurityEvent),
    Auth(AuthEvent),
}

/// Telemetry collaborator contract
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn append(&self, event: TelemetryEvent) -> Result<()>;
}

/// Writes events to the `telemetry` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTelemetrySink;

#[async_trait]
impl TelemetrySink for LogTelemetrySink {
    async fn append(&self, event: TelemetryEvent) -> Result<()> {
        match &event {
            TelemetryEvent::Security(e) => info!(
                target: "telemetry",
                severity = %e.severity,
                reason = %e.reason,
                metadata = %serde_json::Value::Object(e.metadata.clone()),
                "security_event"
            ),
            TelemetryEvent::Auth(e) => info!(
                target: "telemetry",
                name = ?e.name,
                metadata = %serde_json::Value::Object(e.metadata.clone()),
                "auth_event"
            ),
        }
        Ok(())
    }
}

/// POSTs each event as JSON to a collector endpoint
#[derive(Debug, Clone)]
pub struct WebhookTelemetrySink {
    client: reqwest::Client,
    url: String,
}

impl WebhookTelemetrySink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("telemetry client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TelemetrySink for WebhookTelemetrySink {
    async fn append(&self, event: TelemetryEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&event)
            .send()
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("telemetry webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::StoreUnavailable(format!(
                "telemetry webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Keeps events in memory; handy for tests and local inspection
#[derive(Debug, Default)]
pub struct MemoryTelemetrySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::Security(s) => Some(s.clone()),
                TelemetryEvent::Auth(_) => None,
            })
            .collect()
    }

    pub fn auth_events(&self) -> Vec<AuthEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::Auth(a) => Some(a.clone()),
                TelemetryEvent::Security(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetrySink {
    async fn append(&self, event: TelemetryEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = TelemetryEvent::Security(
            SecurityEvent::new(Severity::Medium, "brute force suspected", Utc::now())
                .with_metadata("failed_attempt_count", 3),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "security");
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["metadata"]["failed_attempt_count"], 3);
    }

    #[tokio::test]
    async fn test_log_sink_accepts_both_kinds() {
        let sink = LogTelemetrySink;
        let security = SecurityEvent::new(Severity::Medium, "brute force suspected", Utc::now())
            .with_metadata("identifier_hash", "abc123");
        let auth = AuthEvent::new(AuthEventKind::LoginFailed, Utc::now())
            .with_metadata("error", "invalid password");

        assert!(sink.append(TelemetryEvent::Security(security)).await.is_ok());
        assert!(sink.append(TelemetryEvent::Auth(auth)).await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_sink_splits_kinds() {
        let sink = MemoryTelemetrySink::new();
        sink.append(TelemetryEvent::Auth(AuthEvent::new(
            AuthEventKind::LoginFailed,
            Utc::now(),
        )))
        .await
        .unwrap();
        sink.append(TelemetryEvent::Security(SecurityEvent::new(
            Severity::High,
            "test",
            Utc::now(),
        )))
        .await
        .unwrap();

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.auth_events().len(), 1);
        assert_eq!(sink.security_events()[0].severity, Severity::High);
    }
}
