//! Audit event sink.
//!
//! Every state transition of a heal run is reported here with the run id as
//! correlation key. The default sink forwards to `tracing` so events land in
//! the same stream as operational logs; the trait seam lets tests capture
//! events and future deployments ship them elsewhere.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{error, info, warn};

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "info",
            AuditLevel::Warning => "warning",
            AuditLevel::Error => "error",
        }
    }
}

/// Destination for heal-run audit events.
pub trait AuditSink: Send + Sync {
    /// Record one event. `correlation_id` ties every event of a run together.
    fn record(
        &self,
        level: AuditLevel,
        event: &str,
        correlation_id: &str,
        metadata: HashMap<String, Value>,
    );
}

/// Sink that emits audit events as structured tracing records.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn record(
        &self,
        level: AuditLevel,
        event: &str,
        correlation_id: &str,
        metadata: HashMap<String, Value>,
    ) {
        let metadata = redact(metadata);
        let payload = serde_json::to_string(&metadata).unwrap_or_else(|_| "{}".to_string());

        match level {
            AuditLevel::Info => info!(
                target: "audit",
                event = event,
                correlation_id = correlation_id,
                metadata = %payload,
                "audit"
            ),
            AuditLevel::Warning => warn!(
                target: "audit",
                event = event,
                correlation_id = correlation_id,
                metadata = %payload,
                "audit"
            ),
            AuditLevel::Error => error!(
                target: "audit",
                event = event,
                correlation_id = correlation_id,
                metadata = %payload,
                "audit"
            ),
        }
    }
}

const SENSITIVE_KEY_FRAGMENTS: &[&str] = &["token", "secret", "key", "password", "credential"];

/// Replace values under credential-looking keys before anything is logged.
fn redact(metadata: HashMap<String, Value>) -> HashMap<String, Value> {
    metadata
        .into_iter()
        .map(|(key, value)| {
            let lower = key.to_lowercase();
            if SENSITIVE_KEY_FRAGMENTS.iter().any(|f| lower.contains(f)) {
                (key, Value::String("[REDACTED]".to_string()))
            } else {
                (key, value)
            }
        })
        .collect()
}
