//! Per-resource rate limiter with failure-triggered circuit blocking.
//!
//! Two independent denial conditions, reported separately because callers
//! react differently to each:
//!
//! - **Window cap**: at most N attempts per resource within a trailing
//!   window. Self-clears as attempts age out; the decision carries the time
//!   the oldest attempt leaves the window.
//! - **Circuit block**: sticky deny entered after consecutive failures.
//!   Ignores elapsed time entirely; only `unblock` or `reset` clears it.
//!
//! The limiter never returns errors - every outcome is data. A periodic
//! sweep evicts records idle longer than the TTL; the sweep task is owned
//! by a handle and stopped on shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HealingConfig;

/// One recorded attempt against a resource.
#[derive(Debug, Clone, Serialize)]
pub struct Attempt {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

/// Per-resource limiter state, created lazily on first attempt or check.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitRecord {
    pub resource_id: String,
    pub attempts: Vec<Attempt>,
    pub consecutive_failures: u32,
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    pub last_attempt: DateTime<Utc>,
}

impl RateLimitRecord {
    fn new(resource_id: &str) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            attempts: Vec::new(),
            consecutive_failures: 0,
            blocked: false,
            block_reason: None,
            last_attempt: Utc::now(),
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the window cap self-clears, for window denials only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl RateLimitDecision {
    fn allowed(remaining: u32, consecutive_failures: u32) -> Self {
        Self {
            allowed: true,
            remaining_attempts: remaining,
            reason: None,
            reset_at: None,
            consecutive_failures,
        }
    }
}

/// Per-resource sliding-window limiter with sticky circuit blocking.
pub struct RateLimiter {
    window_secs: u64,
    max_attempts: u32,
    failure_threshold: u32,
    record_ttl_secs: u64,
    sweep_interval_secs: u64,
    records: RwLock<HashMap<String, RateLimitRecord>>,
}

impl RateLimiter {
    /// Create a limiter from healing configuration.
    pub fn new(config: &HealingConfig) -> Self {
        Self {
            window_secs: config.rate_limit_window_secs,
            max_attempts: config.max_attempts_per_window,
            failure_threshold: config.consecutive_failure_threshold,
            record_ttl_secs: config.record_ttl_secs,
            sweep_interval_secs: config.sweep_interval_secs,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Check whether an attempt against a resource is currently allowed.
    ///
    /// Does not record anything; call [`RateLimiter::record_attempt`] once
    /// the attempt reaches a terminal outcome.
    pub async fn check_rate_limit(&self, resource_id: &str) -> RateLimitDecision {
        let records = self.records.read().await;

        let Some(record) = records.get(resource_id) else {
            return RateLimitDecision::allowed(self.max_attempts, 0);
        };

        // The circuit block is sticky: elapsed time and window occupancy
        // are irrelevant until someone explicitly unblocks.
        if record.blocked {
            return RateLimitDecision {
                allowed: false,
                remaining_attempts: 0,
                reason: record.block_reason.clone(),
                reset_at: None,
                consecutive_failures: record.consecutive_failures,
            };
        }

        let window_start = Utc::now() - chrono::Duration::seconds(self.window_secs as i64);
        let in_window: Vec<&Attempt> = record
            .attempts
            .iter()
            .filter(|a| a.timestamp > window_start)
            .collect();

        if in_window.len() as u32 >= self.max_attempts {
            let oldest = in_window
                .iter()
                .map(|a| a.timestamp)
                .min()
                .unwrap_or_else(Utc::now);
            return RateLimitDecision {
                allowed: false,
                remaining_attempts: 0,
                reason: Some(format!(
                    "Rate limit exceeded: {} attempts per {}",
                    self.max_attempts,
                    self.window_description()
                )),
                reset_at: Some(oldest + chrono::Duration::seconds(self.window_secs as i64)),
                consecutive_failures: record.consecutive_failures,
            };
        }

        RateLimitDecision::allowed(
            self.max_attempts - in_window.len() as u32,
            record.consecutive_failures,
        )
    }

    /// Record the terminal outcome of one attempt.
    ///
    /// Success zeroes the failure streak and clears any block; failure
    /// extends the streak and trips the circuit at the threshold.
    pub async fn record_attempt(&self, resource_id: &str, success: bool) {
        let mut records = self.records.write().await;
        let record = records
            .entry(resource_id.to_string())
            .or_insert_with(|| RateLimitRecord::new(resource_id));

        let now = Utc::now();
        record.attempts.push(Attempt {
            timestamp: now,
            success,
        });
        record.last_attempt = now;

        if success {
            record.consecutive_failures = 0;
            if record.blocked {
                info!(resource_id = resource_id, "Circuit block cleared by success");
            }
            record.blocked = false;
            record.block_reason = None;
        } else {
            record.consecutive_failures += 1;
            if record.consecutive_failures >= self.failure_threshold && !record.blocked {
                record.blocked = true;
                record.block_reason = Some(format!(
                    "Blocked after {} consecutive failures",
                    record.consecutive_failures
                ));
                warn!(
                    resource_id = resource_id,
                    consecutive_failures = record.consecutive_failures,
                    "Circuit blocked"
                );
            }
        }
    }

    /// Manually clear a circuit block, keeping the attempt history.
    pub async fn unblock(&self, resource_id: &str) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(resource_id) {
            Some(record) => {
                record.blocked = false;
                record.block_reason = None;
                record.consecutive_failures = 0;
                info!(resource_id = resource_id, "Circuit manually unblocked");
                true
            }
            None => false,
        }
    }

    /// Drop all state for a resource.
    pub async fn reset(&self, resource_id: &str) -> bool {
        let removed = self.records.write().await.remove(resource_id).is_some();
        if removed {
            info!(resource_id = resource_id, "Rate limit state reset");
        }
        removed
    }

    /// Evict records whose last attempt is older than the TTL.
    pub async fn sweep(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.record_ttl_secs as i64);
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.last_attempt > cutoff);
        let evicted = before - records.len();
        if evicted > 0 {
            debug!(evicted = evicted, "Swept stale rate-limit records");
        }
        evicted
    }

    /// Snapshot of all per-resource records, for status reporting.
    pub async fn records(&self) -> Vec<RateLimitRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Spawn the periodic sweep task. The returned handle owns the task;
    /// dropping it or calling `shutdown` stops the sweep.
    pub fn start_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let limiter = Arc::clone(self);
        let interval_secs = self.sweep_interval_secs;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            // First tick completes immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep().await;
            }
        });
        SweeperHandle { handle }
    }

    fn window_description(&self) -> String {
        if self.window_secs == 3600 {
            "hour".to_string()
        } else {
            format!("{} seconds", self.window_secs)
        }
    }
}

/// Owns the background sweep task.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweep task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
