//! Per-client health bookkeeping.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Tracks one client's operational health.
///
/// Uses atomics so probe tasks can record outcomes against a snapshot of the
/// client list without holding the tier lock. Two states exist: a client
/// flips to unhealthy when its consecutive-error counter crosses the
/// configured threshold, and back to healthy on the next successful probe.
#[derive(Debug)]
pub struct ClientStatus {
    /// Endpoint address this status belongs to
    address: String,

    /// Current health flag
    healthy: AtomicBool,

    /// Consecutive probe errors (reset on success)
    error_count: AtomicU32,

    /// Errors tolerated before the client is marked unhealthy
    error_threshold: u32,

    /// Timestamp of the last recorded probe outcome
    last_probe: RwLock<Option<Instant>>,
}

impl ClientStatus {
    /// Create a status record for a client, initially healthy with a zero
    /// error counter.
    pub fn new(address: String, error_threshold: u32) -> Self {
        Self {
            address,
            healthy: AtomicBool::new(true),
            error_count: AtomicU32::new(0),
            error_threshold,
            last_probe: RwLock::new(None),
        }
    }

    /// Endpoint address of the monitored client.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Record a successful probe: reset the error counter and restore
    /// healthy state.
    pub fn record_success(&self) {
        self.error_count.store(0, Ordering::Relaxed);
        self.healthy.store(true, Ordering::Relaxed);
        self.touch();
    }

    /// Record a failed probe: increment the error counter and flip to
    /// unhealthy once the threshold is crossed.
    pub fn record_failure(&self) {
        let errors = self.error_count.fetch_add(1, Ordering::Relaxed) + 1;
        if errors >= self.error_threshold {
            self.healthy.store(false, Ordering::Relaxed);
        }
        self.touch();
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn is_unhealthy(&self) -> bool {
        !self.is_healthy()
    }

    /// Current consecutive-error count, for diagnostics.
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Time elapsed since the last probe outcome, if any was recorded.
    pub fn time_since_probe(&self) -> Option<Duration> {
        self.last_probe
            .read()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed()))
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_probe.write() {
            *last = Some(Instant::now());
        }
    }
}
