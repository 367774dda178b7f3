//! Pipeline counters.
//!
//! Plain atomics shared across workers. Missing or delayed alerts are the
//! only user-visible failure mode of this core, so the dead-letter and drop
//! counters are load-bearing for operations, not decoration.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared pipeline counters.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub items_processed: AtomicU64,
    pub matches_found: AtomicU64,
    pub alerts_created: AtomicU64,
    pub alerts_updated: AtomicU64,
    pub alerts_suppressed: AtomicU64,
    pub dispatched: AtomicU64,
    pub dispatch_retries: AtomicU64,
    pub dead_lettered: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub items_processed: u64,
    pub matches_found: u64,
    pub alerts_created: u64,
    pub alerts_updated: u64,
    pub alerts_suppressed: u64,
    pub dispatched: u64,
    pub dispatch_retries: u64,
    pub dead_lettered: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_processed: self.items_processed.load(Ordering::Relaxed),
            matches_found: self.matches_found.load(Ordering::Relaxed),
            alerts_created: self.alerts_created.load(Ordering::Relaxed),
            alerts_updated: self.alerts_updated.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dispatch_retries: self.dispatch_retries.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}
