//! Dead-letter log for dispatch attempts that exhausted retries.
//!
//! Nothing is ever silently dropped: an alert whose notification cannot be
//! delivered after the configured attempts is recorded here for manual
//! inspection and replay. Operators are expected to watch this log.

use crate::dedup::Alert;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A dispatch that gave up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// The alert whose notification could not be delivered
    pub alert: Alert,
    /// Last error observed before giving up
    pub error: String,
    /// Attempts made, including the first
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Durable record of exhausted dispatches.
#[async_trait]
pub trait DeadLetterLog: Send + Sync {
    async fn record(&self, entry: DeadLetterEntry);
}

/// In-memory dead-letter log retaining entries for inspection.
#[derive(Default)]
pub struct InMemoryDeadLetterLog {
    entries: Mutex<Vec<DeadLetterEntry>>,
}

impl InMemoryDeadLetterLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl DeadLetterLog for InMemoryDeadLetterLog {
    async fn record(&self, entry: DeadLetterEntry) {
        tracing::error!(
            alert_id = %entry.alert.alert_id,
            attempts = entry.attempts,
            error = %entry.error,
            "Dispatch exhausted retries, dead-lettered"
        );
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }
}
