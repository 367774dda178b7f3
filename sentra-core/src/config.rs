//! Pipeline configuration
//!
//! Handles loading configuration from environment variables with sensible defaults.

use crate::error::{Result, SentraError};
use crate::matcher::Thresholds;

/// Pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum similarity score to produce a match at all (default: 0.60)
    pub low_threshold: f32,
    /// Similarity score at or above which a match is high-confidence (default: 0.85)
    pub high_threshold: f32,
    /// Expected embedding dimension for all fingerprints and content (default: 128)
    pub embedding_dim: usize,
    /// Maximum unprocessed items held in the ingestion queue (default: 4096)
    pub queue_capacity: usize,
    /// Outbound alert deliveries per second (default: 50)
    pub dispatch_rate_limit: u32,
    /// Maximum dispatch attempts before dead-lettering (default: 5)
    pub retry_max_attempts: u32,
    /// Base interval for exponential retry backoff in ms (default: 200)
    pub retry_backoff_base_ms: u64,
    /// Number of concurrent matcher workers (default: 4)
    pub matcher_workers: usize,
    /// Maximum items pulled from the queue per batch (default: 32)
    pub batch_size: usize,
    /// How long a matcher worker waits on an empty queue in ms (default: 250)
    pub batch_wait_ms: u64,
    /// Capacity of the dispatcher send buffer (default: 256)
    pub dispatch_buffer: usize,
    /// How long `dispatch` waits for buffer space before reporting
    /// backpressure, in ms (default: 5000)
    pub dispatch_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            low_threshold: 0.60,
            high_threshold: 0.85,
            embedding_dim: 128,
            queue_capacity: 4096,
            dispatch_rate_limit: 50,
            retry_max_attempts: 5,
            retry_backoff_base_ms: 200,
            matcher_workers: 4,
            batch_size: 32,
            batch_wait_ms: 250,
            dispatch_buffer: 256,
            dispatch_timeout_ms: 5000,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            low_threshold: env_parse("SENTRA_LOW_THRESHOLD", defaults.low_threshold),
            high_threshold: env_parse("SENTRA_HIGH_THRESHOLD", defaults.high_threshold),
            embedding_dim: env_parse("SENTRA_EMBEDDING_DIM", defaults.embedding_dim),
            queue_capacity: env_parse("SENTRA_QUEUE_CAPACITY", defaults.queue_capacity),
            dispatch_rate_limit: env_parse("SENTRA_DISPATCH_RATE_LIMIT", defaults.dispatch_rate_limit),
            retry_max_attempts: env_parse("SENTRA_RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_backoff_base_ms: env_parse(
                "SENTRA_RETRY_BACKOFF_BASE_MS",
                defaults.retry_backoff_base_ms,
            ),
            matcher_workers: env_parse("SENTRA_MATCHER_WORKERS", defaults.matcher_workers),
            batch_size: env_parse("SENTRA_BATCH_SIZE", defaults.batch_size),
            batch_wait_ms: env_parse("SENTRA_BATCH_WAIT_MS", defaults.batch_wait_ms),
            dispatch_buffer: env_parse("SENTRA_DISPATCH_BUFFER", defaults.dispatch_buffer),
            dispatch_timeout_ms: env_parse("SENTRA_DISPATCH_TIMEOUT_MS", defaults.dispatch_timeout_ms),
        }
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if !(self.low_threshold > 0.0 && self.low_threshold < self.high_threshold) {
            return Err(SentraError::InvalidConfig(format!(
                "thresholds must satisfy 0 < low < high, got low={} high={}",
                self.low_threshold, self.high_threshold
            )));
        }
        if self.high_threshold > 1.0 {
            return Err(SentraError::InvalidConfig(format!(
                "high_threshold must be <= 1.0, got {}",
                self.high_threshold
            )));
        }
        if self.embedding_dim == 0 {
            return Err(SentraError::InvalidConfig("embedding_dim must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(SentraError::InvalidConfig("queue_capacity must be > 0".into()));
        }
        if self.dispatch_rate_limit == 0 {
            return Err(SentraError::InvalidConfig(
                "dispatch_rate_limit must be > 0".into(),
            ));
        }
        if self.matcher_workers == 0 || self.batch_size == 0 {
            return Err(SentraError::InvalidConfig(
                "matcher_workers and batch_size must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Matcher thresholds derived from this configuration.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            low: self.low_threshold,
            high: self.high_threshold,
        }
    }
}
