//! Rate-limited dispatcher.
//!
//! Delivers finalized alert outcomes to the notification collaborator
//! without letting bursty crawler output overwhelm it. A bounded send buffer
//! applies backpressure up the chain (alerts are higher-value than raw
//! content, so the pipeline slows instead of dropping them), and a token
//! bucket paces outbound deliveries.
//!
//! Delivery is notification-only: the deduplicator already wrote the alert
//! to the ledger before it reaches this stage, so a delayed or replayed
//! delivery can never rewrite alert state the user has since changed.
//! Notifications are at-least-once; receivers deduplicate on `alert_id`.
//!
//! Transient delivery failures are retried with exponential backoff and a
//! capped attempt count; exhausted deliveries go to the dead-letter log and
//! a metric, never into the void.

pub mod dead_letter;
pub mod token_bucket;

pub use dead_letter::{DeadLetterEntry, DeadLetterLog, InMemoryDeadLetterLog};
pub use token_bucket::TokenBucket;

use crate::dedup::{Alert, AlertOutcome};
use crate::error::{Result, SentraError};
use crate::metrics::PipelineMetrics;
use crate::notify::{Notifier, NotifyError};
use backoff::{future::retry_notify, ExponentialBackoff};
use chrono::Utc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Dispatcher tuning, derived from the pipeline configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Outbound deliveries per second
    pub rate_limit: u32,
    /// Maximum delivery attempts before dead-lettering
    pub retry_max_attempts: u32,
    /// Base interval for exponential retry backoff
    pub retry_backoff_base: Duration,
    /// Send buffer capacity
    pub buffer: usize,
    /// How long `dispatch` waits for buffer space before reporting
    /// backpressure
    pub dispatch_timeout: Duration,
}

impl From<&crate::config::PipelineConfig> for DispatchConfig {
    fn from(config: &crate::config::PipelineConfig) -> Self {
        Self {
            rate_limit: config.dispatch_rate_limit,
            retry_max_attempts: config.retry_max_attempts,
            retry_backoff_base: Duration::from_millis(config.retry_backoff_base_ms),
            buffer: config.dispatch_buffer,
            dispatch_timeout: Duration::from_millis(config.dispatch_timeout_ms),
        }
    }
}

/// Handle for submitting outcomes to the drain task.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Alert>,
    dispatch_timeout: Duration,
    metrics: Arc<PipelineMetrics>,
}

impl Dispatcher {
    /// Spawn the drain task and return the submission handle alongside its
    /// join handle.
    pub fn spawn(
        config: DispatchConfig,
        notifier: Arc<dyn Notifier>,
        dead_letter: Arc<dyn DeadLetterLog>,
        metrics: Arc<PipelineMetrics>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let dispatcher = Self {
            tx,
            dispatch_timeout: config.dispatch_timeout,
            metrics: metrics.clone(),
        };

        // Burst sized to the rate: one second of headroom.
        let bucket = TokenBucket::new(config.rate_limit, config.rate_limit);
        let drain = DrainTask {
            config,
            notifier,
            dead_letter,
            metrics,
            bucket,
        };
        let handle = tokio::spawn(drain.run(rx, shutdown));

        (dispatcher, handle)
    }

    /// Submit an outcome for downstream delivery.
    ///
    /// Blocks while the send buffer is full, up to the configured timeout;
    /// a timeout surfaces as a backpressure error so callers slow ingestion
    /// instead of losing alerts. Suppressed outcomes are counted and
    /// dropped here: there is nothing downstream to deliver.
    pub async fn dispatch(&self, outcome: AlertOutcome) -> Result<()> {
        let alert = match outcome {
            AlertOutcome::Created(alert) => {
                PipelineMetrics::incr(&self.metrics.alerts_created);
                alert
            }
            AlertOutcome::Updated(alert) => {
                PipelineMetrics::incr(&self.metrics.alerts_updated);
                alert
            }
            AlertOutcome::Suppressed(reason) => {
                PipelineMetrics::incr(&self.metrics.alerts_suppressed);
                debug!(%reason, "Suppressed outcome, nothing to dispatch");
                return Ok(());
            }
        };

        match self.tx.send_timeout(alert, self.dispatch_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(SentraError::DispatchBackpressure {
                waited_ms: self.dispatch_timeout.as_millis() as u64,
            }),
            Err(SendTimeoutError::Closed(_)) => Err(SentraError::DispatcherClosed),
        }
    }
}

struct DrainTask {
    config: DispatchConfig,
    notifier: Arc<dyn Notifier>,
    dead_letter: Arc<dyn DeadLetterLog>,
    metrics: Arc<PipelineMetrics>,
    bucket: TokenBucket,
}

impl DrainTask {
    async fn run(self, mut rx: mpsc::Receiver<Alert>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                maybe_alert = rx.recv() => {
                    match maybe_alert {
                        Some(alert) => self.deliver(alert).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        // Undelivered buffer entries are recoverable from
                        // the ledger on restart; stop taking work.
                        info!("Dispatcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Deliver one alert notification through the token bucket with capped
    /// retries. The ledger is never touched here; the alert was persisted
    /// upstream before dispatch.
    #[instrument(level = "debug", skip(self, alert), fields(alert_id = %alert.alert_id))]
    async fn deliver(&self, alert: Alert) {
        self.bucket.acquire().await;

        let attempts = AtomicU32::new(0);
        let max_attempts = self.config.retry_max_attempts.max(1);

        let backoff_policy = ExponentialBackoff {
            initial_interval: self.config.retry_backoff_base,
            max_elapsed_time: None,
            ..Default::default()
        };

        let result = retry_notify(
            backoff_policy,
            || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                match self.notifier.notify(&alert).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_transient() && attempt < max_attempts => {
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            },
            |err: NotifyError, duration: Duration| {
                PipelineMetrics::incr(&self.metrics.dispatch_retries);
                warn!(
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Alert delivery failed, retry scheduled"
                );
            },
        )
        .await;

        match result {
            Ok(()) => {
                PipelineMetrics::incr(&self.metrics.dispatched);
                debug!(score = alert.confidence_score, "Alert dispatched");
            }
            Err(err) => {
                PipelineMetrics::incr(&self.metrics.dead_lettered);
                self.dead_letter
                    .record(DeadLetterEntry {
                        alert,
                        error: err.to_string(),
                        attempts: attempts.load(Ordering::SeqCst),
                        failed_at: Utc::now(),
                    })
                    .await;
            }
        }
    }
}
