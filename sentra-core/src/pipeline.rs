//! Pipeline assembly.
//!
//! Wires the queue, matcher, deduplicator, and dispatcher into a worker
//! pool: N matcher workers pull batches from the ingestion queue, feed the
//! deduplicator, and hand outcomes to the dispatcher. Shutdown is
//! cooperative through a watch channel; no in-memory state is load-bearing
//! for correctness, so a crashed worker loses nothing the ledger cannot
//! replay.

use crate::config::PipelineConfig;
use crate::dedup::{AlertLedger, Deduplicator};
use crate::dispatch::{DeadLetterLog, DispatchConfig, Dispatcher};
use crate::error::{Result, SentraError};
use crate::fingerprint::FingerprintStore;
use crate::ingest::IngestQueue;
use crate::matcher::Matcher;
use crate::metrics::PipelineMetrics;
use crate::notify::Notifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A running matching pipeline.
pub struct Pipeline {
    queue: Arc<IngestQueue>,
    metrics: Arc<PipelineMetrics>,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    dispatcher_handle: JoinHandle<()>,
}

impl Pipeline {
    /// Validate configuration and start the worker pool.
    pub fn spawn(
        config: PipelineConfig,
        store: Arc<dyn FingerprintStore>,
        ledger: Arc<dyn AlertLedger>,
        notifier: Arc<dyn Notifier>,
        dead_letter: Arc<dyn DeadLetterLog>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(PipelineMetrics::new());
        let queue = Arc::new(IngestQueue::new(config.queue_capacity, config.embedding_dim));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (dispatcher, dispatcher_handle) = Dispatcher::spawn(
            DispatchConfig::from(&config),
            notifier,
            dead_letter,
            metrics.clone(),
            shutdown_rx.clone(),
        );

        let matcher = Arc::new(Matcher::new(store, config.thresholds()));
        let dedup = Arc::new(Deduplicator::new(ledger, config.thresholds()));

        let mut workers = Vec::with_capacity(config.matcher_workers);
        for worker_id in 0..config.matcher_workers {
            let worker = MatchWorker {
                worker_id,
                queue: queue.clone(),
                matcher: matcher.clone(),
                dedup: dedup.clone(),
                dispatcher: dispatcher.clone(),
                metrics: metrics.clone(),
                batch_size: config.batch_size,
                batch_wait: Duration::from_millis(config.batch_wait_ms),
            };
            workers.push(tokio::spawn(worker.run(shutdown_rx.clone())));
        }

        info!(
            workers = config.matcher_workers,
            queue_capacity = config.queue_capacity,
            "Pipeline started"
        );

        Ok(Self {
            queue,
            metrics,
            shutdown_tx,
            workers,
            dispatcher_handle,
        })
    }

    /// The ingestion queue producers enqueue into.
    pub fn queue(&self) -> Arc<IngestQueue> {
        self.queue.clone()
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    /// Signal shutdown and wait for the workers and dispatcher to stop.
    /// Items still buffered in the queue are abandoned; alerts already
    /// written are durable in the ledger.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Matcher worker panicked");
            }
        }
        if let Err(e) = self.dispatcher_handle.await {
            error!(error = %e, "Dispatcher task panicked");
        }
        info!("Pipeline stopped");
    }
}

struct MatchWorker {
    worker_id: usize,
    queue: Arc<IngestQueue>,
    matcher: Arc<Matcher>,
    dedup: Arc<Deduplicator>,
    dispatcher: Dispatcher,
    metrics: Arc<PipelineMetrics>,
    batch_size: usize,
    batch_wait: Duration,
}

impl MatchWorker {
    async fn run(self, shutdown: watch::Receiver<bool>) {
        debug!(worker_id = self.worker_id, "Matcher worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = self.queue.dequeue_batch(self.batch_size, self.batch_wait).await;
            for item in batch {
                self.process_item(item, &shutdown).await;
            }
        }
        debug!(worker_id = self.worker_id, "Matcher worker stopped");
    }

    async fn process_item(
        &self,
        item: crate::ingest::ContentItem,
        shutdown: &watch::Receiver<bool>,
    ) {
        PipelineMetrics::incr(&self.metrics.items_processed);

        let results = match self.matcher.match_item(&item).await {
            Ok(results) => results,
            Err(e) => {
                // Matching is pure; a failure here is a store read error.
                // The item is perishable and not retried by this stage.
                warn!(content_id = %item.content_id, error = %e, "Match failed, item dropped");
                return;
            }
        };

        for matched in results {
            PipelineMetrics::incr(&self.metrics.matches_found);
            let Some(outcome) = self.dedup_with_retry(&matched, &item).await else {
                continue;
            };

            // Backpressure pauses the whole worker, which is the point:
            // the queue absorbs (and if needed sheds) raw content while
            // alert outcomes are held and re-offered until accepted. Each
            // failed offer already waited the dispatch timeout, so this
            // loop paces itself.
            loop {
                match self.dispatcher.dispatch(outcome.clone()).await {
                    Ok(()) => break,
                    Err(SentraError::DispatchBackpressure { waited_ms }) => {
                        warn!(waited_ms, "Dispatch backpressure, worker paused");
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Dispatch failed, outcome dropped");
                        break;
                    }
                }
            }
        }
    }

    /// Run deduplication, retrying transient ledger errors a bounded number
    /// of times before giving the match up.
    async fn dedup_with_retry(
        &self,
        matched: &crate::matcher::MatchResult,
        item: &crate::ingest::ContentItem,
    ) -> Option<crate::dedup::AlertOutcome> {
        const MAX_RETRIES: u32 = 3;

        let mut attempt = 0u32;
        loop {
            match self.dedup.process(matched, item, None).await {
                Ok(outcome) => return Some(outcome),
                Err(SentraError::Ledger(e)) if e.is_transient() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    warn!(
                        content_id = %item.content_id,
                        error = %e,
                        attempt,
                        "Transient ledger error, retrying deduplication"
                    );
                    tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                }
                Err(e) => {
                    warn!(
                        content_id = %item.content_id,
                        identity_id = %matched.identity_id,
                        error = %e,
                        "Deduplication failed, match dropped"
                    );
                    return None;
                }
            }
        }
    }
}
