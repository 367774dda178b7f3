//! Content ingestion queue.
//!
//! Buffers candidate content between the external crawler and the matcher
//! workers, smoothing bursty arrival. Crawler output is abundant and
//! perishable: at capacity the oldest unprocessed item is evicted and
//! counted, never blocking the producer and never growing without bound.
//!
//! Malformed items (missing embedding, wrong dimension, non-finite
//! components) are rejected at `enqueue` and never enter the pipeline.

use crate::embedding::Embedding;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Monitored source platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Facebook,
    X,
    Tiktok,
    Youtube,
    Other,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::X => "x",
            Self::Tiktok => "tiktok",
            Self::Youtube => "youtube",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// A candidate content item discovered by the crawler.
///
/// Ephemeral: lives only in the queue and matcher. Once processed it is
/// either discarded (no match) or referenced by an alert (match).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    /// Unique identifier assigned at ingestion
    pub content_id: Uuid,
    /// Source platform the crawler found this on
    pub platform: Platform,
    /// Account that posted the content
    pub source_account: String,
    /// URL or media reference locating the content
    pub content_locator: String,
    /// Embedding computed by the external extraction collaborator
    pub extracted_embedding: Embedding,
    /// When the item entered the queue
    pub ingested_at: DateTime<Utc>,
}

impl ContentItem {
    /// Build a content item, assigning its id and ingestion timestamp.
    pub fn new(
        platform: Platform,
        source_account: impl Into<String>,
        content_locator: impl Into<String>,
        extracted_embedding: Embedding,
    ) -> Self {
        Self {
            content_id: Uuid::new_v4(),
            platform,
            source_account: source_account.into(),
            content_locator: content_locator.into(),
            extracted_embedding,
            ingested_at: Utc::now(),
        }
    }
}

/// Outcome of a successful `enqueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Item accepted, queue had room
    Accepted,
    /// Item accepted; the oldest unprocessed item was evicted to make room
    Displaced,
}

/// Bounded multi-producer multi-consumer queue of content items.
pub struct IngestQueue {
    items: Mutex<VecDeque<ContentItem>>,
    capacity: usize,
    expected_dim: usize,
    dropped: AtomicU64,
    notify: tokio::sync::Notify,
}

impl IngestQueue {
    pub fn new(capacity: usize, expected_dim: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            expected_dim,
            dropped: AtomicU64::new(0),
            notify: tokio::sync::Notify::new(),
        }
    }

    /// Accept a content item. Never blocks the producer: at capacity the
    /// oldest unprocessed item is evicted and counted as dropped.
    ///
    /// Input errors (bad embedding) are rejected here so malformed items
    /// never reach the matcher; the crawler is signaled immediately and the
    /// core does not retry on its behalf.
    pub fn enqueue(&self, item: ContentItem) -> Result<Enqueued> {
        item.extracted_embedding.validate(self.expected_dim)?;

        let outcome = {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            let displaced = if items.len() >= self.capacity {
                let evicted = items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if let Some(evicted) = evicted {
                    warn!(
                        content_id = %evicted.content_id,
                        platform = %evicted.platform,
                        "Queue at capacity, evicting oldest unprocessed item"
                    );
                }
                true
            } else {
                false
            };
            items.push_back(item);
            if displaced {
                Enqueued::Displaced
            } else {
                Enqueued::Accepted
            }
        };

        self.notify.notify_one();
        Ok(outcome)
    }

    /// Pull up to `max` items. If the queue is empty, waits at most `wait`
    /// for new arrivals and then returns an empty batch rather than hanging.
    pub async fn dequeue_batch(&self, max: usize, wait: Duration) -> Vec<ContentItem> {
        let batch = self.take_batch(max);
        if !batch.is_empty() {
            return batch;
        }

        // Empty queue: wait for a producer, bounded by the caller's timeout.
        let _ = tokio::time::timeout(wait, self.notify.notified()).await;
        let batch = self.take_batch(max);
        debug!(batch_len = batch.len(), "Dequeued batch after wait");
        batch
    }

    fn take_batch(&self, max: usize) -> Vec<ContentItem> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let take = max.min(items.len());
        items.drain(..take).collect()
    }

    /// Items currently buffered.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total items evicted due to capacity overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SentraError;

    fn item(account: &str, components: &[f32]) -> ContentItem {
        ContentItem::new(
            Platform::Instagram,
            account,
            format!("https://instagram.com/p/{account}"),
            Embedding::new(components.to_vec()),
        )
    }

    #[test]
    fn test_enqueue_accepts_valid_item() {
        let queue = IngestQueue::new(4, 3);
        let outcome = queue.enqueue(item("acct", &[1.0, 0.0, 0.0])).unwrap();
        assert_eq!(outcome, Enqueued::Accepted);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_enqueue_rejects_wrong_dimension() {
        let queue = IngestQueue::new(4, 3);
        let err = queue.enqueue(item("acct", &[1.0, 0.0])).unwrap_err();
        assert!(matches!(err, SentraError::DimensionMismatch { .. }));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_enqueue_rejects_empty_embedding() {
        let queue = IngestQueue::new(4, 3);
        let err = queue.enqueue(item("acct", &[])).unwrap_err();
        assert!(matches!(err, SentraError::InvalidContent(_)));
    }

    #[test]
    fn test_overflow_drops_oldest_never_blocks() {
        let queue = IngestQueue::new(2, 1);
        queue.enqueue(item("a", &[1.0])).unwrap();
        queue.enqueue(item("b", &[1.0])).unwrap();
        let outcome = queue.enqueue(item("c", &[1.0])).unwrap();

        assert_eq!(outcome, Enqueued::Displaced);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_dropped_count_tracks_overflow_exactly() {
        let queue = IngestQueue::new(3, 1);
        for i in 0..10 {
            queue.enqueue(item(&format!("acct{i}"), &[1.0])).unwrap();
        }
        // 10 enqueued into capacity 3: exactly 7 evictions.
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 7);
    }

    #[tokio::test]
    async fn test_dequeue_batch_returns_available() {
        let queue = IngestQueue::new(8, 1);
        queue.enqueue(item("a", &[1.0])).unwrap();
        queue.enqueue(item("b", &[1.0])).unwrap();

        let batch = queue.dequeue_batch(5, Duration::from_millis(10)).await;
        assert_eq!(batch.len(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_dequeue_batch_caps_at_max() {
        let queue = IngestQueue::new(8, 1);
        for i in 0..5 {
            queue.enqueue(item(&format!("acct{i}"), &[1.0])).unwrap();
        }

        let batch = queue.dequeue_batch(3, Duration::from_millis(10)).await;
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_dequeue_batch_empty_returns_after_timeout() {
        let queue = IngestQueue::new(8, 1);
        let start = std::time::Instant::now();
        let batch = queue.dequeue_batch(3, Duration::from_millis(20)).await;
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        use std::sync::Arc;

        let queue = Arc::new(IngestQueue::new(8, 1));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue_batch(1, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.enqueue(item("a", &[1.0])).unwrap();

        let batch = consumer.await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_producers_and_consumers() {
        use std::sync::Arc;

        let queue = Arc::new(IngestQueue::new(1024, 1));
        let mut producers = Vec::new();
        for p in 0..4 {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..50 {
                    queue.enqueue(item(&format!("p{p}-{i}"), &[1.0])).unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        let mut consumed = 0;
        for _ in 0..4 {
            consumed += queue
                .dequeue_batch(100, Duration::from_millis(10))
                .await
                .len();
        }
        assert_eq!(consumed, 200);
        assert_eq!(queue.dropped(), 0);
    }
}
