//! Sentra Core - content-fingerprint matching and alerting pipeline
//!
//! This crate implements the detection core of the Sentra identity
//! protection product: it ingests crawled social media content, scores it
//! against registered identity fingerprints, and turns qualifying matches
//! into deduplicated alerts delivered downstream under rate limiting.
//!
//! # Pipeline
//!
//! crawler (external) → [`IngestQueue`] → [`Matcher`] (reads the
//! [`FingerprintStore`]) → [`Deduplicator`] (reads/writes the
//! [`AlertLedger`]) → [`Dispatcher`] → notification (external).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sentra_core::{
//!     ContentItem, Embedding, FingerprintStore, InMemoryAlertLedger,
//!     InMemoryDeadLetterLog, InMemoryFingerprintStore, NoopNotifier,
//!     Pipeline, PipelineConfig, Platform,
//! };
//!
//! # async fn example() -> sentra_core::Result<()> {
//! let store = Arc::new(InMemoryFingerprintStore::new());
//! store
//!     .enroll("identity-1", Embedding::new(vec![0.0; 128]), 4)
//!     .await?;
//!
//! let pipeline = Pipeline::spawn(
//!     PipelineConfig::default(),
//!     store,
//!     Arc::new(InMemoryAlertLedger::new()),
//!     Arc::new(NoopNotifier),
//!     Arc::new(InMemoryDeadLetterLog::new()),
//! )?;
//!
//! // The crawler enqueues discovered content; the pipeline does the rest.
//! pipeline.queue().enqueue(ContentItem::new(
//!     Platform::Instagram,
//!     "suspicious_account",
//!     "https://instagram.com/p/abc",
//!     Embedding::new(vec![0.0; 128]),
//! ))?;
//! # Ok(())
//! # }
//! ```

pub mod anchor;
pub mod config;
pub mod dedup;
pub mod dispatch;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod matcher;
pub mod metrics;
pub mod notify;
pub mod pipeline;

// Re-export main types for convenience
pub use anchor::{fingerprint_hash, AnchorReceipt, IdentityAnchor, MockAnchor};
pub use config::PipelineConfig;
pub use dedup::{
    Alert, AlertKey, AlertLabel, AlertLedger, AlertOutcome, AlertStatus, Deduplicator,
    InMemoryAlertLedger, SuppressReason,
};
#[cfg(feature = "postgres")]
pub use dedup::PostgresAlertLedger;
pub use dispatch::{
    DeadLetterEntry, DeadLetterLog, DispatchConfig, Dispatcher, InMemoryDeadLetterLog, TokenBucket,
};
pub use embedding::{cosine_similarity, Embedding};
pub use error::{LedgerError, Result, SentraError};
pub use fingerprint::{
    FingerprintStore, IdentityFingerprint, IdentityId, InMemoryFingerprintStore,
};
pub use ingest::{ContentItem, Enqueued, IngestQueue, Platform};
pub use matcher::{ConfidenceBand, MatchResult, Matcher, Thresholds};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use notify::{NoopNotifier, Notifier, NotifyError, WebhookNotifier};
pub use pipeline::Pipeline;
