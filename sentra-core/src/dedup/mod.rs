//! Alert deduplication and aggregation.
//!
//! Converts match results into alert lifecycle transitions while preventing
//! duplicate noise. The binding invariant: at most one open alert per
//! (identity, source account, platform) tuple. New matches against an
//! already-open alert update it instead of spawning a duplicate.
//!
//! The invariant is enforced here rather than at the storage layer because
//! it takes read-then-write coordination: two concurrent "no open alert
//! found" reads for the same source must not both decide to create. All
//! processing for one tuple runs inside a per-key critical section; matches
//! for different tuples proceed fully in parallel.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryAlertLedger;
#[cfg(feature = "postgres")]
pub use postgres::PostgresAlertLedger;

use crate::error::{LedgerError, Result};
use crate::fingerprint::IdentityId;
use crate::ingest::{ContentItem, Platform};
use crate::matcher::{MatchResult, Thresholds};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Alert lifecycle state. `Actioned` and `Ignored` are terminal and only
/// reached through an explicit user decision outside this core; alerts
/// never auto-close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Reviewing,
    Actioned,
    Ignored,
}

impl AlertStatus {
    /// Whether the alert still awaits a terminal user decision.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::New | Self::Reviewing)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Reviewing => "reviewing",
            Self::Actioned => "actioned",
            Self::Ignored => "ignored",
        };
        f.write_str(name)
    }
}

/// Categorical alert label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertLabel {
    #[default]
    Impersonation,
    Repost,
    Deepfake,
    NameMention,
}

impl std::fmt::Display for AlertLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Impersonation => "impersonation",
            Self::Repost => "repost",
            Self::Deepfake => "deepfake",
            Self::NameMention => "name-mention",
        };
        f.write_str(name)
    }
}

/// The open-alert uniqueness tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertKey {
    pub identity_id: IdentityId,
    pub source_account: String,
    pub platform: Platform,
}

impl AlertKey {
    pub fn new(
        identity_id: impl Into<IdentityId>,
        source_account: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            identity_id: identity_id.into(),
            source_account: source_account.into(),
            platform,
        }
    }
}

/// A persisted alert record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: Uuid,
    pub identity_id: IdentityId,
    /// Content item of the originating match
    pub content_id: Uuid,
    pub platform: Platform,
    pub source_account: String,
    pub content_locator: String,
    /// Maximum similarity score across all contributing matches
    pub confidence_score: f32,
    pub label: AlertLabel,
    pub status: AlertStatus,
    pub detected_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn key(&self) -> AlertKey {
        AlertKey::new(
            self.identity_id.clone(),
            self.source_account.clone(),
            self.platform,
        )
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

/// Why a match result was suppressed instead of producing an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuppressReason {
    /// Score fell below the low threshold; should have been discarded by
    /// the matcher, suppressed defensively here.
    BelowThreshold,
}

impl std::fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BelowThreshold => f.write_str("below-threshold"),
        }
    }
}

/// Outcome of deduplicating one match result.
#[derive(Debug, Clone)]
pub enum AlertOutcome {
    /// First qualifying match for the source: a new alert was created
    Created(Alert),
    /// An open alert for the source already existed and absorbed the match
    Updated(Alert),
    /// No alert transition
    Suppressed(SuppressReason),
}

impl AlertOutcome {
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            Self::Created(alert) | Self::Updated(alert) => Some(alert),
            Self::Suppressed(_) => None,
        }
    }
}

/// Narrow persistence interface to the alert ledger.
///
/// The core never issues raw queries; everything goes through this trait so
/// the backing store is swappable (in-memory for tests, Postgres in
/// production).
#[async_trait]
pub trait AlertLedger: Send + Sync {
    /// The single open alert for a key, if any. When a bug has left several
    /// open, returns the earliest-created one.
    async fn find_open(&self, key: &AlertKey) -> std::result::Result<Option<Alert>, LedgerError>;

    /// All open alerts for a key, earliest first. More than one is an
    /// invariant violation surfaced to the repair path.
    async fn find_open_all(&self, key: &AlertKey)
        -> std::result::Result<Vec<Alert>, LedgerError>;

    /// Insert or replace by `alert_id`. Idempotent: writing the same alert
    /// twice leaves one logical record.
    async fn upsert(&self, alert: &Alert) -> std::result::Result<Alert, LedgerError>;

    /// All open alerts for an identity across sources, for operator review.
    async fn open_alerts(&self, identity_id: &str)
        -> std::result::Result<Vec<Alert>, LedgerError>;
}

/// Deduplicates match results into alert transitions under per-key
/// serialization.
pub struct Deduplicator {
    ledger: Arc<dyn AlertLedger>,
    thresholds: Thresholds,
    /// Per-tuple critical sections; entries are created on first use and
    /// live for the process lifetime (bounded by the set of monitored
    /// sources, not by traffic).
    key_locks: DashMap<AlertKey, Arc<tokio::sync::Mutex<()>>>,
}

impl Deduplicator {
    pub fn new(ledger: Arc<dyn AlertLedger>, thresholds: Thresholds) -> Self {
        Self {
            ledger,
            thresholds,
            key_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, key: &AlertKey) -> Arc<tokio::sync::Mutex<()>> {
        self.key_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Process one match result against the alert ledger.
    ///
    /// `label_hint` comes from content metadata when the crawler can
    /// classify the sighting; unspecified defaults to impersonation.
    #[instrument(
        level = "debug",
        skip(self, matched, item, label_hint),
        fields(content_id = %matched.content_id, identity_id = %matched.identity_id)
    )]
    pub async fn process(
        &self,
        matched: &MatchResult,
        item: &ContentItem,
        label_hint: Option<AlertLabel>,
    ) -> Result<AlertOutcome> {
        // The matcher never emits below the low threshold; suppress
        // defensively if something upstream misbehaves.
        if matched.similarity_score < self.thresholds.low {
            warn!(
                score = matched.similarity_score,
                low = self.thresholds.low,
                "Match result below low threshold reached deduplication"
            );
            return Ok(AlertOutcome::Suppressed(SuppressReason::BelowThreshold));
        }

        let key = AlertKey::new(
            matched.identity_id.clone(),
            item.source_account.clone(),
            item.platform,
        );

        // Per-key critical section: the find-then-upsert below is a
        // check-then-act sequence that must not interleave for one tuple.
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let open = self.reconciled_open(&key).await?;

        match open {
            None => {
                let alert = Alert {
                    alert_id: Uuid::new_v4(),
                    identity_id: matched.identity_id.clone(),
                    content_id: matched.content_id,
                    platform: item.platform,
                    source_account: item.source_account.clone(),
                    content_locator: item.content_locator.clone(),
                    confidence_score: matched.similarity_score,
                    label: label_hint.unwrap_or_default(),
                    status: AlertStatus::New,
                    detected_at: matched.decided_at,
                    reviewed_at: None,
                };
                let alert = self.ledger.upsert(&alert).await?;
                info!(
                    alert_id = %alert.alert_id,
                    identity_id = %alert.identity_id,
                    platform = %alert.platform,
                    score = alert.confidence_score,
                    "Alert created"
                );
                Ok(AlertOutcome::Created(alert))
            }
            Some(mut alert) => {
                // Duplicate sighting strengthens evidence; confidence only
                // ever ratchets up, and status is untouched.
                alert.confidence_score = alert.confidence_score.max(matched.similarity_score);
                let alert = self.ledger.upsert(&alert).await?;
                debug!(
                    alert_id = %alert.alert_id,
                    score = alert.confidence_score,
                    "Open alert updated with new sighting"
                );
                Ok(AlertOutcome::Updated(alert))
            }
        }
    }

    /// Fetch the open alert for a key, repairing duplicate open alerts if a
    /// bug has let any slip through: survivors merge into the
    /// earliest-created one and the rest are closed as ignored.
    async fn reconciled_open(&self, key: &AlertKey) -> Result<Option<Alert>> {
        let mut open = self.ledger.find_open_all(key).await?;
        if open.len() <= 1 {
            return Ok(open.pop());
        }

        warn!(
            identity_id = %key.identity_id,
            source_account = %key.source_account,
            platform = %key.platform,
            open_count = open.len(),
            "Invariant violation: multiple open alerts for one source, merging"
        );

        // `find_open_all` returns earliest first.
        let mut survivor = open.remove(0);
        for mut duplicate in open {
            survivor.confidence_score = survivor.confidence_score.max(duplicate.confidence_score);
            duplicate.status = AlertStatus::Ignored;
            duplicate.reviewed_at = Some(Utc::now());
            self.ledger.upsert(&duplicate).await?;
        }
        let survivor = self.ledger.upsert(&survivor).await?;
        Ok(Some(survivor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;
    use crate::matcher::ConfidenceBand;

    fn item(account: &str) -> ContentItem {
        ContentItem::new(
            Platform::Instagram,
            account,
            format!("https://instagram.com/p/{account}"),
            Embedding::new(vec![1.0, 0.0, 0.0]),
        )
    }

    fn matched(item: &ContentItem, identity: &str, score: f32) -> MatchResult {
        MatchResult {
            content_id: item.content_id,
            identity_id: identity.into(),
            similarity_score: score,
            confidence_band: if score >= 0.85 {
                ConfidenceBand::High
            } else {
                ConfidenceBand::Medium
            },
            decided_at: Utc::now(),
        }
    }

    fn dedup() -> (Deduplicator, Arc<InMemoryAlertLedger>) {
        let ledger = Arc::new(InMemoryAlertLedger::new());
        let dedup = Deduplicator::new(ledger.clone(), Thresholds::default());
        (dedup, ledger)
    }

    #[tokio::test]
    async fn test_first_match_creates_new_alert() {
        let (dedup, _ledger) = dedup();
        let item = item("imposter");
        let outcome = dedup
            .process(&matched(&item, "alice", 1.0), &item, None)
            .await
            .unwrap();

        let AlertOutcome::Created(alert) = outcome else {
            panic!("expected Created, got {outcome:?}");
        };
        assert_eq!(alert.status, AlertStatus::New);
        assert_eq!(alert.confidence_score, 1.0);
        assert_eq!(alert.label, AlertLabel::Impersonation);
        assert_eq!(alert.identity_id, "alice");
    }

    #[tokio::test]
    async fn test_second_sighting_updates_keeps_max_confidence() {
        let (dedup, ledger) = dedup();
        let first = item("imposter");
        dedup
            .process(&matched(&first, "alice", 1.0), &first, None)
            .await
            .unwrap();

        let second = item("imposter");
        let outcome = dedup
            .process(&matched(&second, "alice", 0.70), &second, None)
            .await
            .unwrap();

        let AlertOutcome::Updated(alert) = outcome else {
            panic!("expected Updated, got {outcome:?}");
        };
        // Confidence only strengthens; status stays untouched.
        assert_eq!(alert.confidence_score, 1.0);
        assert_eq!(alert.status, AlertStatus::New);

        let key = AlertKey::new("alice", "imposter", Platform::Instagram);
        assert_eq!(ledger.find_open_all(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stronger_sighting_raises_confidence() {
        let (dedup, _ledger) = dedup();
        let first = item("imposter");
        dedup
            .process(&matched(&first, "alice", 0.70), &first, None)
            .await
            .unwrap();

        let second = item("imposter");
        let outcome = dedup
            .process(&matched(&second, "alice", 0.95), &second, None)
            .await
            .unwrap();
        assert_eq!(outcome.alert().unwrap().confidence_score, 0.95);
    }

    #[tokio::test]
    async fn test_below_threshold_defensively_suppressed() {
        let (dedup, ledger) = dedup();
        let item = item("imposter");
        let outcome = dedup
            .process(&matched(&item, "alice", 0.30), &item, None)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            AlertOutcome::Suppressed(SuppressReason::BelowThreshold)
        ));
        assert!(ledger.open_alerts("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_different_sources_get_separate_alerts() {
        let (dedup, ledger) = dedup();
        let a = item("imposter_one");
        let b = item("imposter_two");
        dedup.process(&matched(&a, "alice", 0.9), &a, None).await.unwrap();
        dedup.process(&matched(&b, "alice", 0.9), &b, None).await.unwrap();

        assert_eq!(ledger.open_alerts("alice").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_label_hint_respected() {
        let (dedup, _ledger) = dedup();
        let item = item("reposter");
        let outcome = dedup
            .process(
                &matched(&item, "alice", 0.9),
                &item,
                Some(AlertLabel::Repost),
            )
            .await
            .unwrap();
        assert_eq!(outcome.alert().unwrap().label, AlertLabel::Repost);
    }

    #[tokio::test]
    async fn test_closed_alert_does_not_absorb_new_match() {
        let (dedup, ledger) = dedup();
        let first = item("imposter");
        let outcome = dedup
            .process(&matched(&first, "alice", 0.9), &first, None)
            .await
            .unwrap();
        let mut alert = outcome.alert().unwrap().clone();

        // User actions the alert (terminal, outside this core).
        alert.status = AlertStatus::Actioned;
        alert.reviewed_at = Some(Utc::now());
        ledger.upsert(&alert).await.unwrap();

        // Fresh sighting from the same source opens a new alert.
        let second = item("imposter");
        let outcome = dedup
            .process(&matched(&second, "alice", 0.8), &second, None)
            .await
            .unwrap();
        assert!(matches!(outcome, AlertOutcome::Created(_)));
    }

    #[tokio::test]
    async fn test_duplicate_open_alerts_merged_into_earliest() {
        let (dedup, ledger) = dedup();

        // Seed the invariant violation directly at the ledger.
        let early = Alert {
            alert_id: Uuid::new_v4(),
            identity_id: "alice".into(),
            content_id: Uuid::new_v4(),
            platform: Platform::Instagram,
            source_account: "imposter".into(),
            content_locator: "https://instagram.com/p/a".into(),
            confidence_score: 0.65,
            label: AlertLabel::Impersonation,
            status: AlertStatus::New,
            detected_at: Utc::now() - chrono::Duration::minutes(10),
            reviewed_at: None,
        };
        let late = Alert {
            alert_id: Uuid::new_v4(),
            detected_at: Utc::now(),
            confidence_score: 0.92,
            content_id: Uuid::new_v4(),
            ..early.clone()
        };
        ledger.upsert(&early).await.unwrap();
        ledger.upsert(&late).await.unwrap();

        let item = item("imposter");
        let outcome = dedup
            .process(&matched(&item, "alice", 0.70), &item, None)
            .await
            .unwrap();

        let AlertOutcome::Updated(survivor) = outcome else {
            panic!("expected Updated, got {outcome:?}");
        };
        // Earliest-created alert survives, carrying the max confidence.
        assert_eq!(survivor.alert_id, early.alert_id);
        assert_eq!(survivor.confidence_score, 0.92);

        let key = AlertKey::new("alice", "imposter", Platform::Instagram);
        assert_eq!(ledger.find_open_all(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_matches_single_open_alert() {
        let (dedup, ledger) = dedup();
        let dedup = Arc::new(dedup);

        let mut handles = Vec::new();
        for i in 0..32 {
            let dedup = dedup.clone();
            handles.push(tokio::spawn(async move {
                let item = item("imposter");
                let score = 0.60 + (i as f32) * 0.01;
                dedup
                    .process(&matched(&item, "alice", score), &item, None)
                    .await
                    .unwrap()
            }));
        }

        let mut created = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), AlertOutcome::Created(_)) {
                created += 1;
            }
        }

        // Exactly one creation; everything else updated the same alert.
        assert_eq!(created, 1);
        let key = AlertKey::new("alice", "imposter", Platform::Instagram);
        let open = ledger.find_open_all(&key).await.unwrap();
        assert_eq!(open.len(), 1);
        // Max score among the contributors: 0.60 + 31 * 0.01 = 0.91.
        assert!((open[0].confidence_score - 0.91).abs() < 1e-6);
    }
}
