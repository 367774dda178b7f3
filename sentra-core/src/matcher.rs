//! Similarity matcher.
//!
//! Decides whether a content item's embedding matches any identity's active
//! fingerprint. Pure aside from the fingerprint store read: no shared
//! mutable state between invocations, so matcher workers parallelize freely.
//!
//! # Thresholding
//!
//! Two-band policy over the similarity score:
//!
//! - `score < low`: discarded, no match result.
//! - `low <= score < high`: medium confidence (low boundary inclusive).
//! - `score >= high`: high confidence.
//!
//! Thresholds are configuration so operators can tune the false-positive /
//! false-negative tradeoff without a deploy.

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::fingerprint::{FingerprintStore, IdentityId};
use crate::ingest::ContentItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, trace};
use uuid::Uuid;

/// Discretized similarity tier driving alerting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    Medium,
    High,
}

/// Matching thresholds. Invariant: `0 < low < high <= 1`, enforced by
/// `PipelineConfig::validate`.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub low: f32,
    pub high: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { low: 0.60, high: 0.85 }
    }
}

impl ConfidenceBand {
    /// Band a score, or `None` if it falls below the low threshold.
    /// Monotonic in the score; the low boundary is inclusive.
    pub fn from_score(score: f32, thresholds: Thresholds) -> Option<Self> {
        if score >= thresholds.high {
            Some(Self::High)
        } else if score >= thresholds.low {
            Some(Self::Medium)
        } else {
            None
        }
    }
}

/// A per-identity match decision for one content item.
///
/// Produced by the matcher, consumed immediately by deduplication; not
/// persisted independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub content_id: Uuid,
    pub identity_id: IdentityId,
    /// Similarity score in [0.0, 1.0]
    pub similarity_score: f32,
    pub confidence_band: ConfidenceBand,
    pub decided_at: DateTime<Utc>,
}

/// Matches content items against active identity fingerprints.
pub struct Matcher {
    store: Arc<dyn FingerprintStore>,
    thresholds: Thresholds,
}

impl Matcher {
    pub fn new(store: Arc<dyn FingerprintStore>, thresholds: Thresholds) -> Self {
        Self { store, thresholds }
    }

    /// Match one content item against every active fingerprint.
    ///
    /// Emits one result per identity clearing the low threshold; decisions
    /// are per-identity and do not suppress each other, so a shared crawl
    /// pool can alert several monitored identities from one item.
    ///
    /// Total over its input domain: a zero-norm embedding scores 0.0 and
    /// simply produces no results.
    #[instrument(level = "debug", skip(self, item), fields(content_id = %item.content_id, platform = %item.platform))]
    pub async fn match_item(&self, item: &ContentItem) -> Result<Vec<MatchResult>> {
        let fingerprints = self.store.list_active().await?;
        let decided_at = Utc::now();
        let mut results = Vec::new();

        for fingerprint in &fingerprints {
            let score = cosine_similarity(&item.extracted_embedding, &fingerprint.embedding);
            let Some(band) = ConfidenceBand::from_score(score, self.thresholds) else {
                trace!(
                    identity_id = %fingerprint.identity_id,
                    score,
                    "Below low threshold, discarded"
                );
                continue;
            };

            debug!(
                identity_id = %fingerprint.identity_id,
                score,
                band = ?band,
                "Content matched identity fingerprint"
            );
            results.push(MatchResult {
                content_id: item.content_id,
                identity_id: fingerprint.identity_id.clone(),
                similarity_score: score,
                confidence_band: band,
                decided_at,
            });
        }

        Ok(results)
    }

    /// Match against a single identity's monitoring scope.
    ///
    /// Returns `None` when the identity has never enrolled or the score
    /// falls below the low threshold.
    #[instrument(level = "debug", skip(self, item), fields(content_id = %item.content_id))]
    pub async fn match_item_for(
        &self,
        item: &ContentItem,
        identity_id: &str,
    ) -> Result<Option<MatchResult>> {
        let Some(fingerprint) = self.store.active_fingerprint(identity_id).await? else {
            // Never enrolled: nothing to match against, not an error.
            debug!(identity_id, "No active fingerprint, skipping match");
            return Ok(None);
        };

        let score = cosine_similarity(&item.extracted_embedding, &fingerprint.embedding);
        Ok(
            ConfidenceBand::from_score(score, self.thresholds).map(|band| MatchResult {
                content_id: item.content_id,
                identity_id: fingerprint.identity_id,
                similarity_score: score,
                confidence_band: band,
                decided_at: Utc::now(),
            }),
        )
    }
}
