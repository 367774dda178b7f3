//! Identity fingerprint store.
//!
//! Holds the reference embeddings registered identities are matched against.
//! Fingerprints are versioned, never mutated in place: re-enrollment inserts
//! a new fingerprint and marks the previous active one superseded, so the
//! full enrollment history stays available as audit evidence.
//!
//! Exactly one fingerprint per identity is active at any time once that
//! identity has enrolled; readers never observe an enrolled identity with
//! zero active fingerprints.

pub mod memory;

pub use memory::InMemoryFingerprintStore;

use crate::embedding::Embedding;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a protected identity.
pub type IdentityId = String;

/// A versioned reference fingerprint for one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityFingerprint {
    /// The protected identity this fingerprint belongs to
    pub identity_id: IdentityId,
    /// Reference embedding computed from the enrollment samples
    pub embedding: Embedding,
    /// Number of enrollment samples contributing to the embedding
    pub source_photo_count: u32,
    /// When this fingerprint version was created
    pub created_at: DateTime<Utc>,
    /// When a later enrollment superseded this version, if any
    pub superseded_at: Option<DateTime<Utc>>,
}

impl IdentityFingerprint {
    pub fn is_active(&self) -> bool {
        self.superseded_at.is_none()
    }
}

/// Durable lookup of active fingerprints by identity.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// The currently active fingerprint, or `None` if the identity has never
    /// enrolled. Callers treat `None` as "nothing to match against", not an
    /// error worth propagating.
    async fn active_fingerprint(&self, identity_id: &str) -> Result<Option<IdentityFingerprint>>;

    /// Register a new fingerprint, superseding the prior active one (if any)
    /// atomically with respect to concurrent readers.
    async fn enroll(
        &self,
        identity_id: &str,
        embedding: Embedding,
        source_photo_count: u32,
    ) -> Result<IdentityFingerprint>;

    /// All active fingerprints, for shared crawl pools where one content
    /// item is matched against every monitored identity.
    async fn list_active(&self) -> Result<Vec<IdentityFingerprint>>;

    /// Full enrollment history for an identity, newest first. Superseded
    /// fingerprints are retained for audit, never physically deleted.
    async fn history(&self, identity_id: &str) -> Result<Vec<IdentityFingerprint>>;
}
