//! Ledger-anchoring collaborator.
//!
//! External service that accepts an identity hash and returns a transaction
//! receipt. Matching correctness never depends on anchoring; this is the
//! minimal contract the rest of the product consumes.

use crate::error::{Result, SentraError};
use crate::fingerprint::IdentityFingerprint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Receipt returned by the anchoring service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorReceipt {
    /// Transaction identifier on the external ledger
    pub transaction_id: String,
    pub anchored_at: DateTime<Utc>,
}

/// External anchoring service interface.
#[async_trait]
pub trait IdentityAnchor: Send + Sync {
    /// Anchor a 32-byte hash, returning the ledger receipt.
    async fn anchor(&self, hash: &[u8; 32]) -> Result<AnchorReceipt>;
}

/// Deterministic digest of a fingerprint suitable for anchoring.
///
/// Covers the identity, the embedding bytes, and the creation time, so each
/// enrollment version anchors to a distinct hash.
pub fn fingerprint_hash(fingerprint: &IdentityFingerprint) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(fingerprint.identity_id.as_bytes());
    for component in fingerprint.embedding.as_slice() {
        hasher.update(component.to_le_bytes());
    }
    hasher.update(fingerprint.created_at.timestamp_millis().to_le_bytes());

    let digest = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

/// Mock anchor for tests: receipt derived deterministically from the hash.
#[derive(Debug, Default)]
pub struct MockAnchor;

#[async_trait]
impl IdentityAnchor for MockAnchor {
    async fn anchor(&self, hash: &[u8; 32]) -> Result<AnchorReceipt> {
        if hash.iter().all(|b| *b == 0) {
            return Err(SentraError::Anchor("refusing to anchor zero hash".into()));
        }
        Ok(AnchorReceipt {
            transaction_id: format!("mock-{}", hex::encode(&hash[..8])),
            anchored_at: Utc::now(),
        })
    }
}
