//! In-memory fingerprint store.
//!
//! Version lists are kept per identity under a `DashMap` entry; enroll holds
//! the entry's write lock while it supersedes the prior version and pushes
//! the new one, so readers never observe an enrolled identity without an
//! active fingerprint.

use super::{FingerprintStore, IdentityFingerprint};
use crate::embedding::Embedding;
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

/// In-memory fingerprint store keyed by identity.
#[derive(Default)]
pub struct InMemoryFingerprintStore {
    /// identity_id -> fingerprint versions, oldest first
    versions: DashMap<String, Vec<IdentityFingerprint>>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities with at least one enrollment.
    pub fn identity_count(&self) -> usize {
        self.versions.len()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn active_fingerprint(&self, identity_id: &str) -> Result<Option<IdentityFingerprint>> {
        Ok(self
            .versions
            .get(identity_id)
            .and_then(|versions| versions.iter().find(|f| f.is_active()).cloned()))
    }

    async fn enroll(
        &self,
        identity_id: &str,
        embedding: Embedding,
        source_photo_count: u32,
    ) -> Result<IdentityFingerprint> {
        let now = Utc::now();
        let fingerprint = IdentityFingerprint {
            identity_id: identity_id.to_string(),
            embedding,
            source_photo_count,
            created_at: now,
            superseded_at: None,
        };

        // The entry lock covers both the supersede and the insert, so a
        // concurrent reader sees either the old active version or the new
        // one, never neither.
        let mut versions = self.versions.entry(identity_id.to_string()).or_default();
        for prior in versions.iter_mut().filter(|f| f.is_active()) {
            prior.superseded_at = Some(now);
        }
        versions.push(fingerprint.clone());

        debug!(
            identity_id,
            version_count = versions.len(),
            source_photo_count,
            "Fingerprint enrolled"
        );
        Ok(fingerprint)
    }

    async fn list_active(&self) -> Result<Vec<IdentityFingerprint>> {
        Ok(self
            .versions
            .iter()
            .filter_map(|entry| entry.value().iter().find(|f| f.is_active()).cloned())
            .collect())
    }

    async fn history(&self, identity_id: &str) -> Result<Vec<IdentityFingerprint>> {
        let mut history: Vec<IdentityFingerprint> = self
            .versions
            .get(identity_id)
            .map(|versions| versions.clone())
            .unwrap_or_default();
        history.reverse();
        Ok(history)
    }
}
