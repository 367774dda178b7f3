//! In-memory alert ledger.
//!
//! Backs tests and single-process deployments. Records are keyed by
//! `alert_id`, so upserts are naturally idempotent: replaying the same write
//! leaves one logical record.

use super::{Alert, AlertKey, AlertLedger};
use crate::error::LedgerError;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// In-memory alert ledger keyed by alert id.
#[derive(Default)]
pub struct InMemoryAlertLedger {
    alerts: DashMap<Uuid, Alert>,
}

impl InMemoryAlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records held, open or closed.
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    fn open_for_key(&self, key: &AlertKey) -> Vec<Alert> {
        let mut open: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|entry| entry.value().is_open() && entry.value().key() == *key)
            .map(|entry| entry.value().clone())
            .collect();
        open.sort_by_key(|a| a.detected_at);
        open
    }
}

#[async_trait]
impl AlertLedger for InMemoryAlertLedger {
    async fn find_open(&self, key: &AlertKey) -> Result<Option<Alert>, LedgerError> {
        Ok(self.open_for_key(key).into_iter().next())
    }

    async fn find_open_all(&self, key: &AlertKey) -> Result<Vec<Alert>, LedgerError> {
        Ok(self.open_for_key(key))
    }

    async fn upsert(&self, alert: &Alert) -> Result<Alert, LedgerError> {
        self.alerts.insert(alert.alert_id, alert.clone());
        Ok(alert.clone())
    }

    async fn open_alerts(&self, identity_id: &str) -> Result<Vec<Alert>, LedgerError> {
        let mut open: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|entry| entry.value().is_open() && entry.value().identity_id == identity_id)
            .map(|entry| entry.value().clone())
            .collect();
        open.sort_by_key(|a| a.detected_at);
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{AlertLabel, AlertStatus};
    use super::*;
    use crate::ingest::Platform;
    use chrono::Utc;

    fn alert(identity: &str, account: &str, status: AlertStatus) -> Alert {
        Alert {
            alert_id: Uuid::new_v4(),
            identity_id: identity.into(),
            content_id: Uuid::new_v4(),
            platform: Platform::Facebook,
            source_account: account.into(),
            content_locator: format!("https://facebook.com/{account}"),
            confidence_score: 0.8,
            label: AlertLabel::Impersonation,
            status,
            detected_at: Utc::now(),
            reviewed_at: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let ledger = InMemoryAlertLedger::new();
        let record = alert("alice", "fake_alice", AlertStatus::New);

        ledger.upsert(&record).await.unwrap();
        ledger.upsert(&record).await.unwrap();
        ledger.upsert(&record).await.unwrap();

        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_find_open_skips_closed() {
        let ledger = InMemoryAlertLedger::new();
        let closed = alert("alice", "fake_alice", AlertStatus::Actioned);
        ledger.upsert(&closed).await.unwrap();

        let found = ledger.find_open(&closed.key()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_open_all_earliest_first() {
        let ledger = InMemoryAlertLedger::new();
        let mut early = alert("alice", "fake_alice", AlertStatus::New);
        early.detected_at = Utc::now() - chrono::Duration::hours(1);
        let late = alert("alice", "fake_alice", AlertStatus::Reviewing);

        ledger.upsert(&late).await.unwrap();
        ledger.upsert(&early).await.unwrap();

        let open = ledger.find_open_all(&early.key()).await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].alert_id, early.alert_id);
    }

    #[tokio::test]
    async fn test_open_alerts_by_identity() {
        let ledger = InMemoryAlertLedger::new();
        ledger
            .upsert(&alert("alice", "fake_one", AlertStatus::New))
            .await
            .unwrap();
        ledger
            .upsert(&alert("alice", "fake_two", AlertStatus::Reviewing))
            .await
            .unwrap();
        ledger
            .upsert(&alert("alice", "fake_three", AlertStatus::Ignored))
            .await
            .unwrap();
        ledger
            .upsert(&alert("bob", "fake_bob", AlertStatus::New))
            .await
            .unwrap();

        assert_eq!(ledger.open_alerts("alice").await.unwrap().len(), 2);
        assert_eq!(ledger.open_alerts("bob").await.unwrap().len(), 1);
    }
}
