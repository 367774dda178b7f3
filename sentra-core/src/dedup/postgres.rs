//! PostgreSQL implementation of the alert ledger.
//!
//! Upserts are keyed by `alert_id`, and a partial unique index over the
//! open-alert tuple gives the database a second line of defense behind the
//! deduplicator's per-key serialization.

use super::{Alert, AlertKey, AlertLabel, AlertLedger, AlertStatus};
use crate::error::LedgerError;
use crate::ingest::Platform;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// PostgreSQL-backed alert ledger.
#[derive(Clone)]
pub struct PostgresAlertLedger {
    pool: PgPool,
}

/// Row type for database queries.
#[derive(FromRow)]
struct AlertRow {
    alert_id: Uuid,
    identity_id: String,
    content_id: Uuid,
    platform: String,
    source_account: String,
    content_locator: String,
    confidence_score: f32,
    label: String,
    status: String,
    detected_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
}

fn platform_from_str(s: &str) -> Platform {
    match s {
        "instagram" => Platform::Instagram,
        "facebook" => Platform::Facebook,
        "x" => Platform::X,
        "tiktok" => Platform::Tiktok,
        "youtube" => Platform::Youtube,
        _ => Platform::Other,
    }
}

fn status_from_str(s: &str) -> Result<AlertStatus, LedgerError> {
    match s {
        "new" => Ok(AlertStatus::New),
        "reviewing" => Ok(AlertStatus::Reviewing),
        "actioned" => Ok(AlertStatus::Actioned),
        "ignored" => Ok(AlertStatus::Ignored),
        other => Err(LedgerError::Query(format!("unknown alert status: {other}"))),
    }
}

fn label_from_str(s: &str) -> AlertLabel {
    match s {
        "repost" => AlertLabel::Repost,
        "deepfake" => AlertLabel::Deepfake,
        "name-mention" => AlertLabel::NameMention,
        _ => AlertLabel::Impersonation,
    }
}

impl TryFrom<AlertRow> for Alert {
    type Error = LedgerError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Self {
            alert_id: row.alert_id,
            identity_id: row.identity_id,
            content_id: row.content_id,
            platform: platform_from_str(&row.platform),
            source_account: row.source_account,
            content_locator: row.content_locator,
            confidence_score: row.confidence_score,
            label: label_from_str(&row.label),
            status: status_from_str(&row.status)?,
            detected_at: row.detected_at,
            reviewed_at: row.reviewed_at,
        })
    }
}

impl PostgresAlertLedger {
    /// Create a new ledger with the given database URL.
    ///
    /// Runs migrations automatically on connection.
    pub async fn new(database_url: &str) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| LedgerError::Migration(e.to_string()))?;

        tracing::info!("Alert ledger connected and migrations applied");

        Ok(Self { pool })
    }

    /// Create a ledger from an existing pool (for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn classify(e: sqlx::Error) -> LedgerError {
        match e {
            sqlx::Error::PoolTimedOut => LedgerError::Timeout(e.to_string()),
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed => LedgerError::Connection(e.to_string()),
            other => LedgerError::Query(other.to_string()),
        }
    }
}

#[async_trait]
impl AlertLedger for PostgresAlertLedger {
    async fn find_open(&self, key: &AlertKey) -> Result<Option<Alert>, LedgerError> {
        let row: Option<AlertRow> = sqlx::query_as(
            r#"
            SELECT alert_id, identity_id, content_id, platform, source_account,
                   content_locator, confidence_score, label, status, detected_at, reviewed_at
            FROM alerts
            WHERE identity_id = $1 AND source_account = $2 AND platform = $3
              AND status IN ('new', 'reviewing')
            ORDER BY detected_at ASC
            LIMIT 1
            "#,
        )
        .bind(&key.identity_id)
        .bind(&key.source_account)
        .bind(key.platform.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::classify)?;

        row.map(Alert::try_from).transpose()
    }

    async fn find_open_all(&self, key: &AlertKey) -> Result<Vec<Alert>, LedgerError> {
        let rows: Vec<AlertRow> = sqlx::query_as(
            r#"
            SELECT alert_id, identity_id, content_id, platform, source_account,
                   content_locator, confidence_score, label, status, detected_at, reviewed_at
            FROM alerts
            WHERE identity_id = $1 AND source_account = $2 AND platform = $3
              AND status IN ('new', 'reviewing')
            ORDER BY detected_at ASC
            "#,
        )
        .bind(&key.identity_id)
        .bind(&key.source_account)
        .bind(key.platform.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(Self::classify)?;

        rows.into_iter().map(Alert::try_from).collect()
    }

    async fn upsert(&self, alert: &Alert) -> Result<Alert, LedgerError> {
        let row: AlertRow = sqlx::query_as(
            r#"
            INSERT INTO alerts (
                alert_id, identity_id, content_id, platform, source_account,
                content_locator, confidence_score, label, status, detected_at, reviewed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (alert_id) DO UPDATE SET
                confidence_score = EXCLUDED.confidence_score,
                label = EXCLUDED.label,
                status = EXCLUDED.status,
                reviewed_at = EXCLUDED.reviewed_at
            RETURNING alert_id, identity_id, content_id, platform, source_account,
                      content_locator, confidence_score, label, status, detected_at, reviewed_at
            "#,
        )
        .bind(alert.alert_id)
        .bind(&alert.identity_id)
        .bind(alert.content_id)
        .bind(alert.platform.to_string())
        .bind(&alert.source_account)
        .bind(&alert.content_locator)
        .bind(alert.confidence_score)
        .bind(alert.label.to_string())
        .bind(alert.status.to_string())
        .bind(alert.detected_at)
        .bind(alert.reviewed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::classify)?;

        Alert::try_from(row)
    }

    async fn open_alerts(&self, identity_id: &str) -> Result<Vec<Alert>, LedgerError> {
        let rows: Vec<AlertRow> = sqlx::query_as(
            r#"
            SELECT alert_id, identity_id, content_id, platform, source_account,
                   content_locator, confidence_score, label, status, detected_at, reviewed_at
            FROM alerts
            WHERE identity_id = $1 AND status IN ('new', 'reviewing')
            ORDER BY detected_at ASC
            "#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::classify)?;

        rows.into_iter().map(Alert::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        for platform in [
            Platform::Instagram,
            Platform::Facebook,
            Platform::X,
            Platform::Tiktok,
            Platform::Youtube,
            Platform::Other,
        ] {
            assert_eq!(platform_from_str(&platform.to_string()), platform);
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            AlertStatus::New,
            AlertStatus::Reviewing,
            AlertStatus::Actioned,
            AlertStatus::Ignored,
        ] {
            assert_eq!(status_from_str(&status.to_string()).unwrap(), status);
        }
        assert!(status_from_str("bogus").is_err());
    }

    #[test]
    fn test_label_round_trip() {
        for label in [
            AlertLabel::Impersonation,
            AlertLabel::Repost,
            AlertLabel::Deepfake,
            AlertLabel::NameMention,
        ] {
            assert_eq!(label_from_str(&label.to_string()), label);
        }
    }
}
