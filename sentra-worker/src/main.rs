//! Sentra worker - runs the fingerprint matching pipeline
//!
//! Wires the pipeline core to its collaborators based on environment
//! configuration and runs until SIGINT. The crawler feeds the ingestion
//! queue out-of-process; this binary owns matching, deduplication, and
//! dispatch.

use std::sync::Arc;

use anyhow::Context;
use sentra_core::{
    AlertLedger, Embedding, FingerprintStore, InMemoryAlertLedger, InMemoryDeadLetterLog,
    InMemoryFingerprintStore, NoopNotifier, Notifier, Pipeline, PipelineConfig, WebhookNotifier,
};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// One identity enrollment from the seed file.
#[derive(Debug, Deserialize)]
struct EnrollmentRecord {
    identity_id: String,
    embedding: Vec<f32>,
    #[serde(default = "default_photo_count")]
    source_photo_count: u32,
}

fn default_photo_count() -> u32 {
    1
}

fn parse_seed(raw: &str) -> anyhow::Result<Vec<EnrollmentRecord>> {
    serde_json::from_str(raw).context("Invalid fingerprint seed file")
}

/// Build the fingerprint store, seeding enrollments from the JSON file at
/// `SENTRA_FINGERPRINTS_PATH` if configured. Without a seed the matcher
/// idles: every content item scores against zero fingerprints.
async fn build_store(embedding_dim: usize) -> anyhow::Result<Arc<InMemoryFingerprintStore>> {
    let store = Arc::new(InMemoryFingerprintStore::new());

    let Ok(path) = std::env::var("SENTRA_FINGERPRINTS_PATH") else {
        warn!(
            "No fingerprint seed configured (SENTRA_FINGERPRINTS_PATH unset); \
             the worker will not match anything until identities are enrolled"
        );
        return Ok(store);
    };

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read fingerprint seed file {path}"))?;
    let records = parse_seed(&raw)?;
    for record in &records {
        let embedding = Embedding::new(record.embedding.clone());
        embedding
            .validate(embedding_dim)
            .with_context(|| format!("Bad seed embedding for {}", record.identity_id))?;
        store
            .enroll(&record.identity_id, embedding, record.source_photo_count)
            .await
            .with_context(|| format!("Failed to enroll {}", record.identity_id))?;
    }
    info!(identities = records.len(), path, "Seeded fingerprint store");
    Ok(store)
}

async fn build_ledger() -> anyhow::Result<Arc<dyn AlertLedger>> {
    #[cfg(feature = "postgres")]
    if let Ok(database_url) = std::env::var("DATABASE_URL") {
        let ledger = sentra_core::PostgresAlertLedger::new(&database_url)
            .await
            .context("Failed to connect alert ledger")?;
        info!("Using Postgres alert ledger");
        return Ok(Arc::new(ledger));
    }

    info!("Using in-memory alert ledger");
    Ok(Arc::new(InMemoryAlertLedger::new()))
}

fn build_notifier() -> anyhow::Result<Arc<dyn Notifier>> {
    match std::env::var("SENTRA_WEBHOOK_URL") {
        Ok(url) => {
            info!(endpoint = %url, "Using webhook notifier");
            Ok(Arc::new(WebhookNotifier::new(url)?))
        }
        Err(_) => {
            info!("No webhook configured, notifications disabled");
            Ok(Arc::new(NoopNotifier))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PipelineConfig::from_env();
    config.validate().context("Invalid pipeline configuration")?;
    info!(?config, "Starting Sentra worker");

    let store = build_store(config.embedding_dim).await?;
    let ledger = build_ledger().await?;
    let notifier = build_notifier()?;
    let dead_letter = Arc::new(InMemoryDeadLetterLog::new());

    let pipeline = Pipeline::spawn(config, store, ledger, notifier, dead_letter.clone())
        .context("Failed to start pipeline")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let metrics = pipeline.metrics().snapshot();
    pipeline.shutdown().await;

    info!(
        items_processed = metrics.items_processed,
        alerts_created = metrics.alerts_created,
        alerts_updated = metrics.alerts_updated,
        dead_lettered = metrics.dead_lettered,
        "Worker stopped"
    );
    if dead_letter.len() > 0 {
        tracing::warn!(
            entries = dead_letter.len(),
            "Dead-letter log has undelivered alerts"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_well_formed() {
        let raw = r#"[
            {"identity_id": "alice", "embedding": [1.0, 0.0, 0.0], "source_photo_count": 4},
            {"identity_id": "bob", "embedding": [0.0, 1.0, 0.0]}
        ]"#;
        let records = parse_seed(raw).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity_id, "alice");
        assert_eq!(records[0].source_photo_count, 4);
        // Photo count defaults when omitted.
        assert_eq!(records[1].source_photo_count, 1);
    }

    #[test]
    fn test_parse_seed_rejects_malformed() {
        assert!(parse_seed("not json").is_err());
        assert!(parse_seed(r#"[{"identity_id": "alice"}]"#).is_err());
    }
}
