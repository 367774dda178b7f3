use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentraError {
    #[error("Invalid content item: {0}")]
    InvalidContent(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Fingerprint store error: {0}")]
    FingerprintStore(String),

    #[error("Alert ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Notification error: {0}")]
    Notification(#[from] crate::notify::NotifyError),

    #[error("Dispatch buffer full after {waited_ms}ms")]
    DispatchBackpressure { waited_ms: u64 },

    #[error("Dispatcher is shut down")]
    DispatcherClosed,

    #[error("Anchoring error: {0}")]
    Anchor(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures of the persistence collaborator backing the alert ledger.
///
/// Transient variants are worth a bounded retry before a match is dropped;
/// permanent variants are not.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger connection error: {0}")]
    Connection(String),

    #[error("Ledger timeout: {0}")]
    Timeout(String),

    #[error("Ledger query error: {0}")]
    Query(String),

    #[error("Ledger migration error: {0}")]
    Migration(String),
}

impl LedgerError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, SentraError>;
