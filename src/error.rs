//! Typed failures surfaced by the engine and its collaborators.

use thiserror::Error;

/// Alert or artifact store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Notification delivery failure. Never fatal to the dispatch loop.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("receiver rejected message with status {status}")]
    Rejected { status: u16 },

    #[error("send timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Error returned to callers of `evaluate` and `dismiss`.
///
/// A failed measurement is unprocessed and may be resubmitted as is; the
/// per-measurement idempotency guard keeps a retry from duplicating alerts.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("evaluation worker failed: {0}")]
    Worker(String),
}
