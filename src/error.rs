//! Crate error taxonomy.
//!
//! Most failures in this engine are recoverable by design: a failed
//! arbitration call degrades to the keyword fallback, a missing taxonomy
//! yields unmatched signals, malformed feedback is dropped. The variants here
//! exist so callers can branch on what went wrong at the edges (config
//! loading, store IO) where degradation is not an option.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Arbitration timed out after {0} ms")]
    ArbitrationTimeout(u64),

    #[error("Arbitration call budget exhausted")]
    ArbitrationBudget,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Weight store error: {0}")]
    Store(String),

    #[error("Malformed feedback event: {0}")]
    MalformedFeedback(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
