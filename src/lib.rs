// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod cache;
pub mod config;
pub mod dedup;
pub mod error;
pub mod evidence;
pub mod fingerprint;
pub mod learning;
pub mod matcher;
pub mod pipeline;
pub mod ranking;
pub mod screen;
pub mod signal;
pub mod taxonomy;

// ---- Re-exports for stable public API ----
pub use crate::config::EngineConfig;
pub use crate::error::EngineError;
pub use crate::evidence::{EvidenceKind, EvidenceReport, EvidenceSources, EvidenceStrength};
pub use crate::learning::{
    FeedbackAction, FeedbackEvent, LearningStats, LearningWeights, WeightStore,
};
pub use crate::matcher::{MatchSource, TopicMatch};
pub use crate::pipeline::{FeedbackReader, Pipeline};
pub use crate::signal::{RankedBatch, ScoredSignal, Signal, Tier};
pub use crate::taxonomy::{TaxonomyReader, TopicDefinition};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a compact fmt subscriber honoring `RUST_LOG`, for hosts and test
/// harnesses that embed the engine. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}
