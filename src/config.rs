//! Engine configuration: every tunable threshold in one place.
//!
//! Loads from a TOML file (default `config/engine.toml`) with selected env
//! overrides, and falls back to built-in defaults when the file is absent so
//! the engine always starts.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/engine.toml";
pub const ENV_CONFIG_PATH: &str = "SIGNAL_STUDIO_CONFIG";
pub const ENV_DUPLICATE_THRESHOLD: &str = "SIGNAL_STUDIO_DUPLICATE_THRESHOLD";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum keyword score for a topic to become a candidate.
    pub accept_score: f32,
    /// Confidence at or above which the keyword result skips arbitration.
    pub very_high_confidence: f32,
    /// Confidence assigned to a keyword result used as arbitration fallback.
    pub fallback_confidence_cap: f32,
    /// Confidence cap when the signal text contains ambiguous trigger words.
    pub ambiguous_confidence_cap: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            accept_score: 25.0,
            very_high_confidence: 90.0,
            fallback_confidence_cap: 50.0,
            ambiguous_confidence_cap: 70.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Real calls allowed per day; cache hits do not count.
    pub daily_limit: u32,
    /// Verdict cache TTL in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            max_retries: 2,
            daily_limit: 500,
            cache_ttl_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Entity-overlap / similarity threshold for the same-story call.
    pub duplicate_threshold: f32,
    /// Only compare signals published within this many hours of each other.
    pub window_hours: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.85,
            window_hours: 48,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Feedback events required before learned weights apply.
    pub min_feedback_count: u32,
    /// Produced topics stay hidden for this many hours.
    pub hide_produced_hours: i64,
    /// Word-overlap ratio above which a topic counts as a paraphrased repeat.
    pub fuzzy_hidden_overlap: f32,
    /// Score band floors.
    pub post_today_score: f32,
    pub this_week_score: f32,
    /// Bounded bonus added when a domain urgency override fires.
    pub urgency_bonus: f32,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_feedback_count: 3,
            hide_produced_hours: 168,
            fuzzy_hidden_overlap: 0.8,
            post_today_score: 80.0,
            this_week_score: 50.0,
            urgency_bonus: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent topic-match tasks per batch.
    pub match_concurrency: usize,
    /// Taxonomy cache TTL in seconds.
    pub taxonomy_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            match_concurrency: 8,
            taxonomy_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matcher: MatcherConfig,
    pub arbiter: ArbiterConfig,
    pub dedup: DedupConfig,
    pub ranking: RankingConfig,
    pub pipeline: PipelineConfig,
}

impl EngineConfig {
    /// Load from `SIGNAL_STUDIO_CONFIG` or the default path; missing file
    /// means defaults, a present-but-invalid file is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content)?,
            Err(_) => Self::default(),
        };

        if let Some(t) = parse_ratio_env(std::env::var(ENV_DUPLICATE_THRESHOLD).ok()) {
            cfg.dedup.duplicate_threshold = t;
        }
        Ok(cfg)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let cfg: EngineConfig = toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("engine config parse error: {e}"))?;
        Ok(cfg.sanitized())
    }

    /// Clamp anything a hand-edited file could push out of range.
    fn sanitized(mut self) -> Self {
        self.dedup.duplicate_threshold = self.dedup.duplicate_threshold.clamp(0.0, 1.0);
        self.ranking.fuzzy_hidden_overlap = self.ranking.fuzzy_hidden_overlap.clamp(0.0, 1.0);
        if self.pipeline.match_concurrency == 0 {
            self.pipeline.match_concurrency = 1;
        }
        self
    }
}

fn parse_ratio_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}
