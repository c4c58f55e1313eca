//! Core data model: raw signals, scored signals, tiers, and merge provenance.
//!
//! A [`Signal`] is a candidate content idea ingested from an external source.
//! The pipeline enriches it step by step (topic match, evidence, fingerprint,
//! learned score, tier) and emits a [`ScoredSignal`]; nothing here is ever
//! deleted by the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evidence::{EvidenceReport, EvidenceStrength, RecommendationLevel};
use crate::matcher::TopicMatch;

/// Raw candidate content idea, as supplied by a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Name of the originating source (feed, competitor channel, forum).
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub discovered_at: DateTime<Utc>,
    /// Topic id attached by upstream classification, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_topic_id: Option<String>,
    /// Hard expiry for time-boxed opportunities (event coverage windows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            source: source.into(),
            source_url: None,
            published_at: now,
            discovered_at: now,
            upstream_topic_id: None,
            expires_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_published_at(mut self, ts: DateTime<Utc>) -> Self {
        self.published_at = ts;
        self
    }

    pub fn with_upstream_topic(mut self, topic_id: impl Into<String>) -> Self {
        self.upstream_topic_id = Some(topic_id.into());
        self
    }

    /// Title and description joined for text matching.
    pub fn text(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.description)
        }
    }

    /// Age in whole hours at `now`, never negative.
    pub fn age_hours(&self, now: DateTime<Utc>) -> i64 {
        (now - self.published_at).num_hours().max(0)
    }

    /// Age-banded recency weight in [0.1, 1.0].
    pub fn recency_weight(&self, now: DateTime<Utc>) -> f32 {
        let days = (now - self.published_at).num_days();
        match days {
            d if d < 0 => 0.1,
            0..=1 => 1.0,
            2..=3 => 0.8,
            4..=7 => 0.6,
            8..=14 => 0.4,
            15..=30 => 0.2,
            _ => 0.1,
        }
    }
}

/// Urgency bucket assigned by ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    PostToday,
    ThisWeek,
    Evergreen,
    Rejected,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::PostToday => "Post Today",
            Tier::ThisWeek => "This Week",
            Tier::Evergreen => "Evergreen",
            Tier::Rejected => "Rejected",
        }
    }
}

/// A fully processed signal, ready for the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSignal {
    pub signal: Signal,
    pub topic: TopicMatch,
    pub evidence: EvidenceReport,
    /// Evidence-based score before learning weights.
    pub base_score: f32,
    /// Score after learned weights, clamped to [1, 100].
    pub final_score: f32,
    pub tier: Tier,
    pub tier_reason: String,
    pub learning_applied: bool,
    /// Human-readable multiplier trail ("topic: 1.21x", ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<String>,
    /// Liked at some point; immune to hidden-topic filtering.
    #[serde(default)]
    pub protected: bool,
    /// Names of every source that reported this story (grows on merge).
    pub sources: Vec<String>,
    pub source_count: usize,
    pub recency: f32,
}

impl ScoredSignal {
    pub fn strength(&self) -> EvidenceStrength {
        self.evidence.strength
    }

    pub fn recommendation(&self) -> RecommendationLevel {
        self.evidence.recommendation
    }
}

/// Provenance record emitted when dedup folds one signal into another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    /// Signal that stayed in the accepted set.
    pub kept_id: String,
    /// Signals dropped as duplicates of `kept_id`.
    pub merged_ids: Vec<String>,
    /// Why the last merge fired.
    pub reason: String,
}

/// Output of one ranking pass: ordered signals plus dedup side channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedBatch {
    pub channel_id: String,
    pub signals: Vec<ScoredSignal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merges: Vec<MergeRecord>,
    pub learning_applied: bool,
}
