//! Channel taxonomy ("DNA"): the per-channel set of topic definitions the
//! matcher scores signals against.
//!
//! Topic definitions are owned by the channel and supplied by a collaborator;
//! the core only reads them. Besides curated keywords, each topic carries a
//! growable `learned_keywords` sublist and historical performance stats.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Historical performance of one topic on this channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicStats {
    pub match_count: u32,
    pub liked_count: u32,
    pub produced_count: u32,
    pub avg_audience: f32,
}

impl TopicStats {
    /// Liked + produced over matches, in [0, 1]. Zero matches reads as zero.
    pub fn success_rate(&self) -> f32 {
        if self.match_count == 0 {
            return 0.0;
        }
        let wins = (self.liked_count + self.produced_count) as f32;
        (wins / self.match_count as f32).min(1.0)
    }
}

/// One taxonomy node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicDefinition {
    pub topic_id: String,
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Keywords promoted by background analytics; matched like `keywords`.
    #[serde(default)]
    pub learned_keywords: Vec<String>,
    #[serde(default)]
    pub stats: TopicStats,
}

impl TopicDefinition {
    pub fn new(topic_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            topic_id: topic_id.into(),
            name: name.into(),
            keywords: Vec::new(),
            learned_keywords: Vec::new(),
            stats: TopicStats::default(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Curated and learned keywords, lowercased, shortest-last dropped
    /// (anything under 3 chars is noise for containment matching).
    pub fn all_keywords(&self) -> impl Iterator<Item = String> + '_ {
        self.keywords
            .iter()
            .chain(self.learned_keywords.iter())
            .map(|k| k.trim().to_lowercase())
            .filter(|k| k.len() >= 3)
    }
}

/// Collaborator boundary: channel id -> topic definitions.
#[async_trait]
pub trait TaxonomyReader: Send + Sync {
    async fn topics_for(&self, channel_id: &str) -> Vec<TopicDefinition>;
}

/// Fixed in-memory taxonomy, for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaxonomy {
    topics: Vec<TopicDefinition>,
}

impl InMemoryTaxonomy {
    pub fn new(topics: Vec<TopicDefinition>) -> Self {
        Self { topics }
    }
}

#[async_trait]
impl TaxonomyReader for InMemoryTaxonomy {
    async fn topics_for(&self, _channel_id: &str) -> Vec<TopicDefinition> {
        self.topics.clone()
    }
}
