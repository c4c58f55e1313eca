//! Keyword-overlap scoring of a signal against taxonomy topics.
//!
//! Keywords are not equal: a curated high-value set (named entities, specific
//! commodities, specific instruments) scores 25 per hit, ordinary keywords
//! 10, and generic words that show up across many topics only 3. A topic
//! whose matches are all generic gets its score cut by 70% so generic-word
//! noise cannot win ties. Simultaneous matches earn bonuses, entity backing
//! and a display-name hit earn more, and the resulting confidence decides
//! whether the match stands on its own or goes to arbitration.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::config::MatcherConfig;
use crate::fingerprint::EntitySet;
use crate::taxonomy::TopicDefinition;

/// Specific, identity-bearing keywords. A hit here is strong evidence.
static HIGH_VALUE_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "china", "iran", "russia", "israel", "saudi", "qatar", "yemen", "syria", "ukraine",
        "turkey", "egypt", "europe", "venezuela", "taiwan", "greenland",
        "tariff", "tariffs", "sanctions", "embargo",
        "oil", "lng", "gas", "nuclear", "uranium", "lithium",
        "bitcoin", "crypto", "blockchain",
        "tesla", "nvidia", "openai", "chatgpt", "aramco", "opec",
        "missile", "drone", "houthi", "hezbollah", "hamas",
        "trump", "putin", "musk", "powell", "maduro",
    ]
    .into_iter()
    .collect()
});

/// Words that appear in almost any news domain; nearly worthless alone.
static GENERIC_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "war", "economy", "economic", "economics", "market", "markets", "trade", "business",
        "finance", "financial", "money", "investment", "investments", "crisis", "conflict",
        "politics", "political", "government", "policy", "news", "report", "analysis",
        "update", "global", "world", "international", "president", "leader", "minister",
        "official", "country", "nation", "growth", "price", "prices",
    ]
    .into_iter()
    .collect()
});

/// Trigger words that need context: even a confident keyword match gets
/// arbitrated when one of these appears in the signal.
static AMBIGUOUS_TRIGGERS: &[&str] = &[
    "war", "market", "crisis", "conflict", "economy", "investment",
];

const HIGH_VALUE_POINTS: f32 = 25.0;
const REGULAR_POINTS: f32 = 10.0;
const GENERIC_POINTS: f32 = 3.0;
const ENTITY_POINTS: f32 = 20.0;
const NAME_POINTS: f32 = 25.0;
const TWO_MATCH_BONUS: f32 = 10.0;
const THREE_MATCH_BONUS: f32 = 15.0;
const GENERIC_ONLY_FACTOR: f32 = 0.3;

/// Outcome of scoring one topic against one signal.
#[derive(Debug, Clone)]
pub struct KeywordScore {
    pub topic_id: String,
    pub topic_name: String,
    /// Score after the generic-only discount.
    pub score: f32,
    /// Score before the discount; equal to `score` when no discount fired.
    pub raw_score: f32,
    pub matched_keywords: Vec<String>,
    pub high_value_matches: Vec<String>,
    pub generic_matches: Vec<String>,
    pub name_matched: bool,
    pub entity_backed: bool,
}

impl KeywordScore {
    /// All matched keywords were generic and nothing else supported the topic.
    pub fn generic_only(&self) -> bool {
        !self.matched_keywords.is_empty()
            && self.high_value_matches.is_empty()
            && self.matched_keywords.len() == self.generic_matches.len()
            && !self.name_matched
            && !self.entity_backed
    }

    pub fn discounted(&self) -> bool {
        self.raw_score > self.score
    }

    /// Independent supports behind this match: distinct keyword hits, a
    /// display-name hit, entity backing.
    pub fn support_hits(&self) -> usize {
        self.matched_keywords.len()
            + usize::from(self.name_matched)
            + usize::from(self.entity_backed)
    }

    /// A score is only a candidate when it clears the bar AND is supported
    /// by an entity/high-value hit or by at least two keyword matches.
    pub fn is_candidate(&self, cfg: &MatcherConfig) -> bool {
        let supported = !self.high_value_matches.is_empty()
            || self.entity_backed
            || self.matched_keywords.len() >= 2;
        self.score >= cfg.accept_score && supported
    }

    /// Confidence on a 0–100 scale. 90+ means the keyword result stands
    /// without arbitration.
    pub fn confidence(&self, signal_text: &str, cfg: &MatcherConfig) -> f32 {
        let mut conf: f32 = 60.0;
        match self.support_hits() {
            0 | 1 => {}
            2 => conf += 15.0,
            _ => conf += 30.0,
        }
        if !self.high_value_matches.is_empty() || self.entity_backed {
            conf += 5.0;
        }
        conf = conf.min(95.0);
        if self.generic_only() || has_ambiguous_trigger(signal_text) {
            conf = conf.min(cfg.ambiguous_confidence_cap);
        }
        conf
    }
}

/// True when the signal text contains a word that needs context before we
/// trust any keyword match ("war", "market", "crisis", ...).
pub fn has_ambiguous_trigger(normalized_text: &str) -> bool {
    normalized_text
        .split(' ')
        .any(|w| AMBIGUOUS_TRIGGERS.contains(&w))
}

/// Score a single topic. Returns `None` when nothing matched at all.
pub fn score_topic(
    normalized_text: &str,
    entities: &EntitySet,
    topic: &TopicDefinition,
) -> Option<KeywordScore> {
    let mut score = 0.0f32;
    let mut matched: Vec<String> = Vec::new();
    let mut high_value: Vec<String> = Vec::new();
    let mut generic: Vec<String> = Vec::new();

    for keyword in topic.all_keywords() {
        if !normalized_text.contains(&keyword) {
            continue;
        }
        if matched.contains(&keyword) {
            continue;
        }
        if HIGH_VALUE_KEYWORDS.contains(keyword.as_str()) {
            score += HIGH_VALUE_POINTS;
            high_value.push(keyword.clone());
        } else if GENERIC_KEYWORDS.contains(keyword.as_str()) {
            score += GENERIC_POINTS;
            generic.push(keyword.clone());
        } else {
            score += REGULAR_POINTS;
        }
        matched.push(keyword);
    }

    // Entity backing: upstream-extracted entities hitting topic keywords
    // outrank plain text containment.
    let entity_text = entities.flat_text();
    let mut entity_backed = false;
    if !entity_text.is_empty() {
        for keyword in topic.all_keywords() {
            if entity_text.contains(&keyword) {
                score += ENTITY_POINTS;
                entity_backed = true;
            }
        }
    }

    // Display name appearing verbatim in the signal.
    let name_norm = crate::fingerprint::normalize(&topic.name);
    let name_matched = !name_norm.is_empty() && normalized_text.contains(&name_norm);
    if name_matched {
        score += NAME_POINTS;
    }

    if matched.is_empty() && !entity_backed && !name_matched {
        return None;
    }

    let raw_score = {
        // Simultaneous-match bonus, only when something non-generic matched.
        let non_generic = matched.len() - generic.len();
        let mut s = score;
        if !high_value.is_empty() || non_generic > 0 {
            if matched.len() >= 2 {
                s += TWO_MATCH_BONUS;
            }
            if matched.len() >= 3 {
                s += THREE_MATCH_BONUS;
            }
        }
        s
    };

    let generic_only = !matched.is_empty()
        && high_value.is_empty()
        && matched.len() == generic.len()
        && !name_matched
        && !entity_backed;
    let final_score = if generic_only {
        (raw_score * GENERIC_ONLY_FACTOR).floor()
    } else {
        raw_score
    };

    Some(KeywordScore {
        topic_id: topic.topic_id.clone(),
        topic_name: topic.name.clone(),
        score: final_score,
        raw_score,
        matched_keywords: matched,
        high_value_matches: high_value,
        generic_matches: generic,
        name_matched,
        entity_backed,
    })
}

/// Score every topic and return candidates sorted by descending score.
pub fn rank_topics(
    normalized_text: &str,
    entities: &EntitySet,
    topics: &[TopicDefinition],
) -> Vec<KeywordScore> {
    let mut scores: Vec<KeywordScore> = topics
        .iter()
        .filter_map(|t| score_topic(normalized_text, entities, t))
        .collect();
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::{normalize, SemanticFingerprint};

    fn interest_rates_topic() -> TopicDefinition {
        TopicDefinition::new("interest_rates", "Interest Rates")
            .with_keywords(["interest rate", "central bank", "rate hike"])
    }

    #[test]
    fn three_support_hits_clear_the_very_high_cutoff() {
        let cfg = MatcherConfig::default();
        let text = normalize("Central bank raises interest rates by 0.5%");
        let topic = interest_rates_topic();
        let score = score_topic(&text, &EntitySet::default(), &topic).expect("match");

        // two keyword hits plus the display-name hit
        assert_eq!(score.matched_keywords.len(), 2);
        assert!(score.name_matched);
        assert_eq!(score.support_hits(), 3);
        assert!(score.is_candidate(&cfg));
        assert!(score.confidence(&text, &cfg) >= cfg.very_high_confidence);
    }

    #[test]
    fn generic_only_match_is_discounted_and_capped() {
        let cfg = MatcherConfig::default();
        let topic = TopicDefinition::new("macro", "Macro Watch").with_keywords([
            "economy", "market", "trade", "finance", "investment", "crisis", "policy",
            "growth", "business",
        ]);
        let text = normalize(
            "economy market trade finance investment crisis policy growth business outlook",
        );
        let score = score_topic(&text, &EntitySet::default(), &topic).expect("match");

        assert!(score.generic_only());
        assert!(score.discounted());
        assert!(score.score < score.raw_score);
        // generic-only can never skip arbitration
        assert!(score.confidence(&text, &cfg) < cfg.very_high_confidence);
    }

    #[test]
    fn high_value_keyword_scores_far_above_generic() {
        let topic_hv = TopicDefinition::new("china", "US-China").with_keywords(["china"]);
        let topic_gen = TopicDefinition::new("econ", "Economy").with_keywords(["economy"]);
        let text = normalize("China economy slows");
        let hv = score_topic(&text, &EntitySet::default(), &topic_hv).unwrap();
        let generic = score_topic(&text, &EntitySet::default(), &topic_gen).unwrap();
        assert!(hv.score > generic.raw_score * 2.5);
    }

    #[test]
    fn entity_backing_raises_score_and_marks_support() {
        let topic = TopicDefinition::new("energy", "Energy Markets").with_keywords(["oil", "opec"]);
        let fp = SemanticFingerprint::derive("OPEC tightens oil output", "");
        let text = normalize("OPEC tightens oil output");
        let score = score_topic(&text, &fp.entities, &topic).unwrap();
        assert!(score.entity_backed);
        assert!(score.score >= 50.0);
    }

    #[test]
    fn ambiguous_trigger_caps_confidence() {
        let cfg = MatcherConfig::default();
        let topic = TopicDefinition::new("mideast", "Middle East")
            .with_keywords(["israel", "gaza", "ceasefire"]);
        let text = normalize("Israel ceasefire talks stall as war widens in Gaza");
        let score = score_topic(&text, &EntitySet::default(), &topic).unwrap();
        assert!(score.is_candidate(&cfg));
        assert!(score.confidence(&text, &cfg) <= cfg.ambiguous_confidence_cap);
    }

    #[test]
    fn rank_topics_orders_by_score() {
        let topics = vec![
            TopicDefinition::new("energy", "Energy").with_keywords(["oil", "opec"]),
            TopicDefinition::new("econ", "Economy").with_keywords(["economy"]),
        ];
        let text = normalize("OPEC oil cuts rattle the economy");
        let ranked = rank_topics(&text, &EntitySet::default(), &topics);
        assert_eq!(ranked[0].topic_id, "energy");
        assert_eq!(ranked.len(), 2);
    }
}
