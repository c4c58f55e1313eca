//! Hybrid topic matching: keywords first, model arbitration for anything
//! below the very-high-confidence bar, keyword fallback when the model is
//! unreachable.

pub mod arbiter;
pub mod keywords;
pub mod sanity;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MatcherConfig;
use crate::fingerprint::SemanticFingerprint;
use crate::matcher::arbiter::{Arbiter, ArbitrationProvider, TopicCandidate};
use crate::matcher::keywords::KeywordScore;
use crate::taxonomy::TopicDefinition;

/// Where the final match decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// Upstream classification already carried a topic id.
    Direct,
    /// Keyword result cleared the very-high bar on its own.
    Keyword,
    /// Model arbitration decided.
    Model,
    /// Keyword candidate used because the model was unreachable.
    Fallback,
}

/// Explicit tagged match result: callers branch on provenance instead of
/// inferring it from logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TopicMatch {
    Matched {
        topic_id: String,
        /// 0–1.
        confidence: f32,
        source: MatchSource,
        reason: String,
    },
    Unmatched {
        reason: String,
    },
}

impl TopicMatch {
    pub fn topic_id(&self) -> Option<&str> {
        match self {
            TopicMatch::Matched { topic_id, .. } => Some(topic_id),
            TopicMatch::Unmatched { .. } => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, TopicMatch::Matched { .. })
    }

    pub fn source(&self) -> Option<MatchSource> {
        match self {
            TopicMatch::Matched { source, .. } => Some(*source),
            TopicMatch::Unmatched { .. } => None,
        }
    }
}

/// How many shortlisted candidates the model sees.
const SHORTLIST_LIMIT: usize = 5;

/// Match one signal against the channel taxonomy.
///
/// `fingerprint` supplies the extracted entities; `upstream_topic_id` short-
/// circuits everything when it names a known topic. Arbitration failures
/// degrade to the keyword candidate and never propagate.
pub async fn match_topic<P: ArbitrationProvider>(
    signal_text_normalized: &str,
    upstream_topic_id: Option<&str>,
    fingerprint: &SemanticFingerprint,
    topics: &[TopicDefinition],
    arbiter: &Arbiter<P>,
    cfg: &MatcherConfig,
) -> TopicMatch {
    if topics.is_empty() {
        return TopicMatch::Unmatched {
            reason: "channel has no topic definitions".into(),
        };
    }

    // 1) Upstream classification wins outright.
    if let Some(id) = upstream_topic_id {
        if topics.iter().any(|t| t.topic_id == id) {
            return TopicMatch::Matched {
                topic_id: id.to_string(),
                confidence: 1.0,
                source: MatchSource::Direct,
                reason: "upstream classification".into(),
            };
        }
        debug!(topic_id = %id, "upstream topic id not in taxonomy, rescoring");
    }

    // 2) Keyword pass over the whole taxonomy.
    let ranked = keywords::rank_topics(signal_text_normalized, &fingerprint.entities, topics);
    let mut candidates: Vec<&KeywordScore> =
        ranked.iter().filter(|s| s.is_candidate(cfg)).collect();

    // 3) Hard sanity veto, independent of score.
    candidates.retain(|score| {
        match sanity::veto_reason(signal_text_normalized, &score.topic_id) {
            Some(reason) => {
                info!(topic_id = %score.topic_id, reason, "sanity veto on keyword match");
                false
            }
            None => true,
        }
    });

    let best = candidates.first().copied();

    // 4) Very high confidence stands on its own.
    if let Some(score) = best {
        let confidence = score.confidence(signal_text_normalized, cfg);
        if confidence >= cfg.very_high_confidence {
            return TopicMatch::Matched {
                topic_id: score.topic_id.clone(),
                confidence: confidence / 100.0,
                source: MatchSource::Keyword,
                reason: format!(
                    "keyword match ({} hits, score {:.0})",
                    score.support_hits(),
                    score.score
                ),
            };
        }
    }

    // 5) Arbitration over the shortlist. The model's verdict is final.
    let shortlist: Vec<TopicCandidate> = candidates
        .iter()
        .take(SHORTLIST_LIMIT)
        .map(|s| TopicCandidate {
            topic_id: s.topic_id.clone(),
            name: s.topic_name.clone(),
        })
        .collect();
    let shortlist = if shortlist.is_empty() {
        // No keyword candidate at all: let the model look at the taxonomy
        // head rather than nothing.
        topics
            .iter()
            .take(SHORTLIST_LIMIT)
            .map(|t| TopicCandidate {
                topic_id: t.topic_id.clone(),
                name: t.name.clone(),
            })
            .collect()
    } else {
        shortlist
    };

    match arbiter.arbitrate(signal_text_normalized, &shortlist).await {
        Ok(verdict) => match verdict.topic_id {
            Some(topic_id) => TopicMatch::Matched {
                topic_id,
                confidence: verdict.confidence,
                source: MatchSource::Model,
                reason: verdict.reason,
            },
            None => TopicMatch::Unmatched {
                reason: if verdict.reason.is_empty() {
                    "model found no matching topic".into()
                } else {
                    verdict.reason
                },
            },
        },
        // 6) Model unreachable: keyword fallback with degraded confidence.
        Err(e) => {
            warn!(error = %e, "arbitration unavailable, falling back to keywords");
            match best {
                Some(score) => {
                    let capped = score
                        .confidence(signal_text_normalized, cfg)
                        .min(cfg.fallback_confidence_cap);
                    TopicMatch::Matched {
                        topic_id: score.topic_id.clone(),
                        confidence: capped / 100.0,
                        source: MatchSource::Fallback,
                        reason: format!("keyword fallback, arbitration unavailable ({e})"),
                    }
                }
                None => TopicMatch::Unmatched {
                    reason: "no keyword candidate and arbitration unavailable".into(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArbiterConfig;
    use crate::fingerprint::normalize;
    use crate::matcher::arbiter::{ArbiterVerdict, DisabledProvider, MockProvider};

    fn taxonomy() -> Vec<TopicDefinition> {
        vec![
            TopicDefinition::new("interest_rates", "Interest Rates")
                .with_keywords(["interest rate", "central bank", "rate hike"]),
            TopicDefinition::new("us_china_geopolitics", "US-China Geopolitics")
                .with_keywords(["china", "tariff", "sanctions"]),
        ]
    }

    fn disabled_arbiter() -> Arbiter<DisabledProvider> {
        Arbiter::new(DisabledProvider, ArbiterConfig::default())
    }

    fn model_arbiter(topic: Option<&str>) -> Arbiter<MockProvider> {
        Arbiter::new(
            MockProvider::returning(ArbiterVerdict {
                topic_id: topic.map(String::from),
                confidence: 0.85,
                reason: "model pick".into(),
            }),
            ArbiterConfig::default(),
        )
    }

    #[tokio::test]
    async fn scenario_a_strong_keyword_match_skips_arbitration() {
        let cfg = MatcherConfig::default();
        let title = "Central bank raises interest rates by 0.5%";
        let text = normalize(title);
        let fp = SemanticFingerprint::derive(title, "");
        // a mock that would answer differently, to prove it is never asked
        let arbiter = model_arbiter(Some("us_china_geopolitics"));

        let got = match_topic(&text, None, &fp, &taxonomy(), &arbiter, &cfg).await;
        match got {
            TopicMatch::Matched {
                topic_id,
                confidence,
                source,
                ..
            } => {
                assert_eq!(topic_id, "interest_rates");
                assert_eq!(source, MatchSource::Keyword);
                assert!(confidence >= cfg.very_high_confidence / 100.0);
            }
            other => panic!("expected keyword match, got {other:?}"),
        }
        assert_eq!(arbiter_call_count(&arbiter), 0);
    }

    fn arbiter_call_count(arbiter: &Arbiter<MockProvider>) -> u32 {
        arbiter.provider_ref().call_count()
    }

    #[tokio::test]
    async fn upstream_topic_short_circuits() {
        let cfg = MatcherConfig::default();
        let fp = SemanticFingerprint::derive("anything", "");
        let got = match_topic(
            "anything",
            Some("interest_rates"),
            &fp,
            &taxonomy(),
            &disabled_arbiter(),
            &cfg,
        )
        .await;
        assert_eq!(got.source(), Some(MatchSource::Direct));
        assert_eq!(got.topic_id(), Some("interest_rates"));
    }

    #[tokio::test]
    async fn scenario_d_sanity_veto_blocks_cross_domain_match() {
        let cfg = MatcherConfig::default();
        let title = "Famous actor's new movie about China tariff war wins award";
        let text = normalize(title);
        let fp = SemanticFingerprint::derive(title, "");
        // keyword score for us_china_geopolitics would clear the bar, but the
        // entertainment vocabulary vetoes it; with arbitration down, nothing
        // is left to fall back on.
        let got = match_topic(&text, None, &fp, &taxonomy(), &disabled_arbiter(), &cfg).await;
        assert!(!got.is_matched(), "expected veto, got {got:?}");
    }

    #[tokio::test]
    async fn ambiguous_signal_defers_to_model_and_model_wins() {
        let cfg = MatcherConfig::default();
        let title = "Trade war rattles markets as China tariff deadline nears";
        let text = normalize(title);
        let fp = SemanticFingerprint::derive(title, "");
        let arbiter = model_arbiter(Some("us_china_geopolitics"));

        let got = match_topic(&text, None, &fp, &taxonomy(), &arbiter, &cfg).await;
        assert_eq!(got.source(), Some(MatchSource::Model));
        assert_eq!(got.topic_id(), Some("us_china_geopolitics"));
    }

    #[tokio::test]
    async fn model_no_match_is_final_despite_keyword_candidate() {
        let cfg = MatcherConfig::default();
        let title = "War of words over market access heats up with China";
        let text = normalize(title);
        let fp = SemanticFingerprint::derive(title, "");
        let arbiter = model_arbiter(None);

        let got = match_topic(&text, None, &fp, &taxonomy(), &arbiter, &cfg).await;
        assert!(!got.is_matched());
    }

    #[tokio::test]
    async fn dead_model_degrades_to_keyword_fallback() {
        let cfg = MatcherConfig::default();
        let title = "China tariff crisis deepens";
        let text = normalize(title);
        let fp = SemanticFingerprint::derive(title, "");

        let got = match_topic(&text, None, &fp, &taxonomy(), &disabled_arbiter(), &cfg).await;
        match got {
            TopicMatch::Matched {
                topic_id,
                confidence,
                source,
                ..
            } => {
                assert_eq!(topic_id, "us_china_geopolitics");
                assert_eq!(source, MatchSource::Fallback);
                assert!(confidence <= cfg.fallback_confidence_cap / 100.0);
            }
            other => panic!("expected fallback match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_taxonomy_is_unmatched_not_fatal() {
        let cfg = MatcherConfig::default();
        let fp = SemanticFingerprint::derive("anything at all", "");
        let got = match_topic("anything at all", None, &fp, &[], &disabled_arbiter(), &cfg).await;
        assert!(!got.is_matched());
    }
}
