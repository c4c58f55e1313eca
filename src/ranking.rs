//! Ranking and tiering: learned weights over evidence scores, hidden-topic
//! filtering with a hard protection invariant, and urgency-banded tiers.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RankingConfig;
use crate::evidence::EvidenceKind;
use crate::fingerprint::{normalize, word_overlap, SemanticFingerprint};
use crate::learning::{
    FeedbackAction, FeedbackEvent, LearningWeights, ANGLE_PATTERN_THRESHOLD,
    EVIDENCE_PATTERN_THRESHOLD, REASON_ANGLE_TOO_BROAD, REASON_NEEDS_STRONG_EVIDENCE,
};
use crate::signal::{ScoredSignal, Tier};

// ---- angle analysis ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleType {
    None,
    Question,
    Inquiry,
    Relationship,
    Event,
    Timely,
    Comparison,
    BroadEntity,
}

/// Does this topic string carry a specific angle, or is it a bare subject?
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleAnalysis {
    pub has_angle: bool,
    pub angle_type: AngleType,
    pub confidence: f32,
    pub is_question: bool,
}

static QUESTION_WORDS: &[&str] = &["how", "why", "what", "when", "where", "which", "who", "will"];
static RELATION_WORDS: &[&str] = &[
    "between", "against", "versus", "vs", "impact", "future", "under", "after", "behind",
];
static ACTION_WORDS: &[&str] = &[
    "announces", "reveals", "warns", "threatens", "imposes", "rises", "falls", "surges",
    "collapses", "acquisition", "deal", "bans", "blocks", "cuts",
];
static CONTEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(202\d|new|latest|upcoming|exclusive|breaking)\b").expect("context regex"));

pub fn analyze_angle(topic: &str) -> AngleAnalysis {
    let trimmed = topic.trim();
    if trimmed.is_empty() {
        return AngleAnalysis {
            has_angle: false,
            angle_type: AngleType::None,
            confidence: 0.0,
            is_question: false,
        };
    }

    let norm = normalize(trimmed);
    let words: Vec<&str> = norm.split(' ').filter(|w| !w.is_empty()).collect();
    let mut confidence = 0.0f32;
    let mut angle_type = AngleType::None;
    let is_question = trimmed.contains('?');

    if is_question {
        confidence += 0.4;
        angle_type = AngleType::Question;
    }
    if words
        .first()
        .map(|w| QUESTION_WORDS.contains(w))
        .unwrap_or(false)
    {
        confidence += 0.3;
        if angle_type == AngleType::None {
            angle_type = AngleType::Inquiry;
        }
    }
    let relation_hits = RELATION_WORDS.iter().filter(|w| words.contains(*w)).count();
    if relation_hits >= 1 {
        confidence += (relation_hits as f32 * 0.1).min(0.3);
        if angle_type == AngleType::None {
            angle_type = AngleType::Relationship;
        }
    }
    if ACTION_WORDS.iter().any(|w| words.contains(w)) {
        confidence += 0.3;
        if angle_type == AngleType::None {
            angle_type = AngleType::Event;
        }
    }
    if CONTEXT_RE.is_match(&norm) {
        confidence += 0.2;
        if angle_type == AngleType::None {
            angle_type = AngleType::Timely;
        }
    }

    // Longer topics tend to carry their own context.
    let char_len = trimmed.chars().count();
    if char_len > 35 {
        confidence += 0.2;
    } else if char_len < 20 {
        confidence -= 0.3;
    }

    // Two or more named entities reads as a comparison/relationship.
    let fp = SemanticFingerprint::derive(trimmed, "");
    let entity_count = fp.entities.people.len()
        + fp.entities.countries.len()
        + fp.entities.organizations.len();
    if entity_count >= 2 {
        confidence += 0.3;
        if angle_type == AngleType::None || angle_type == AngleType::Relationship {
            angle_type = AngleType::Comparison;
        }
    }

    // A single entity with no surrounding context is the canonical broad topic.
    if entity_count == 1 && words.len() <= 2 {
        return AngleAnalysis {
            has_angle: false,
            angle_type: AngleType::BroadEntity,
            confidence: 0.0,
            is_question,
        };
    }

    let confidence = confidence.clamp(0.0, 1.0);
    AngleAnalysis {
        has_angle: confidence >= 0.3,
        angle_type,
        confidence,
        is_question,
    }
}

// ---- hidden topics ----

/// Topics withheld from the channel: rejected forever, produced for a
/// trailing window, liked never (they are protected instead).
#[derive(Debug, Clone, Default)]
pub struct HiddenTopics {
    hidden: Vec<String>,
}

impl HiddenTopics {
    pub fn from_history(
        history: &[FeedbackEvent],
        now: DateTime<Utc>,
        cfg: &RankingConfig,
    ) -> Self {
        let produced_cutoff = Duration::hours(cfg.hide_produced_hours);
        let mut hidden = Vec::new();
        for event in history {
            let norm = normalize(&event.topic);
            if norm.is_empty() || hidden.contains(&norm) {
                continue;
            }
            match event.action {
                FeedbackAction::Rejected => hidden.push(norm),
                FeedbackAction::Produced => {
                    if now - event.created_at < produced_cutoff {
                        hidden.push(norm);
                    }
                }
                _ => {}
            }
        }
        Self { hidden }
    }

    pub fn len(&self) -> usize {
        self.hidden.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hidden.is_empty()
    }

    /// Exact or fuzzy (word-overlap) membership.
    pub fn contains(&self, topic: &str, fuzzy_overlap: f32) -> bool {
        let norm = normalize(topic);
        if norm.is_empty() {
            return false;
        }
        self.hidden
            .iter()
            .any(|h| h == &norm || word_overlap(h, &norm) > fuzzy_overlap)
    }
}

// ---- ranking ----

/// Apply learning, drop hidden topics, clamp, sort, tier.
///
/// `signals` arrive already deduplicated with their evidence-based
/// `base_score` filled in. A missing or thin weights record means no weight
/// application at all; the batch still ranks.
pub fn rank(
    mut signals: Vec<ScoredSignal>,
    weights: Option<&LearningWeights>,
    history: &[FeedbackEvent],
    cfg: &RankingConfig,
    now: DateTime<Utc>,
) -> (Vec<ScoredSignal>, bool) {
    let hidden = HiddenTopics::from_history(history, now, cfg);
    let learning_active = weights
        .map(|w| w.has_sufficient_data(cfg.min_feedback_count))
        .unwrap_or(false);
    if !learning_active {
        debug!("insufficient learning data, ranking on evidence scores only");
    }

    // Protection first: an ever-liked topic must survive hiding no matter
    // what the weights have decayed to.
    for s in signals.iter_mut() {
        if let Some(w) = weights {
            if w.is_protected(&s.signal.title) {
                s.protected = true;
            }
        }
    }

    let before = signals.len();
    signals.retain(|s| {
        if s.protected {
            return true;
        }
        if hidden.contains(&s.signal.title, cfg.fuzzy_hidden_overlap) {
            info!(signal = %s.signal.id, "hiding previously rejected/produced topic");
            return false;
        }
        true
    });
    if signals.len() != before {
        debug!(hidden = before - signals.len(), kept = signals.len(), "hidden-topic filter applied");
    }

    for s in signals.iter_mut() {
        let mut score = s.base_score;
        let mut adjustments = Vec::new();

        if s.protected {
            s.final_score = 100.0;
            s.adjustments = vec!["protected: user_liked".into()];
            s.learning_applied = learning_active;
            continue;
        }

        let angle = analyze_angle(&s.signal.title);

        if learning_active {
            let w = weights.expect("learning_active implies weights");

            let topic_boost = w.topic_boost(&s.signal.title);
            if (topic_boost - 1.0).abs() > f32::EPSILON {
                score *= topic_boost;
                adjustments.push(format!("topic: {topic_boost:.2}x"));
            }

            let fmt = w.format_weights();
            let format_boost = if angle.has_angle && angle.confidence >= 0.5 {
                fmt.specific_angle
            } else if angle.has_angle {
                fmt.specific_angle.sqrt()
            } else {
                fmt.broad_topic
            };
            let format_boost = if angle.angle_type == AngleType::Question {
                format_boost * fmt.question_format
            } else {
                format_boost
            };
            if (format_boost - 1.0).abs() > f32::EPSILON {
                score *= format_boost;
                adjustments.push(format!("format: {format_boost:.2}x"));
            }

            let kinds_found: Vec<EvidenceKind> = s
                .evidence
                .findings
                .iter()
                .filter(|f| f.found)
                .map(|f| f.kind)
                .collect();
            let evidence_boost = w.evidence_boost(&kinds_found);
            if (evidence_boost - 1.0).abs() > f32::EPSILON {
                score *= evidence_boost;
                adjustments.push(format!("evidence: {evidence_boost:.2}x"));
            }

            let penalty = rejection_penalty(w, &angle, s);
            if (penalty - 1.0).abs() > f32::EPSILON {
                score *= penalty;
                adjustments.push(format!("rejection_pattern: {penalty:.2}x"));
            }
        }

        // Domain urgency adds a bounded bonus instead of bypassing bands.
        let bonus = urgency_bonus(s, cfg, now);
        if bonus > 0.0 {
            score += bonus;
            adjustments.push(format!("urgency: +{bonus:.0}"));
        }

        s.final_score = score.round().clamp(1.0, 100.0);
        s.learning_applied = learning_active && !adjustments.is_empty();
        s.adjustments = adjustments;
    }

    signals.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for s in signals.iter_mut() {
        let (tier, reason) = assign_tier(s, cfg);
        s.tier = tier;
        s.tier_reason = reason;
    }

    (signals, learning_active)
}

fn rejection_penalty(w: &LearningWeights, angle: &AngleAnalysis, s: &ScoredSignal) -> f32 {
    let mut penalty = 1.0;
    if w.rejection_count(REASON_ANGLE_TOO_BROAD) >= ANGLE_PATTERN_THRESHOLD {
        if !angle.has_angle {
            penalty *= 0.5;
        } else if angle.confidence < 0.4 {
            penalty *= 0.7;
        }
    }
    if w.rejection_count(REASON_NEEDS_STRONG_EVIDENCE) >= EVIDENCE_PATTERN_THRESHOLD
        && s.evidence.is_weakly_evidenced()
    {
        penalty *= 0.7;
    }
    penalty
}

/// Bounded urgency bonus: strong fresh competitor movement, or a hard expiry
/// window closing within a day.
fn urgency_bonus(s: &ScoredSignal, cfg: &RankingConfig, now: DateTime<Utc>) -> f32 {
    let mut bonus = 0.0;
    let competitor = s.evidence.score_of(EvidenceKind::CompetitorVideos);
    if competitor >= 10.0 && s.recency >= 0.8 {
        bonus += cfg.urgency_bonus;
    }
    if let Some(expiry) = s.signal.expires_at {
        if expiry > now && expiry - now <= Duration::hours(24) {
            bonus += cfg.urgency_bonus * 1.5;
        }
    }
    bonus
}

fn assign_tier(s: &ScoredSignal, cfg: &RankingConfig) -> (Tier, String) {
    if !s.topic.is_matched() {
        return (Tier::Rejected, "no topic match".into());
    }
    if s.final_score >= cfg.post_today_score {
        (Tier::PostToday, "score in the post-today band".into())
    } else if s.final_score >= cfg.this_week_score {
        (Tier::ThisWeek, "score in the this-week band".into())
    } else {
        (Tier::Evergreen, "below the urgency bands".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceReport;
    use crate::matcher::{MatchSource, TopicMatch};
    use crate::signal::Signal;

    fn scored(id: &str, title: &str, base: f32) -> ScoredSignal {
        ScoredSignal {
            signal: Signal::new(id, title, "feed"),
            topic: TopicMatch::Matched {
                topic_id: "t1".into(),
                confidence: 0.9,
                source: MatchSource::Keyword,
                reason: "test".into(),
            },
            evidence: EvidenceReport::empty(),
            base_score: base,
            final_score: 0.0,
            tier: Tier::Evergreen,
            tier_reason: String::new(),
            learning_applied: false,
            adjustments: Vec::new(),
            protected: false,
            sources: vec!["feed".into()],
            source_count: 1,
            recency: 1.0,
        }
    }

    fn liked_weights(topic: &str, times: u32) -> LearningWeights {
        let mut w = LearningWeights::default();
        for _ in 0..times {
            w.record(&FeedbackEvent::new("ch1", topic, FeedbackAction::Liked))
                .unwrap();
        }
        w
    }

    #[test]
    fn question_topics_have_angles() {
        let a = analyze_angle("Why is the dollar falling against gold?");
        assert!(a.has_angle);
        assert!(a.is_question);

        let broad = analyze_angle("China");
        assert!(!broad.has_angle);
        assert_eq!(broad.angle_type, AngleType::BroadEntity);
    }

    #[test]
    fn comparison_of_two_entities_is_an_angle() {
        let a = analyze_angle("China versus India in the race for chips");
        assert!(a.has_angle);
    }

    #[test]
    fn scenario_c_single_feedback_means_no_learning() {
        let w = liked_weights("oil rally", 1);
        let signals = vec![scored("s1", "Gold outlook for central banks", 50.0)];
        let (ranked, active) = rank(signals, Some(&w), &[], &RankingConfig::default(), Utc::now());
        assert!(!active);
        assert!(ranked.iter().all(|s| !s.learning_applied));
        assert!((ranked[0].final_score - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn missing_weights_record_still_ranks() {
        let signals = vec![scored("s1", "Gold outlook for central banks", 50.0)];
        let (ranked, active) = rank(signals, None, &[], &RankingConfig::default(), Utc::now());
        assert!(!active);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn rejected_topics_are_hidden_exact_and_fuzzy() {
        let now = Utc::now();
        let cfg = RankingConfig::default();
        let history = vec![FeedbackEvent::new(
            "ch1",
            "US China trade war escalates",
            FeedbackAction::Rejected,
        )];
        let signals = vec![
            scored("s1", "US China trade war escalates", 70.0),
            scored("s2", "China trade war escalates", 65.0),
            scored("s3", "Gold hits record high", 60.0),
        ];
        let (ranked, _) = rank(signals, None, &history, &cfg, now);
        let ids: Vec<&str> = ranked.iter().map(|s| s.signal.id.as_str()).collect();
        assert_eq!(ids, vec!["s3"], "both exact and paraphrased repeats hidden");
    }

    #[test]
    fn produced_topics_hide_only_within_window() {
        let now = Utc::now();
        let cfg = RankingConfig::default();
        let mut recent = FeedbackEvent::new("ch1", "Oil supply shock", FeedbackAction::Produced);
        recent.created_at = now - Duration::hours(24);
        let mut old = FeedbackEvent::new("ch1", "Gold rally explained", FeedbackAction::Produced);
        old.created_at = now - Duration::hours(cfg.hide_produced_hours + 1);

        let signals = vec![
            scored("s1", "Oil supply shock", 70.0),
            scored("s2", "Gold rally explained", 60.0),
        ];
        let (ranked, _) = rank(signals, None, &[recent, old], &cfg, now);
        let ids: Vec<&str> = ranked.iter().map(|s| s.signal.id.as_str()).collect();
        assert_eq!(ids, vec!["s2"]);
    }

    #[test]
    fn protection_invariant_beats_hiding_and_decay() {
        let now = Utc::now();
        let cfg = RankingConfig::default();
        let topic = "Saudi wealth fund buys gaming giants";

        // liked once (protected), then rejected many times so both the hidden
        // set and the decayed weight argue for dropping it
        let mut w = LearningWeights::default();
        w.record(&FeedbackEvent::new("ch1", topic, FeedbackAction::Liked))
            .unwrap();
        let mut history = Vec::new();
        for _ in 0..5 {
            let e = FeedbackEvent::new("ch1", topic, FeedbackAction::Rejected);
            w.record(&e).unwrap();
            history.push(e);
        }

        let signals = vec![scored("s1", topic, 20.0)];
        let (ranked, _) = rank(signals, Some(&w), &history, &cfg, now);
        assert_eq!(ranked.len(), 1, "protected topic must never be filtered");
        assert!(ranked[0].protected);
        assert!((ranked[0].final_score - 100.0).abs() < f32::EPSILON);
        assert_eq!(ranked[0].tier, Tier::PostToday);
    }

    #[test]
    fn clamping_holds_under_adversarial_weights() {
        let cfg = RankingConfig::default();
        let mut w = liked_weights("gold", 3);
        // push weights far outside [0.1, 10]
        w.topic_weights.get_mut("topic_gold").unwrap().weight = 1e6;
        let signals = vec![scored("s1", "gold rally versus dollar this year", 90.0)];
        let (ranked, _) = rank(signals, Some(&w), &[], &cfg, Utc::now());
        assert!(ranked[0].final_score <= 100.0);

        let mut w = liked_weights("gold", 3);
        w.topic_weights.get_mut("topic_gold").unwrap().weight = 1e-6;
        let signals = vec![scored("s1", "gold rally versus dollar this year", 90.0)];
        let (ranked, _) = rank(signals, Some(&w), &[], &cfg, Utc::now());
        assert!(ranked[0].final_score >= 1.0);
    }

    #[test]
    fn angle_penalty_activates_only_past_threshold() {
        let cfg = RankingConfig::default();
        let broad_title = "China";

        // one angle_too_broad rejection: below threshold, no penalty yet
        let mut w = liked_weights("unrelated liked topic keeps counts up", 3);
        w.record(
            &FeedbackEvent::new("ch1", "Russia", FeedbackAction::Rejected)
                .with_reason(REASON_ANGLE_TOO_BROAD),
        )
        .unwrap();
        let (ranked, _) = rank(
            vec![scored("s1", broad_title, 60.0)],
            Some(&w),
            &[],
            &cfg,
            Utc::now(),
        );
        let before = ranked[0].final_score;

        // second rejection crosses the threshold and the penalty bites
        w.record(
            &FeedbackEvent::new("ch1", "Venezuela", FeedbackAction::Rejected)
                .with_reason(REASON_ANGLE_TOO_BROAD),
        )
        .unwrap();
        let (ranked, _) = rank(
            vec![scored("s1", broad_title, 60.0)],
            Some(&w),
            &[],
            &cfg,
            Utc::now(),
        );
        assert!(
            ranked[0].final_score < before,
            "penalty must bite after the counter crosses its threshold ({} !< {})",
            ranked[0].final_score,
            before
        );
    }

    #[test]
    fn unmatched_signals_fall_to_rejected_tier() {
        let cfg = RankingConfig::default();
        let mut s = scored("s1", "completely unmatched thing", 90.0);
        s.topic = TopicMatch::Unmatched {
            reason: "nothing fit".into(),
        };
        let (ranked, _) = rank(vec![s], None, &[], &cfg, Utc::now());
        assert_eq!(ranked[0].tier, Tier::Rejected);
    }

    #[test]
    fn tiers_follow_score_bands() {
        let cfg = RankingConfig::default();
        let signals = vec![
            scored("hot", "Oil shock and the dollar endgame this year", 85.0),
            scored("warm", "Gold accumulation by central banks", 55.0),
            scored("cold", "History of currency boards", 20.0),
        ];
        let (ranked, _) = rank(signals, None, &[], &cfg, Utc::now());
        assert_eq!(ranked[0].tier, Tier::PostToday);
        assert_eq!(ranked[1].tier, Tier::ThisWeek);
        assert_eq!(ranked[2].tier, Tier::Evergreen);
    }

    #[test]
    fn urgency_override_adds_bounded_bonus_not_a_bypass() {
        let cfg = RankingConfig::default();
        let now = Utc::now();
        let mut s = scored("s1", "Competitor wave on lithium supply", 45.0);
        // strong fresh competitor evidence
        s.evidence.findings[2].found = true;
        s.evidence.findings[2].score = 15.0;
        s.recency = 1.0;
        let (ranked, _) = rank(vec![s], None, &[], &cfg, now);
        // 45 + 10 bonus = 55: promoted one band by the bonus, not straight to the top
        assert!((ranked[0].final_score - 55.0).abs() < f32::EPSILON);
        assert_eq!(ranked[0].tier, Tier::ThisWeek);
    }
}
