//! Semantic deduplication: one accepted signal per real-world story.
//!
//! Two signals are the same story when their fingerprints overlap strongly
//! (entity overlap or similarity above the duplicate threshold) AND the
//! secondary heuristic agrees: they share a proper noun and landed within
//! the dedup time window. Borderline pairs are never merged: two similar
//! signals shown twice beat a distinct story silently dropped.
//!
//! Batch processing is order-dependent by contract: signals are visited in
//! descending initial-score order and each candidate is compared only
//! against the already-accepted set, so the more credible signal becomes
//! the kept one when duplicates collide.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DedupConfig;
use crate::fingerprint::SemanticFingerprint;
use crate::signal::{MergeRecord, Signal};

/// Outcome of a pairwise same-story check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SameStory {
    pub duplicate: bool,
    pub entity_overlap: f32,
    pub similarity: f32,
    pub reason: String,
}

/// Pure pairwise decision; identical inputs always produce the same answer.
pub fn same_story(
    a: &Signal,
    fp_a: &SemanticFingerprint,
    b: &Signal,
    fp_b: &SemanticFingerprint,
    cfg: &DedupConfig,
) -> SameStory {
    let entity_overlap = fp_a.entity_overlap(fp_b);
    let similarity = fp_a.similarity(fp_b);

    let over_threshold =
        entity_overlap >= cfg.duplicate_threshold || similarity >= cfg.duplicate_threshold;

    let within_window = {
        let gap = if a.published_at >= b.published_at {
            a.published_at - b.published_at
        } else {
            b.published_at - a.published_at
        };
        gap <= Duration::hours(cfg.window_hours)
    };
    let secondary = fp_a.shares_proper_noun(fp_b) && within_window;

    let duplicate = over_threshold && secondary;
    let reason = if duplicate {
        format!(
            "entity overlap {:.2}, similarity {:.2}, shared actors within {}h",
            entity_overlap, similarity, cfg.window_hours
        )
    } else if over_threshold {
        "overlap above threshold but secondary heuristic disagrees".into()
    } else {
        format!(
            "below threshold (overlap {:.2}, similarity {:.2})",
            entity_overlap, similarity
        )
    };

    SameStory {
        duplicate,
        entity_overlap,
        similarity,
        reason,
    }
}

/// A signal queued for dedup with its fingerprint and initial score.
#[derive(Debug, Clone)]
pub struct DedupCandidate<T> {
    pub signal: Signal,
    pub fingerprint: SemanticFingerprint,
    /// Evidence-based score used only for the processing order.
    pub initial_score: f32,
    /// Whatever the caller wants carried through (evidence report etc.).
    pub payload: T,
}

/// Accepted signal with merge provenance attached.
#[derive(Debug, Clone)]
pub struct Accepted<T> {
    pub signal: Signal,
    pub fingerprint: SemanticFingerprint,
    pub initial_score: f32,
    pub payload: T,
    pub sources: Vec<String>,
    pub merged_ids: Vec<String>,
    pub merge_reason: String,
    /// Earliest published timestamp across all merged sources.
    pub first_published: DateTime<Utc>,
}

impl<T> Accepted<T> {
    fn from_candidate(c: DedupCandidate<T>) -> Self {
        let first_published = c.signal.published_at;
        let sources = vec![c.signal.source.clone()];
        Self {
            signal: c.signal,
            fingerprint: c.fingerprint,
            initial_score: c.initial_score,
            payload: c.payload,
            sources,
            merged_ids: Vec::new(),
            merge_reason: String::new(),
            first_published,
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    fn absorb(&mut self, dup: &Signal, reason: String) {
        if !self.sources.contains(&dup.source) {
            self.sources.push(dup.source.clone());
        }
        self.merged_ids.push(dup.id.clone());
        self.merge_reason = reason;
        if dup.published_at < self.first_published {
            self.first_published = dup.published_at;
        }
    }
}

/// Deduplicate a batch. Candidates are sorted by descending initial score
/// before processing; each one is compared against the accepted set only.
/// Returns the accepted signals (original relative order of equals kept by
/// the sort) plus one MergeRecord per kept signal that absorbed duplicates.
pub fn dedupe_batch<T>(
    mut candidates: Vec<DedupCandidate<T>>,
    cfg: &DedupConfig,
) -> (Vec<Accepted<T>>, Vec<MergeRecord>) {
    candidates.sort_by(|a, b| {
        b.initial_score
            .partial_cmp(&a.initial_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut accepted: Vec<Accepted<T>> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let mut absorbed_by: Option<(usize, String)> = None;
        for (idx, kept) in accepted.iter().enumerate() {
            let check = same_story(
                &candidate.signal,
                &candidate.fingerprint,
                &kept.signal,
                &kept.fingerprint,
                cfg,
            );
            if check.duplicate {
                absorbed_by = Some((idx, check.reason));
                break;
            }
        }
        match absorbed_by {
            Some((idx, reason)) => {
                debug!(
                    dropped = %candidate.signal.id,
                    kept = %accepted[idx].signal.id,
                    "duplicate story merged"
                );
                accepted[idx].absorb(&candidate.signal, reason);
            }
            None => accepted.push(Accepted::from_candidate(candidate)),
        }
    }

    let merges = accepted
        .iter()
        .filter(|a| !a.merged_ids.is_empty())
        .map(|a| MergeRecord {
            kept_id: a.signal.id.clone(),
            merged_ids: a.merged_ids.clone(),
            reason: a.merge_reason.clone(),
        })
        .collect();

    (accepted, merges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, title: &str, source: &str, score: f32) -> DedupCandidate<()> {
        let signal = Signal::new(id, title, source);
        let fingerprint = SemanticFingerprint::derive(title, "");
        DedupCandidate {
            signal,
            fingerprint,
            initial_score: score,
            payload: (),
        }
    }

    #[test]
    fn scenario_b_same_story_merges_with_source_count_two() {
        let cfg = DedupConfig::default();
        let a = candidate(
            "s1",
            "Company X breakout video hits 5M views on topic Y",
            "feed-a",
            70.0,
        );
        let b = candidate("s2", "Company X's video about Y goes viral", "feed-b", 40.0);

        let (accepted, merges) = dedupe_batch(vec![a, b], &cfg);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].signal.id, "s1", "higher score is kept");
        assert_eq!(accepted[0].source_count(), 2);
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].kept_id, "s1");
        assert_eq!(merges[0].merged_ids, vec!["s2".to_string()]);
    }

    #[test]
    fn distinct_stories_both_survive() {
        let cfg = DedupConfig::default();
        let a = candidate("s1", "Iran sanctions tighten after talks collapse", "reuters", 60.0);
        let b = candidate("s2", "OPEC announces surprise oil production cut", "ap", 55.0);
        let (accepted, merges) = dedupe_batch(vec![a, b], &cfg);
        assert_eq!(accepted.len(), 2);
        assert!(merges.is_empty());
    }

    #[test]
    fn decision_is_idempotent() {
        let cfg = DedupConfig::default();
        let a = candidate("s1", "Company X breakout video hits 5M views on topic Y", "a", 1.0);
        let b = candidate("s2", "Company X's video about Y goes viral", "b", 0.5);
        let first = same_story(&a.signal, &a.fingerprint, &b.signal, &b.fingerprint, &cfg);
        let second = same_story(&a.signal, &a.fingerprint, &b.signal, &b.fingerprint, &cfg);
        assert_eq!(first, second);

        // batch-level: rerunning the accepted set against the same candidate
        // produces the same accept/reject split
        let (accepted1, _) = dedupe_batch(vec![a.clone(), b.clone()], &cfg);
        let (accepted2, _) = dedupe_batch(vec![a, b], &cfg);
        assert_eq!(accepted1.len(), accepted2.len());
        assert_eq!(accepted1[0].signal.id, accepted2[0].signal.id);
    }

    #[test]
    fn outside_time_window_is_not_merged() {
        let cfg = DedupConfig::default();
        let a = candidate("s1", "Company X breakout video hits 5M views on topic Y", "a", 10.0);
        let mut b = candidate("s2", "Company X's video about Y goes viral", "b", 5.0);
        b.signal.published_at = a.signal.published_at - Duration::hours(cfg.window_hours + 24);

        let (accepted, _) = dedupe_batch(vec![a, b], &cfg);
        assert_eq!(accepted.len(), 2, "stale repeat is a new story, not a duplicate");
    }

    #[test]
    fn borderline_overlap_is_conservative() {
        let mut cfg = DedupConfig::default();
        cfg.duplicate_threshold = 0.99;
        let a = candidate("s1", "Trump warns China over tariffs", "a", 10.0);
        let b = candidate("s2", "Trump meets advisors on China strategy", "b", 5.0);
        let check = same_story(&a.signal, &a.fingerprint, &b.signal, &b.fingerprint, &cfg);
        assert!(!check.duplicate, "near-threshold pairs must not merge: {check:?}");
    }

    #[test]
    fn order_contract_keeps_highest_scored_signal() {
        let cfg = DedupConfig::default();
        // same story submitted low-score first; order contract still keeps
        // the high-score one because processing sorts by score first
        let low = candidate("low", "Company X's video about Y goes viral", "b", 5.0);
        let high = candidate(
            "high",
            "Company X breakout video hits 5M views on topic Y",
            "a",
            80.0,
        );
        let (accepted, _) = dedupe_batch(vec![low, high], &cfg);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].signal.id, "high");
    }
}
