//! Feedback-driven learning: per-channel multiplier state updated from user
//! actions, applied by ranking on later batches.
//!
//! Weights move in small multiplicative steps so no single click dominates,
//! and they are unbounded here; ranking clamps final scores to [1, 100], so
//! runaway weights cannot produce out-of-range output. Every channel record
//! is updated read-modify-write under a per-channel lock.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::evidence::EvidenceKind;
use crate::fingerprint::{normalize, SemanticFingerprint};
use crate::ranking::analyze_angle;

pub const REASON_ANGLE_TOO_BROAD: &str = "angle_too_broad";
pub const REASON_NEEDS_STRONG_EVIDENCE: &str = "needs_strong_evidence";

/// Rejection counters start penalizing once they cross these.
pub const ANGLE_PATTERN_THRESHOLD: u32 = 2;
pub const EVIDENCE_PATTERN_THRESHOLD: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackAction {
    Liked,
    Rejected,
    Saved,
    Produced,
    Ignored,
}

impl FeedbackAction {
    /// Actions that nudge weights upward.
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            FeedbackAction::Liked | FeedbackAction::Saved | FeedbackAction::Produced
        )
    }
}

/// Immutable user action on a previously ranked signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<String>,
    pub topic: String,
    pub action: FeedbackAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Evidence sources that had findings when the user acted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_kinds: Vec<EvidenceKind>,
    pub created_at: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn new(
        channel_id: impl Into<String>,
        topic: impl Into<String>,
        action: FeedbackAction,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            signal_id: None,
            topic: topic.into(),
            action,
            rejection_reason: None,
            evidence_kinds: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.rejection_reason = Some(reason.into());
        self
    }

    /// An event with neither a topic string nor a signal id teaches nothing.
    pub fn is_malformed(&self) -> bool {
        self.topic.trim().is_empty() && self.signal_id.is_none()
    }
}

/// Per-key weight with its like/reject tallies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopicWeight {
    pub liked: u32,
    pub rejected: u32,
    pub weight: f32,
}

impl Default for TopicWeight {
    fn default() -> Self {
        Self {
            liked: 0,
            rejected: 0,
            weight: 1.0,
        }
    }
}

/// Multipliers for how a topic is framed. Defaults mirror what ranking used
/// before any feedback: specific angles are worth more, bare broad entities
/// far less.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormatWeights {
    pub specific_angle: f32,
    pub broad_topic: f32,
    pub question_format: f32,
}

impl Default for FormatWeights {
    fn default() -> Self {
        Self {
            specific_angle: 1.5,
            broad_topic: 0.3,
            question_format: 1.0,
        }
    }
}

/// The one persisted record this core owns: per-channel learning state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LearningWeights {
    #[serde(default)]
    pub topic_weights: HashMap<String, TopicWeight>,
    #[serde(default)]
    pub format_weights: Option<FormatWeights>,
    #[serde(default)]
    pub evidence_weights: HashMap<EvidenceKind, f32>,
    #[serde(default)]
    pub rejection_patterns: HashMap<String, u32>,
    /// Normalized topic strings ever liked. Protected from hiding, forever.
    #[serde(default)]
    pub protected_topics: Vec<String>,
    #[serde(default)]
    pub total_feedback_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LearningWeights {
    pub fn has_sufficient_data(&self, min_feedback: u32) -> bool {
        self.total_feedback_count >= min_feedback
    }

    pub fn format_weights(&self) -> FormatWeights {
        self.format_weights.unwrap_or_default()
    }

    pub fn rejection_count(&self, reason: &str) -> u32 {
        self.rejection_patterns.get(reason).copied().unwrap_or(0)
    }

    pub fn is_protected(&self, topic: &str) -> bool {
        let norm = normalize(topic);
        if norm.is_empty() {
            return false;
        }
        self.protected_topics.iter().any(|p| {
            p == &norm
                || (p.len() >= 10 && norm.contains(p.as_str()))
                || (norm.len() >= 10 && p.contains(norm.as_str()))
        })
    }

    /// Fold one feedback event into the record.
    pub fn record(&mut self, event: &FeedbackEvent) -> Result<(), EngineError> {
        if event.is_malformed() {
            return Err(EngineError::MalformedFeedback(
                "missing both topic and signal id".into(),
            ));
        }

        self.total_feedback_count = self.total_feedback_count.saturating_add(1);
        self.updated_at = Some(event.created_at);

        let topic_norm = normalize(&event.topic);
        let positive = event.action.is_positive();

        // Exact topic string.
        if !topic_norm.is_empty() {
            let entry = self.topic_weights.entry(topic_norm.clone()).or_default();
            if positive {
                entry.liked += 1;
                entry.weight *= 1.1;
            } else if event.action == FeedbackAction::Rejected {
                entry.rejected += 1;
                entry.weight *= 0.95;
            }
        }

        // Entity keys extracted from the topic text. People learn slowest to
        // avoid over-fitting a face that shows up in every other story.
        let fp = SemanticFingerprint::derive(&event.topic, "");
        let keyed: [(&str, &Vec<String>, f32, f32); 3] = [
            ("topic", &fp.entities.topics, 1.1, 0.95),
            ("country", &fp.entities.countries, 1.08, 0.95),
            ("person", &fp.entities.people, 1.05, 0.97),
        ];
        for (prefix, names, up, down) in keyed {
            for name in names {
                let key = format!("{prefix}_{name}");
                let entry = self.topic_weights.entry(key).or_default();
                if positive {
                    entry.liked += 1;
                    entry.weight *= up;
                } else if event.action == FeedbackAction::Rejected {
                    entry.rejected += 1;
                    entry.weight *= down;
                }
            }
        }

        // Evidence-source weights from the context the user acted on.
        for kind in &event.evidence_kinds {
            let w = self.evidence_weights.entry(*kind).or_insert(1.0);
            if positive {
                *w *= 1.05;
            } else if event.action == FeedbackAction::Rejected {
                *w *= 0.98;
            }
        }

        // Format weights follow how the liked/rejected topic was framed.
        let angle = analyze_angle(&event.topic);
        let mut fmt = self.format_weights();
        if positive && angle.has_angle {
            fmt.specific_angle *= 1.05;
            if angle.is_question {
                fmt.question_format *= 1.05;
            }
        } else if event.action == FeedbackAction::Rejected && !angle.has_angle {
            fmt.broad_topic *= 0.95;
        }
        self.format_weights = Some(fmt);

        // Rejection-pattern counters.
        if event.action == FeedbackAction::Rejected {
            if let Some(reason) = &event.rejection_reason {
                let reason = reason.trim();
                if !reason.is_empty() {
                    *self
                        .rejection_patterns
                        .entry(reason.to_string())
                        .or_insert(0) += 1;
                }
            }
        }

        // Liked topics are protected forever.
        if event.action == FeedbackAction::Liked
            && !topic_norm.is_empty()
            && !self.protected_topics.contains(&topic_norm)
        {
            self.protected_topics.push(topic_norm);
        }

        debug!(
            channel = %event.channel_id,
            action = ?event.action,
            total = self.total_feedback_count,
            "learning weights updated"
        );
        Ok(())
    }

    /// Combined multiplier for a topic string: exact key plus entity keys,
    /// geometric-mean-averaged so several matched keys do not explode.
    pub fn topic_boost(&self, topic: &str) -> f32 {
        let norm = normalize(topic);
        let fp = SemanticFingerprint::derive(topic, "");

        let mut keys: Vec<String> = vec![norm];
        keys.extend(fp.entities.topics.iter().map(|t| format!("topic_{t}")));
        keys.extend(fp.entities.countries.iter().map(|c| format!("country_{c}")));
        keys.extend(fp.entities.people.iter().map(|p| format!("person_{p}")));

        let mut boost = 1.0f32;
        let mut matches = 0u32;
        for key in keys {
            if let Some(tw) = self.topic_weights.get(&key) {
                boost *= tw.weight;
                matches += 1;
            }
        }
        if matches > 1 {
            boost = boost.powf(1.0 / matches as f32);
        }
        boost
    }

    pub fn evidence_boost(&self, kinds_found: &[EvidenceKind]) -> f32 {
        let mut boost = 1.0f32;
        for kind in kinds_found {
            if let Some(w) = self.evidence_weights.get(kind) {
                boost *= w;
            }
        }
        boost
    }
}

/// Derived read-model for display: what has the channel taught us so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningStats {
    pub has_learning: bool,
    pub feedback_count: u32,
    pub top_topics: Vec<(String, f32)>,
    pub avoided_topics: Vec<(String, f32)>,
    pub prefers_specific_angles: bool,
    pub needs_strong_evidence: bool,
}

impl LearningStats {
    pub fn from_weights(weights: &LearningWeights, min_feedback: u32) -> Self {
        let mut sorted: Vec<(&String, &TopicWeight)> = weights.topic_weights.iter().collect();
        sorted.sort_by(|a, b| {
            b.1.weight
                .partial_cmp(&a.1.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let top_topics = sorted
            .iter()
            .filter(|(_, tw)| tw.weight > 1.0)
            .take(5)
            .map(|(k, tw)| ((*k).clone(), tw.weight))
            .collect();
        let avoided_topics = sorted
            .iter()
            .rev()
            .filter(|(_, tw)| tw.weight < 1.0)
            .take(5)
            .map(|(k, tw)| ((*k).clone(), tw.weight))
            .collect();

        Self {
            has_learning: weights.has_sufficient_data(min_feedback),
            feedback_count: weights.total_feedback_count,
            top_topics,
            avoided_topics,
            prefers_specific_angles: weights.format_weights().specific_angle > 1.2,
            needs_strong_evidence: weights.rejection_count(REASON_NEEDS_STRONG_EVIDENCE)
                >= EVIDENCE_PATTERN_THRESHOLD,
        }
    }
}

// ---- persistence ----

/// Per-channel weight persistence. Implementations must not lose updates;
/// callers serialize writes per channel through [`FeedbackRecorder`].
pub trait WeightStore: Send + Sync {
    fn load(&self, channel_id: &str) -> Result<Option<LearningWeights>, EngineError>;
    fn save(&self, channel_id: &str, weights: &LearningWeights) -> Result<(), EngineError>;
}

#[derive(Default)]
pub struct InMemoryWeightStore {
    records: Mutex<HashMap<String, LearningWeights>>,
}

impl WeightStore for InMemoryWeightStore {
    fn load(&self, channel_id: &str) -> Result<Option<LearningWeights>, EngineError> {
        Ok(self
            .records
            .lock()
            .map_err(|_| EngineError::Store("weight store poisoned".into()))?
            .get(channel_id)
            .cloned())
    }

    fn save(&self, channel_id: &str, weights: &LearningWeights) -> Result<(), EngineError> {
        self.records
            .lock()
            .map_err(|_| EngineError::Store("weight store poisoned".into()))?
            .insert(channel_id.to_string(), weights.clone());
        Ok(())
    }
}

/// One JSON file per channel, written atomically (tmp + rename).
pub struct JsonWeightStore {
    dir: PathBuf,
}

impl JsonWeightStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let _ = fs::create_dir_all(&dir);
        Self { dir }
    }

    fn path_for(&self, channel_id: &str) -> PathBuf {
        // channel ids come from outside; keep the filename boring
        let safe: String = channel_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl WeightStore for JsonWeightStore {
    fn load(&self, channel_id: &str) -> Result<Option<LearningWeights>, EngineError> {
        let path = self.path_for(channel_id);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::Io(e)),
        };
        match serde_json::from_str(&content) {
            Ok(w) => Ok(Some(w)),
            Err(e) => {
                // malformed record degrades to "no learning", never fatal
                warn!(path = %path.display(), error = %e, "unreadable weight record, ignoring");
                Ok(None)
            }
        }
    }

    fn save(&self, channel_id: &str, weights: &LearningWeights) -> Result<(), EngineError> {
        let path = self.path_for(channel_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(weights)
            .map_err(|e| EngineError::Store(format!("serialize weights: {e}")))?;
        let mut f = fs::File::create(&tmp)?;
        f.write_all(json.as_bytes())?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

/// Serializes feedback per channel: read current → fold event → write, under
/// a per-channel async lock so concurrent events cannot lose updates.
pub struct FeedbackRecorder<S: WeightStore> {
    store: S,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: WeightStore> FeedbackRecorder<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn lock_for(&self, channel_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut guard = self.locks.lock().expect("recorder locks");
        guard
            .entry(channel_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Apply one event. Malformed events are dropped with a warning and
    /// reported to the caller; the stored record is untouched.
    pub async fn record(&self, event: &FeedbackEvent) -> Result<LearningWeights, EngineError> {
        if event.is_malformed() {
            warn!(channel = %event.channel_id, "dropping malformed feedback event");
            return Err(EngineError::MalformedFeedback(
                "missing both topic and signal id".into(),
            ));
        }
        let lock = self.lock_for(&event.channel_id);
        let _guard = lock.lock().await;

        let mut weights = self.store.load(&event.channel_id)?.unwrap_or_default();
        weights.record(event)?;
        self.store.save(&event.channel_id, &weights)?;
        Ok(weights)
    }
}
