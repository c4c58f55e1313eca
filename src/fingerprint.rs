//! Semantic fingerprints: the derived representation used for duplicate
//! detection and entity-aware matching.
//!
//! A fingerprint is cheap and idempotent to recompute, so it is never
//! persisted. It carries normalized text, extracted entities (people,
//! countries, organizations, topical keywords), and an optional dense
//! embedding. When both sides of a comparison have embeddings we use cosine
//! similarity; otherwise we fall back to normalized title similarity.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Curated people seeds. Lowercase, matched on word boundaries.
const PEOPLE: &[&str] = &[
    "trump", "biden", "putin", "xi", "musk", "maduro", "powell", "netanyahu", "zelensky",
    "macron", "khamenei", "erdogan", "modi", "zuckerberg", "altman",
];

/// Curated country / place seeds.
const PLACES: &[&str] = &[
    "china", "russia", "iran", "venezuela", "ukraine", "saudi", "uae", "egypt", "israel",
    "taiwan", "turkey", "india", "japan", "germany", "france", "europe", "greenland", "qatar",
    "syria", "yemen", "lebanon", "gaza", "mexico", "canada",
];

/// Curated organization seeds.
const ORGS: &[&str] = &[
    "fed", "opec", "nato", "imf", "ecb", "brics", "tesla", "nvidia", "openai", "apple",
    "google", "meta", "microsoft", "amazon", "boeing", "aramco", "hamas", "hezbollah",
];

/// Topical concept seeds: pattern fragment -> canonical topic entity.
const TOPIC_SEEDS: &[(&str, &str)] = &[
    ("credit card", "credit_cards"),
    ("tariff", "trade"),
    ("trade war", "trade"),
    ("oil", "energy"),
    ("gas", "energy"),
    ("lng", "energy"),
    ("bitcoin", "crypto"),
    ("crypto", "crypto"),
    ("artificial intelligence", "ai"),
    ("inflation", "inflation"),
    ("interest rate", "interest_rates"),
    ("rate hike", "interest_rates"),
    ("sanctions", "sanctions"),
    ("protest", "protest"),
    ("nuclear", "nuclear"),
    ("missile", "military"),
    ("drone", "military"),
    ("gold", "gold"),
    ("dollar", "currency"),
    ("semiconductor", "chips"),
    ("chip", "chips"),
];

/// Words too common in any headline to carry identity.
static GENERIC_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "president", "government", "country", "world", "global", "international", "today",
        "now", "new", "breaking", "latest", "update", "news", "report", "says", "announces",
        "reports", "according", "official", "statement", "american", "video", "watch", "amid",
        "after", "over", "into", "with", "from", "this", "that", "will", "could", "would",
        "about", "goes", "viral", "hits", "million", "billion", "percent", "a", "i", "the",
    ]
    .into_iter()
    .collect()
});

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("word regex"));
static CAPITALIZED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-zA-Z0-9]*\b").expect("proper-noun regex"));

/// Extracted entities, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySet {
    pub people: Vec<String>,
    pub countries: Vec<String>,
    pub organizations: Vec<String>,
    pub topics: Vec<String>,
    /// Proper nouns not covered by the curated seeds ("Company X").
    pub proper_nouns: Vec<String>,
}

impl EntitySet {
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
            && self.countries.is_empty()
            && self.organizations.is_empty()
            && self.topics.is_empty()
            && self.proper_nouns.is_empty()
    }

    /// All entities flattened, for keyword-style containment checks.
    pub fn flat_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for list in [
            &self.people,
            &self.countries,
            &self.organizations,
            &self.topics,
            &self.proper_nouns,
        ] {
            parts.extend(list.iter().map(String::as_str));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticFingerprint {
    /// Stable short id derived from the normalized text.
    pub key: String,
    pub normalized: String,
    pub entities: EntitySet,
    /// Content words of the normalized text (length > 2).
    pub tokens: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl SemanticFingerprint {
    /// Build a fingerprint from title + description. Deterministic.
    pub fn derive(title: &str, description: &str) -> Self {
        let raw = if description.is_empty() {
            title.to_string()
        } else {
            format!("{title} {description}")
        };
        let normalized = normalize(&raw);
        let tokens: Vec<String> = WORD_RE
            .find_iter(&normalized)
            .map(|m| m.as_str().to_string())
            .filter(|w| w.len() > 2)
            .collect();
        let entities = extract_entities(title, &normalized);
        Self {
            key: short_hash(&normalized),
            normalized,
            entities,
            tokens,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Weighted entity-overlap ratio in [0, 1]. Countries and topics carry
    /// more identity than people; a shared person alone says little.
    pub fn entity_overlap(&self, other: &Self) -> f32 {
        let pairs = [
            (&self.entities.people, &other.entities.people, 1.0f32),
            (&self.entities.countries, &other.entities.countries, 2.5),
            (&self.entities.organizations, &other.entities.organizations, 1.5),
            (&self.entities.topics, &other.entities.topics, 2.5),
            (&self.entities.proper_nouns, &other.entities.proper_nouns, 2.0),
        ];

        let mut total = 0.0f32;
        let mut matched = 0.0f32;
        for (a, b, w) in pairs {
            let denom = a.len().max(b.len());
            if denom == 0 {
                continue;
            }
            let b_set: HashSet<&str> = b.iter().map(String::as_str).collect();
            let hits = a.iter().filter(|x| b_set.contains(x.as_str())).count();
            total += w;
            matched += w * hits as f32 / denom as f32;
        }
        if total == 0.0 {
            0.0
        } else {
            matched / total
        }
    }

    /// Shared proper nouns / people / orgs / countries: the "same actors"
    /// half of the secondary same-story heuristic.
    pub fn shares_proper_noun(&self, other: &Self) -> bool {
        for (a, b) in [
            (&self.entities.people, &other.entities.people),
            (&self.entities.countries, &other.entities.countries),
            (&self.entities.organizations, &other.entities.organizations),
            (&self.entities.proper_nouns, &other.entities.proper_nouns),
        ] {
            let b_set: HashSet<&str> = b.iter().map(String::as_str).collect();
            if a.iter().any(|x| b_set.contains(x.as_str())) {
                return true;
            }
        }
        false
    }

    /// Similarity score in [0, 1]: embedding cosine when both sides have
    /// one, normalized text similarity otherwise.
    pub fn similarity(&self, other: &Self) -> f32 {
        if let (Some(a), Some(b)) = (&self.embedding, &other.embedding) {
            return cosine_similarity(a, b);
        }
        strsim::normalized_levenshtein(&self.normalized, &other.normalized) as f32
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut prev_space = false;
    for ch in lower.chars() {
        let c = if ch.is_alphanumeric() { ch } else { ' ' };
        if c == ' ' {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out.trim_end().to_string()
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack
        .split(' ')
        .any(|w| w == needle)
        || (needle.contains(' ') && haystack.contains(needle))
}

fn extract_entities(title: &str, normalized: &str) -> EntitySet {
    let mut set = EntitySet::default();

    for p in PEOPLE {
        if contains_word(normalized, p) {
            set.people.push((*p).to_string());
        }
    }
    for c in PLACES {
        if contains_word(normalized, c) {
            set.countries.push((*c).to_string());
        }
    }
    for o in ORGS {
        if contains_word(normalized, o) {
            set.organizations.push((*o).to_string());
        }
    }
    for (pat, canon) in TOPIC_SEEDS {
        if normalized.contains(pat) && !set.topics.iter().any(|t| t == canon) {
            set.topics.push((*canon).to_string());
        }
    }

    // Proper nouns from the original-cased title: capitalized tokens not
    // already claimed by a seed list and not generic.
    let seeded: HashSet<String> = set
        .people
        .iter()
        .chain(&set.countries)
        .chain(&set.organizations)
        .cloned()
        .collect();
    for m in CAPITALIZED_RE.find_iter(title) {
        let lower = m.as_str().to_lowercase();
        if GENERIC_WORDS.contains(lower.as_str()) || seeded.contains(&lower) {
            continue;
        }
        if !set.proper_nouns.contains(&lower) {
            set.proper_nouns.push(lower);
        }
    }

    set
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Short stable hex id for logging and cache keys; never the raw text.
pub fn short_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Word-overlap ratio between two already-normalized strings, used for fuzzy
/// hidden-topic matching. Ratio of shared content words over the larger set.
pub fn word_overlap(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }
    let wa: HashSet<&str> = a.split(' ').filter(|w| w.len() > 2).collect();
    let wb: HashSet<&str> = b.split(' ').filter(|w| w.len() > 2).collect();
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let shared = wa.intersection(&wb).count();
    shared as f32 / wa.len().max(wb.len()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(
            normalize("Central Bank raises interest rates by 0.5%!"),
            "central bank raises interest rates by 0 5"
        );
    }

    #[test]
    fn extracts_seeded_and_proper_noun_entities() {
        let fp = SemanticFingerprint::derive("Trump warns China over oil tariffs", "");
        assert_eq!(fp.entities.people, vec!["trump"]);
        assert_eq!(fp.entities.countries, vec!["china"]);
        assert!(fp.entities.topics.contains(&"energy".to_string()));
        assert!(fp.entities.topics.contains(&"trade".to_string()));
    }

    #[test]
    fn proper_noun_heuristic_catches_unseeded_names() {
        let fp = SemanticFingerprint::derive("Company X breakout video hits 5M views on topic Y", "");
        assert!(fp.entities.proper_nouns.contains(&"company".to_string()));
        assert!(fp.entities.proper_nouns.contains(&"x".to_string()));
    }

    #[test]
    fn same_story_fingerprints_overlap_strongly() {
        let a = SemanticFingerprint::derive("Company X breakout video hits 5M views on topic Y", "");
        let b = SemanticFingerprint::derive("Company X's video about Y goes viral", "");
        assert!(a.entity_overlap(&b) >= 0.85, "overlap = {}", a.entity_overlap(&b));
        assert!(a.shares_proper_noun(&b));
    }

    #[test]
    fn unrelated_stories_do_not_overlap() {
        let a = SemanticFingerprint::derive("Oil prices surge after OPEC meeting", "");
        let b = SemanticFingerprint::derive("New Netflix series breaks streaming records", "");
        assert!(a.entity_overlap(&b) < 0.2);
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn word_overlap_ratio() {
        let a = normalize("US China trade war escalates");
        let b = normalize("China trade war escalates");
        assert!(word_overlap(&a, &b) > 0.8);
        assert!(word_overlap(&a, &normalize("celebrity wedding photos")) < 0.1);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = SemanticFingerprint::derive("Iran sanctions tighten", "oil exports fall");
        let b = SemanticFingerprint::derive("Iran sanctions tighten", "oil exports fall");
        assert_eq!(a, b);
    }
}
