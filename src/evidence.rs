//! Evidence aggregation: five independent demand indicators folded into one
//! composite score and a qualitative strength label.
//!
//! Each source answers on its own scale (search demand up to 30, audience
//! videos 25, competitors 20, comments 15, persona 10) with a found flag.
//! The strength label gates on BOTH the number of sources that found
//! something and the composite score, so one dominant source cannot promote
//! a weak signal by itself.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One evidence source kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    SearchDemand,
    AudienceVideos,
    CompetitorVideos,
    CommentDemand,
    PersonaAffinity,
}

impl EvidenceKind {
    pub const ALL: [EvidenceKind; 5] = [
        EvidenceKind::SearchDemand,
        EvidenceKind::AudienceVideos,
        EvidenceKind::CompetitorVideos,
        EvidenceKind::CommentDemand,
        EvidenceKind::PersonaAffinity,
    ];
}

/// Uniform surface over heterogeneous per-source results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceFinding {
    pub kind: EvidenceKind,
    pub found: bool,
    pub score: f32,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detail: Vec<String>,
}

impl EvidenceFinding {
    fn empty(kind: EvidenceKind) -> Self {
        Self {
            kind,
            found: false,
            score: 0.0,
            summary: String::new(),
            detail: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStrength {
    None,
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationLevel {
    Skip,
    Consider,
    Recommended,
    HighlyRecommended,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceReport {
    pub findings: Vec<EvidenceFinding>,
    /// Sum of per-source scores, capped at 100.
    pub composite: f32,
    pub sources_found: usize,
    pub strength: EvidenceStrength,
    pub recommendation: RecommendationLevel,
}

impl EvidenceReport {
    pub fn finding(&self, kind: EvidenceKind) -> Option<&EvidenceFinding> {
        self.findings.iter().find(|f| f.kind == kind)
    }

    pub fn found(&self, kind: EvidenceKind) -> bool {
        self.finding(kind).map(|f| f.found).unwrap_or(false)
    }

    pub fn score_of(&self, kind: EvidenceKind) -> f32 {
        self.finding(kind).map(|f| f.score).unwrap_or(0.0)
    }

    /// No search demand and no competitor proof.
    pub fn is_weakly_evidenced(&self) -> bool {
        !self.found(EvidenceKind::SearchDemand) && !self.found(EvidenceKind::CompetitorVideos)
    }

    pub fn empty() -> Self {
        let findings = EvidenceKind::ALL.map(EvidenceFinding::empty).to_vec();
        Self {
            findings,
            composite: 0.0,
            sources_found: 0,
            strength: EvidenceStrength::None,
            recommendation: RecommendationLevel::Skip,
        }
    }
}

// ---- collaborator-supplied raw indexes ----

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchTerm {
    pub term: String,
    pub views: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    pub title: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub views: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudienceComment {
    pub text: String,
    /// Pre-filtered by the comment pipeline: an actionable request.
    #[serde(default)]
    pub actionable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub trigger_keywords: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// Optional raw evidence-source readers. Anything absent simply reports
/// not-found; a ranking request always returns a result set.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSources {
    pub search_terms: Vec<SearchTerm>,
    pub audience_videos: Vec<VideoRef>,
    pub competitor_videos: Vec<VideoRef>,
    pub comments: Vec<AudienceComment>,
    pub personas: Vec<Persona>,
}

const SEARCH_CAP: f32 = 30.0;
const AUDIENCE_CAP: f32 = 25.0;
const COMPETITOR_CAP: f32 = 20.0;
const COMMENT_CAP: f32 = 15.0;
const PERSONA_CAP: f32 = 10.0;

/// Aggregate all evidence for one signal. `tokens` are the signal's content
/// words (length > 2), `now` anchors the recent-coverage bonus.
pub fn aggregate(tokens: &[String], sources: &EvidenceSources, now: DateTime<Utc>) -> EvidenceReport {
    let findings = vec![
        search_evidence(tokens, &sources.search_terms),
        audience_evidence(tokens, &sources.audience_videos),
        competitor_evidence(tokens, &sources.competitor_videos, now),
        comment_evidence(tokens, &sources.comments),
        persona_evidence(tokens, &sources.personas),
    ];

    let composite: f32 = findings.iter().map(|f| f.score).sum::<f32>().min(100.0);
    let sources_found = findings.iter().filter(|f| f.found).count();

    let (strength, recommendation) = if sources_found >= 3 || composite >= 60.0 {
        (EvidenceStrength::Strong, RecommendationLevel::HighlyRecommended)
    } else if sources_found == 2 || composite >= 40.0 {
        (EvidenceStrength::Moderate, RecommendationLevel::Recommended)
    } else if sources_found == 1 || composite >= 20.0 {
        (EvidenceStrength::Weak, RecommendationLevel::Consider)
    } else {
        (EvidenceStrength::None, RecommendationLevel::Skip)
    };

    EvidenceReport {
        findings,
        composite,
        sources_found,
        strength,
        recommendation,
    }
}

fn text_matches(text: &str, tokens: &[String]) -> bool {
    let lower = text.to_lowercase();
    tokens.iter().any(|t| lower.contains(t.as_str()))
}

fn search_evidence(tokens: &[String], terms: &[SearchTerm]) -> EvidenceFinding {
    let mut matched: Vec<&SearchTerm> = terms
        .iter()
        .filter(|t| text_matches(&t.term, tokens))
        .collect();
    if matched.is_empty() {
        return EvidenceFinding::empty(EvidenceKind::SearchDemand);
    }
    matched.sort_by_key(|t| std::cmp::Reverse(t.views));
    let total_views: u64 = matched.iter().map(|t| t.views).sum();
    let score = (total_views as f32 / 50.0).min(SEARCH_CAP);
    EvidenceFinding {
        kind: EvidenceKind::SearchDemand,
        found: true,
        score,
        summary: format!("{total_views} searches across {} terms", matched.len()),
        detail: matched
            .iter()
            .take(5)
            .map(|t| format!("\"{}\" = {}", t.term, t.views))
            .collect(),
    }
}

fn audience_evidence(tokens: &[String], videos: &[VideoRef]) -> EvidenceFinding {
    let matched: Vec<&VideoRef> = videos
        .iter()
        .filter(|v| text_matches(&v.title, tokens))
        .collect();
    if matched.is_empty() {
        return EvidenceFinding::empty(EvidenceKind::AudienceVideos);
    }
    let score = (matched.len() as f32 * 2.5).min(AUDIENCE_CAP);
    EvidenceFinding {
        kind: EvidenceKind::AudienceVideos,
        found: true,
        score,
        summary: format!("audience watches {} similar videos", matched.len()),
        detail: matched.iter().take(3).map(|v| v.title.clone()).collect(),
    }
}

fn competitor_evidence(
    tokens: &[String],
    videos: &[VideoRef],
    now: DateTime<Utc>,
) -> EvidenceFinding {
    let mut matched: Vec<&VideoRef> = videos
        .iter()
        .filter(|v| text_matches(&v.title, tokens))
        .collect();
    if matched.is_empty() {
        return EvidenceFinding::empty(EvidenceKind::CompetitorVideos);
    }
    matched.sort_by_key(|v| std::cmp::Reverse(v.views));

    let recent = matched.iter().any(|v| {
        v.published_at
            .map(|ts| now - ts <= Duration::days(7))
            .unwrap_or(false)
    });

    // Per-video points grow with view count; a breakout video counts double.
    let mut score: f32 = matched
        .iter()
        .map(|v| 2.0 * (1.0 + (v.views as f32 / 1_000_000.0).min(1.0)))
        .sum();
    if recent {
        score += 5.0;
    }
    let score = score.min(COMPETITOR_CAP);

    let mut summary = format!("{} competitor videos on this topic", matched.len());
    if recent {
        summary.push_str(" (recent coverage)");
    }
    EvidenceFinding {
        kind: EvidenceKind::CompetitorVideos,
        found: true,
        score,
        summary,
        detail: matched
            .iter()
            .take(3)
            .map(|v| format!("{} ({} views)", v.title, v.views))
            .collect(),
    }
}

fn comment_evidence(tokens: &[String], comments: &[AudienceComment]) -> EvidenceFinding {
    let matched: Vec<&AudienceComment> = comments
        .iter()
        .filter(|c| c.actionable && text_matches(&c.text, tokens))
        .collect();
    if matched.is_empty() {
        return EvidenceFinding::empty(EvidenceKind::CommentDemand);
    }
    let score = (matched.len() as f32 * 5.0).min(COMMENT_CAP);
    EvidenceFinding {
        kind: EvidenceKind::CommentDemand,
        found: true,
        score,
        summary: format!("{} audience requests", matched.len()),
        detail: matched.iter().take(2).map(|c| c.text.clone()).collect(),
    }
}

fn persona_evidence(tokens: &[String], personas: &[Persona]) -> EvidenceFinding {
    let mut best: Option<(&Persona, f32)> = None;
    for persona in personas {
        let mut score = 0.0f32;
        for token in tokens {
            if persona
                .trigger_keywords
                .iter()
                .any(|k| k.to_lowercase().contains(token.as_str()))
            {
                score += 3.0;
            }
            if persona
                .interests
                .iter()
                .any(|i| i.to_lowercase().contains(token.as_str()))
            {
                score += 2.0;
            }
        }
        if score > 0.0 && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((persona, score));
        }
    }
    match best {
        Some((persona, score)) => EvidenceFinding {
            kind: EvidenceKind::PersonaAffinity,
            found: true,
            score: score.min(PERSONA_CAP),
            summary: format!("matches persona {}", persona.name),
            detail: vec![persona.id.clone()],
        },
        None => EvidenceFinding::empty(EvidenceKind::PersonaAffinity),
    }
}
