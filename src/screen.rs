//! Story-potential screening, applied before matching.
//!
//! Headlines that are only a number ("GDP grows 2.1%"), bare announcements
//! ("X signs agreement with Y"), or several stories mashed into one title
//! carry no episode potential and are rejected up front. Headlines with
//! narrative framing ("the real reason...", "what would happen if...") get a
//! boost, and an engagement vocabulary nudges the content-quality side of
//! the score either way.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static JUST_NUMBERS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)grows?\s+\d+(\.\d+)?%",
        r"(?i)falls?\s+\d+(\.\d+)?%",
        r"(?i)rises?\s+to\s+\d+",
        r"(?i)drops?\s+to\s+\d+",
        r"(?i)Q[1-4]\s+(20\d{2}|results|earnings)",
        r"(?i)deficit.*\d+\s*(billion|million)",
        r"(?i)surplus.*\d+\s*(billion|million)",
        r"(?i)inflation\s+(in|rises|falls)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("just-numbers pattern"))
    .collect()
});

static NO_STORY: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)signs?\s+(agreement|deal|pact)",
        r"(?i)meets?\s+with",
        r"(?i)visits?\s+",
        r"(?i)announces?\s+(plans?|partnership)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("no-story pattern"))
    .collect()
});

static BIG_STORY: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)what\s+(would|might|could)",
        r"(?i)imagine if",
        r"(?i)the (real|hidden|secret|true) (story|reason)",
        r"(?i)unexpected|surprising|shocking",
        r"(?i)overturned|revolutionized|transformed",
        r"(?i)first time (ever|in history)",
        r"(?i)showdown",
        r"(?i)why .+\?",
        r"(?i)how .+\?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("big-story pattern"))
    .collect()
});

const HIGH_ENGAGEMENT: &[&str] = &[
    "what if", "imagine", "secret", "revealed", "first time", "never before", "how to",
    "truth about", "myth", "mistake", "millionaire", "billionaire", "from zero",
    "success story", "warning", "danger", "opportunity", "future", "collapse", "crash",
    "revolution", "breakthrough", "vs", "versus",
];

const MEDIUM_ENGAGEMENT: &[&str] = &[
    "price", "cost", "salary", "income", "savings", "investment", "job", "career",
    "your money", "inflation", "recession", "gold", "dollar", "oil",
];

const LOW_ENGAGEMENT: &[&str] = &[
    "quarterly", "annual", "report", "statistics", "meeting", "conference", "agreement",
];

const HIGH_BONUS: f32 = 25.0;
const MEDIUM_BONUS: f32 = 15.0;
const LOW_PENALTY: f32 = -20.0;
const BIG_STORY_BONUS: f32 = 40.0;

/// Screening verdict for one title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoryPotential {
    /// Dropped before matching.
    Reject { reason: String },
    Neutral,
    /// Narrative framing found; bonus feeds the base score.
    BigStory { bonus: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenResult {
    pub potential: StoryPotential,
    /// Engagement vocabulary adjustment, may be negative.
    pub engagement: f32,
}

impl ScreenResult {
    pub fn rejected(&self) -> bool {
        matches!(self.potential, StoryPotential::Reject { .. })
    }

    /// Total score adjustment for surviving signals.
    pub fn bonus(&self) -> f32 {
        let story = match self.potential {
            StoryPotential::BigStory { bonus } => bonus,
            _ => 0.0,
        };
        story + self.engagement
    }
}

/// Aggregated titles combine several stories; nothing downstream can score
/// them honestly.
fn is_aggregated(title: &str) -> bool {
    let separators = title.matches("..").count();
    separators >= 2 || title.chars().count() > 120
}

fn engagement_score(text_lower: &str) -> f32 {
    let mut score = 0.0;
    if HIGH_ENGAGEMENT.iter().any(|k| text_lower.contains(k)) {
        score += HIGH_BONUS;
    }
    if MEDIUM_ENGAGEMENT.iter().any(|k| text_lower.contains(k)) {
        score += MEDIUM_BONUS;
    }
    if LOW_ENGAGEMENT.iter().any(|k| text_lower.contains(k)) {
        score += LOW_PENALTY;
    }
    score
}

/// Screen a signal's title (and description, for engagement vocabulary).
pub fn screen(title: &str, description: &str) -> ScreenResult {
    if title.trim().is_empty() {
        return ScreenResult {
            potential: StoryPotential::Reject {
                reason: "empty title".into(),
            },
            engagement: 0.0,
        };
    }
    if is_aggregated(title) {
        return ScreenResult {
            potential: StoryPotential::Reject {
                reason: "aggregated title".into(),
            },
            engagement: 0.0,
        };
    }
    if JUST_NUMBERS.iter().any(|re| re.is_match(title)) {
        return ScreenResult {
            potential: StoryPotential::Reject {
                reason: "just numbers, no story".into(),
            },
            engagement: 0.0,
        };
    }
    if NO_STORY.iter().any(|re| re.is_match(title)) {
        return ScreenResult {
            potential: StoryPotential::Reject {
                reason: "announcement without a story".into(),
            },
            engagement: 0.0,
        };
    }

    let text_lower = format!("{} {}", title, description).to_lowercase();
    let engagement = engagement_score(&text_lower);
    let potential = if BIG_STORY.iter().any(|re| re.is_match(title)) {
        StoryPotential::BigStory {
            bonus: BIG_STORY_BONUS,
        }
    } else {
        StoryPotential::Neutral
    };

    ScreenResult {
        potential,
        engagement,
    }
}
