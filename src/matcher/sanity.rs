//! Fast sanity filter over keyword matches.
//!
//! A keyword match that crosses known-incompatible domains is vetoed before
//! anyone trusts it, independent of its score. The table stays deliberately
//! small: it only catches the obvious cases, arbitration handles the rest.

/// One incompatible-domain rule: signal vocabulary vs topic-id fragments.
struct DomainRule {
    signal_keywords: &'static [&'static str],
    wrong_topic_fragments: &'static [&'static str],
    reason: &'static str,
}

const RULES: &[DomainRule] = &[
    DomainRule {
        signal_keywords: &[
            "movie", "film", "actor", "actress", "netflix", "hollywood", "celebrity",
            "trailer", "box office",
        ],
        wrong_topic_fragments: &[
            "geopolitics", "us_china", "russia_ukraine", "middle_east", "iran", "sanctions",
            "war",
        ],
        reason: "entertainment signal matched to geopolitics",
    },
    DomainRule {
        signal_keywords: &[
            "football", "soccer", "nba", "nfl", "world cup", "basketball", "tennis",
            "championship",
        ],
        wrong_topic_fragments: &[
            "geopolitics", "us_china", "russia_ukraine", "middle_east", "iran", "sanctions",
            "war",
        ],
        reason: "sports signal matched to geopolitics",
    },
];

/// Returns the veto reason when the match crosses incompatible domains.
/// `normalized_text` is the lowercased signal text, `topic_id` the matched
/// taxonomy id.
pub fn veto_reason(normalized_text: &str, topic_id: &str) -> Option<&'static str> {
    let topic_lower = topic_id.to_lowercase();
    for rule in RULES {
        let signal_hit = rule
            .signal_keywords
            .iter()
            .any(|kw| normalized_text.contains(kw));
        if !signal_hit {
            continue;
        }
        let topic_hit = rule
            .wrong_topic_fragments
            .iter()
            .any(|frag| topic_lower.contains(frag));
        if topic_hit {
            return Some(rule.reason);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::normalize;

    #[test]
    fn entertainment_vs_geopolitics_is_vetoed() {
        let text = normalize("Famous actor stars in new movie about sanctions");
        assert!(veto_reason(&text, "iran_sanctions").is_some());
    }

    #[test]
    fn sports_vs_geopolitics_is_vetoed() {
        let text = normalize("World Cup final draws record audience");
        assert!(veto_reason(&text, "middle_east_tensions").is_some());
    }

    #[test]
    fn matching_domains_pass() {
        let text = normalize("Iran sanctions tighten as talks stall");
        assert!(veto_reason(&text, "iran_sanctions").is_none());

        let text = normalize("New movie breaks box office records");
        assert!(veto_reason(&text, "entertainment_industry").is_none());
    }
}
