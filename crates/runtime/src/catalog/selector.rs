//! Role-biased API selection
//!
//! Scores every catalog entry against the objective's keywords and the
//! session role's preferred categories, returning the top candidates.
//! The scoring weights and the role→category table are frozen so the
//! ranking stays reproducible.

use super::{catalog, ApiEndpoint, AuthType};
use crate::types::Role;
use std::collections::BTreeSet;

/// Objective keywords shorter than this carry no signal.
const MIN_KEYWORD_LEN: usize = 3;
/// Per-keyword match bonus and its cap.
const KEYWORD_BONUS: f64 = 0.1;
const KEYWORD_BONUS_CAP: f64 = 0.6;
const ROLE_CATEGORY_BONUS: f64 = 0.3;
const RELIABILITY_WEIGHT: f64 = 0.1;
const NO_AUTH_BONUS: f64 = 0.05;
const HTTPS_BONUS: f64 = 0.025;
const CORS_BONUS: f64 = 0.025;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "are", "was", "will", "has", "have",
    "can", "its", "into", "over", "them", "then", "than", "what", "when", "where", "which",
    "about", "all", "any", "out", "not", "you", "your", "use", "using", "how",
];

/// A catalog entry with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredApi {
    pub api: ApiEndpoint,
    pub score: f64,
    pub matched_keywords: Vec<String>,
    pub role_match: bool,
}

/// The frozen role→preferred-category table.
pub fn preferred_categories(role: Role) -> &'static [&'static str] {
    match role {
        Role::Researcher => &["books", "science", "news", "reference"],
        Role::Coder => &["development", "tools"],
        Role::Analyzer => &["data", "finance", "analytics"],
        Role::UiArchitect | Role::UiImplementer | Role::UiRefiner => &["art", "design", "color"],
        Role::Planner => &["productivity", "calendar"],
        Role::Critic => &["testing", "security"],
        Role::Synthesizer => &["integration", "data"],
    }
}

/// Lowercased alphanumeric runs of at least three characters, minus the
/// stop list, de-duplicated in first-seen order.
pub fn tokenize_objective(objective: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut tokens = Vec::new();
    for raw in objective.split(|c: char| !c.is_alphanumeric()) {
        let token = raw.to_ascii_lowercase();
        if token.len() < MIN_KEYWORD_LEN || STOP_WORDS.contains(&token.as_str()) {
            continue;
        }
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }
    tokens
}

/// Rank the catalog for an objective and role, returning the top `k`.
pub fn select_relevant_apis(objective: &str, role: Role, k: usize) -> Vec<ScoredApi> {
    let keywords = tokenize_objective(objective);
    let role_categories = preferred_categories(role);

    let mut scored: Vec<ScoredApi> = catalog()
        .iter()
        .map(|api| score_api(api, &keywords, role_categories))
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.api
                    .reliability_score
                    .partial_cmp(&a.api.reliability_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    scored.truncate(k);
    scored
}

fn score_api(api: &ApiEndpoint, keywords: &[String], role_categories: &[&str]) -> ScoredApi {
    let mut matched = Vec::new();
    for kw in keywords {
        let hit = api.keywords.iter().any(|k| k.eq_ignore_ascii_case(kw))
            || api.name.to_ascii_lowercase().contains(kw.as_str())
            || api.category.eq_ignore_ascii_case(kw);
        if hit {
            matched.push(kw.clone());
        }
    }

    let keyword_score = (matched.len() as f64 * KEYWORD_BONUS).min(KEYWORD_BONUS_CAP);
    let role_match = role_categories
        .iter()
        .any(|c| api.category.eq_ignore_ascii_case(c));

    let mut score = keyword_score;
    if role_match {
        score += ROLE_CATEGORY_BONUS;
    }
    score += RELIABILITY_WEIGHT * api.reliability_score;
    if api.auth_type == AuthType::None {
        score += NO_AUTH_BONUS;
    }
    if api.https {
        score += HTTPS_BONUS;
    }
    if api.cors {
        score += CORS_BONUS;
    }

    ScoredApi {
        api: api.clone(),
        score: score.min(1.0),
        matched_keywords: matched,
        role_match,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_drops_short_and_stop_words() {
        let tokens = tokenize_objective("Research the facts about cats and summarize for me");
        assert!(tokens.contains(&"research".to_string()));
        assert!(tokens.contains(&"facts".to_string()));
        assert!(tokens.contains(&"summarize".to_string()));
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"me".to_string()));
    }

    #[test]
    fn tokenizer_deduplicates() {
        let tokens = tokenize_objective("data data DATA analysis");
        assert_eq!(
            tokens,
            vec!["data".to_string(), "analysis".to_string()]
        );
    }

    #[test]
    fn researcher_bias_surfaces_reference_sources() {
        let picks = select_relevant_apis("Research cat facts and summarize", Role::Researcher, 5);
        assert_eq!(picks.len(), 5);
        assert!(
            picks
                .iter()
                .filter(|p| p.role_match)
                .any(|p| ["books", "science", "news", "reference"].contains(&p.api.category.as_str())),
            "expected at least one role-preferred category in the top picks"
        );
        // Ranking is descending.
        for pair in picks.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn keyword_bonus_is_capped() {
        let api = ApiEndpoint::new(
            "Kitchen Sink",
            "matches everything",
            "https://example.com/",
            "data",
            &["one", "two", "three", "four", "five", "six", "seven", "eight"],
            1.0,
        );
        let keywords: Vec<String> = ["one", "two", "three", "four", "five", "six", "seven", "eight"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let scored = score_api(&api, &keywords, &["data"]);
        // 0.6 cap + 0.3 role + 0.1 reliability + 0.05 + 0.025 + 0.025, clamped.
        assert!((scored.score - 1.0).abs() < f64::EPSILON);
        assert_eq!(scored.matched_keywords.len(), 8);
    }

    #[test]
    fn ties_break_on_reliability() {
        let coder = select_relevant_apis("", Role::Coder, 20);
        let dev_and_tools: Vec<&ScoredApi> =
            coder.iter().filter(|p| p.role_match).collect();
        for pair in dev_and_tools.windows(2) {
            if (pair[0].score - pair[1].score).abs() < f64::EPSILON {
                assert!(pair[0].api.reliability_score >= pair[1].api.reliability_score);
            }
        }
    }

    #[test]
    fn every_role_has_categories() {
        for role in [
            Role::Planner,
            Role::Coder,
            Role::Critic,
            Role::Researcher,
            Role::Analyzer,
            Role::Synthesizer,
            Role::UiArchitect,
            Role::UiImplementer,
            Role::UiRefiner,
        ] {
            assert!(!preferred_categories(role).is_empty());
        }
    }
}
