//! Role detection
//!
//! One deterministic pass over the lowercased objective against an
//! ordered keyword table; the first role with a hit wins and `planner`
//! is the fallback. UI roles are checked first because their trigger
//! phrases embed generic verbs ("implement", "design") that would
//! otherwise route to coder or planner.

use crate::types::Role;

/// Detection order and trigger keywords, frozen for reproducibility.
const DETECTION_TABLE: &[(Role, &[&str])] = &[
    (
        Role::UiRefiner,
        &["refine ui", "polish ui", "refine the ui", "visual tweak", "ui polish"],
    ),
    (
        Role::UiImplementer,
        &["implement ui", "build ui", "component", "frontend", "css", "interface build"],
    ),
    (
        Role::UiArchitect,
        &["ui design", "wireframe", "layout", "mockup", "design system", "user interface"],
    ),
    (
        Role::Researcher,
        &["research", "investigate", "explore", "discover", "find out", "facts", "study", "gather"],
    ),
    (
        Role::Critic,
        &["review", "critique", "audit", "assess", "evaluate", "security", "vulnerability"],
    ),
    (
        Role::Analyzer,
        &["analyze", "analyse", "analysis", "metrics", "statistics", "trends", "measure", "data"],
    ),
    (
        Role::Synthesizer,
        &["synthesize", "synthesis", "summarize", "combine", "merge", "consolidate", "integrate"],
    ),
    (
        Role::Coder,
        &["code", "implement", "build", "program", "debug", "script", "refactor", "fix"],
    ),
];

/// Detect the session role from the initial objective.
pub fn detect_role(objective: &str) -> Role {
    let haystack = objective.to_lowercase();
    for (role, keywords) in DETECTION_TABLE {
        if keywords.iter().any(|kw| haystack.contains(kw)) {
            return *role;
        }
    }
    Role::Planner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn research_objectives_route_to_researcher() {
        assert_eq!(detect_role("Research cat facts and summarize"), Role::Researcher);
        assert_eq!(detect_role("Investigate the outage"), Role::Researcher);
    }

    #[test]
    fn ui_phrases_win_over_generic_verbs() {
        assert_eq!(detect_role("Implement UI for the dashboard"), Role::UiImplementer);
        assert_eq!(detect_role("Polish UI spacing"), Role::UiRefiner);
        assert_eq!(detect_role("Produce a wireframe for onboarding"), Role::UiArchitect);
    }

    #[test]
    fn detection_is_case_insensitive() {
        assert_eq!(detect_role("ANALYZE the sales DATA"), Role::Analyzer);
    }

    #[test]
    fn unmatched_objectives_default_to_planner() {
        assert_eq!(detect_role("hello there"), Role::Planner);
        assert_eq!(detect_role(""), Role::Planner);
    }

    #[test]
    fn critic_keywords_route_to_critic() {
        assert_eq!(detect_role("Audit the auth flow"), Role::Critic);
        assert_eq!(detect_role("Security assessment of the gateway"), Role::Critic);
    }
}
