//! Meta-prompt extraction
//!
//! A todo carries a meta-prompt when its content contains, in any
//! order, the four labeled parenthesized fields
//! `(ROLE: …) (CONTEXT: …) (PROMPT: …) (OUTPUT: …)`. ROLE and PROMPT
//! are mandatory; CONTEXT and OUTPUT have defaults. An unknown role
//! name falls back to `researcher` so a typo does not silence the
//! delegation.

use crate::types::{MetaPrompt, Role};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

const DEFAULT_CONTEXT: &str = "general";
const DEFAULT_OUTPUT: &str = "deliverable";

fn field_regex(label: &str) -> Regex {
    Regex::new(&format!(r"(?i)\(\s*{label}\s*:\s*([^)]*)\)")).expect("static pattern compiles")
}

fn role_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| field_regex("ROLE"))
}

fn context_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| field_regex("CONTEXT"))
}

fn prompt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| field_regex("PROMPT"))
}

fn output_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| field_regex("OUTPUT"))
}

fn capture(re: &Regex, content: &str) -> Option<String> {
    re.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract a meta-prompt from todo content, if the grammar matches.
pub fn extract_meta_prompt(content: &str) -> Option<MetaPrompt> {
    let role_text = capture(role_re(), content)?;
    let instruction = capture(prompt_re(), content)?;

    let role = role_text.parse::<Role>().unwrap_or(Role::Researcher);
    let context = capture(context_re(), content).unwrap_or_else(|| DEFAULT_CONTEXT.to_string());
    let output = capture(output_re(), content).unwrap_or_else(|| DEFAULT_OUTPUT.to_string());

    let mut context_parameters = Map::new();
    context_parameters.insert("domain".to_string(), Value::String(context));

    Some(MetaPrompt {
        role_specification: role,
        context_parameters,
        instruction_block: instruction,
        output_requirements: output,
    })
}
