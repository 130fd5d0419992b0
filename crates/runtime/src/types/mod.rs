//! Core domain types for the orchestration runtime
//!
//! Phases, roles, session records and todo items are shared by every
//! subsystem; module-specific types (catalog endpoints, fetch results,
//! graph records) live with their modules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub mod error;

pub use error::{
    ConfigError, EngineError, FetchFailure, GraphError, KnowledgeError, RuntimeError,
    RuntimeResult,
};

/// The eight workflow phases. Ordering is the transition graph in the
/// phase engine, not a linear sequence: EXECUTE can loop and VERIFY can
/// roll back to PLAN or EXECUTE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Init,
    Query,
    Enhance,
    Knowledge,
    Plan,
    Execute,
    Verify,
    Done,
}

impl Phase {
    /// All phases in nominal forward order.
    pub const ALL: [Phase; 8] = [
        Phase::Init,
        Phase::Query,
        Phase::Enhance,
        Phase::Knowledge,
        Phase::Plan,
        Phase::Execute,
        Phase::Verify,
        Phase::Done,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Query => "QUERY",
            Phase::Enhance => "ENHANCE",
            Phase::Knowledge => "KNOWLEDGE",
            Phase::Plan => "PLAN",
            Phase::Execute => "EXECUTE",
            Phase::Verify => "VERIFY",
            Phase::Done => "DONE",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INIT" => Ok(Phase::Init),
            "QUERY" => Ok(Phase::Query),
            "ENHANCE" => Ok(Phase::Enhance),
            "KNOWLEDGE" => Ok(Phase::Knowledge),
            "PLAN" => Ok(Phase::Plan),
            "EXECUTE" => Ok(Phase::Execute),
            "VERIFY" => Ok(Phase::Verify),
            "DONE" => Ok(Phase::Done),
            other => Err(EngineError::Validation(format!(
                "unknown phase: {other}"
            ))),
        }
    }
}

/// Thinking methodology assigned to a session. Detected once from the
/// initial objective and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Planner,
    Coder,
    Critic,
    Researcher,
    Analyzer,
    Synthesizer,
    UiArchitect,
    UiImplementer,
    UiRefiner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Coder => "coder",
            Role::Critic => "critic",
            Role::Researcher => "researcher",
            Role::Analyzer => "analyzer",
            Role::Synthesizer => "synthesizer",
            Role::UiArchitect => "ui_architect",
            Role::UiImplementer => "ui_implementer",
            Role::UiRefiner => "ui_refiner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planner" => Ok(Role::Planner),
            "coder" => Ok(Role::Coder),
            "critic" => Ok(Role::Critic),
            "researcher" => Ok(Role::Researcher),
            "analyzer" => Ok(Role::Analyzer),
            "synthesizer" => Ok(Role::Synthesizer),
            "ui_architect" => Ok(Role::UiArchitect),
            "ui_implementer" => Ok(Role::UiImplementer),
            "ui_refiner" => Ok(Role::UiRefiner),
            other => Err(EngineError::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// Lower bound for reasoning effectiveness.
pub const EFFECTIVENESS_FLOOR: f64 = 0.3;
/// Upper bound for reasoning effectiveness.
pub const EFFECTIVENESS_CEILING: f64 = 1.0;
/// Starting effectiveness for new sessions.
pub const EFFECTIVENESS_INITIAL: f64 = 0.8;

/// Per-session orchestration state. Owned exclusively by the session
/// store; the engine and tool surface work on clones and write back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub current_phase: Phase,
    pub initial_objective: String,
    pub detected_role: Role,
    pub reasoning_effectiveness: f64,
    pub last_activity: DateTime<Utc>,
    /// Free-form payload. The engine reads and writes a closed set of
    /// named keys; unknown keys pass through untouched.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, objective: impl Into<String>, role: Role) -> Self {
        Self {
            session_id: session_id.into(),
            current_phase: Phase::Init,
            initial_objective: objective.into(),
            detected_role: role,
            reasoning_effectiveness: EFFECTIVENESS_INITIAL,
            last_activity: Utc::now(),
            payload: Map::new(),
        }
    }

    /// Shift effectiveness by `delta`, clamped to the allowed band.
    pub fn adjust_effectiveness(&mut self, delta: f64) {
        self.reasoning_effectiveness = (self.reasoning_effectiveness + delta)
            .clamp(EFFECTIVENESS_FLOOR, EFFECTIVENESS_CEILING);
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Read the current task index from the payload (0 when unset).
    pub fn current_task_index(&self) -> usize {
        self.payload
            .get("current_task_index")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
    Low,
    #[default]
    Medium,
    High,
}

/// A planned unit of work produced in PLAN and tracked through EXECUTE
/// and VERIFY.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub status: TodoStatus,
    #[serde(default)]
    pub priority: TodoPriority,
    /// Free-form task type marker; `TaskAgent` marks delegation to a
    /// fresh executor instance.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_prompt: Option<MetaPrompt>,
}

impl TodoItem {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            status: TodoStatus::Pending,
            priority: TodoPriority::Medium,
            task_type: None,
            meta_prompt: None,
        }
    }

    /// Critical todos gate verification: high priority, delegated to a
    /// task agent, or carrying an extracted meta-prompt.
    pub fn is_critical(&self) -> bool {
        self.priority == TodoPriority::High
            || self.task_type.as_deref() == Some("TaskAgent")
            || self.meta_prompt.is_some()
    }
}

/// Structured sub-task instruction extracted from todo text via the
/// `(ROLE:) (CONTEXT:) (PROMPT:) (OUTPUT:)` grammar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaPrompt {
    pub role_specification: Role,
    pub context_parameters: Map<String, Value>,
    pub instruction_block: String,
    pub output_requirements: String,
}
