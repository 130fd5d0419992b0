//! Phase engine
//!
//! One guarded FSM transition per call: validate the request, merge the
//! payload, apply the edge for the completed phase, mirror the move
//! into the knowledge graph and hand back the next phase's prompt and
//! tool whitelist. The engine is synchronous per call except for the
//! auto-connection run on the ENHANCE→KNOWLEDGE edge.

use crate::config::Config;
use crate::graph::KnowledgeGraphStore;
use crate::knowledge::AutoConnectionPipeline;
use crate::security::RateLimiter;
use crate::session::SessionStore;
use crate::types::{EngineError, Phase, SessionRecord, TodoItem};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

pub mod metaprompt;
pub mod prompts;
pub mod roles;
pub mod tool_gate;
pub mod validator;

pub use metaprompt::extract_meta_prompt;
pub use prompts::compose_prompt;
pub use roles::detect_role;
pub use tool_gate::allowed_tools;
pub use validator::{validate_completion, ValidationOutcome};

/// Effectiveness delta applied per EXECUTE completion.
const EFFECTIVENESS_STEP: f64 = 0.1;

/// One orchestrator call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransitionRequest {
    pub session_id: Option<String>,
    pub phase_completed: Option<String>,
    pub initial_objective: Option<String>,
    pub payload: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    InProgress,
    Done,
}

/// What the executor gets back from every call.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionResponse {
    pub session_id: String,
    pub next_phase: Phase,
    pub system_prompt: String,
    pub allowed_next_tools: Vec<String>,
    pub status: SessionStatus,
    pub payload: Map<String, Value>,
}

/// The FSM driver (C9). Borrows the session and graph stores through
/// narrow interfaces; owns nothing but the pipeline handle.
pub struct PhaseEngine {
    config: Config,
    sessions: Arc<SessionStore>,
    graph: Arc<KnowledgeGraphStore>,
    pipeline: Option<AutoConnectionPipeline>,
}

impl PhaseEngine {
    pub fn new(
        config: Config,
        sessions: Arc<SessionStore>,
        graph: Arc<KnowledgeGraphStore>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let pipeline = if config.auto_connection_enabled {
            match AutoConnectionPipeline::new(&config, limiter) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(error = %e, "auto-connection disabled: pipeline build failed");
                    None
                }
            }
        } else {
            None
        };
        Self {
            config,
            sessions,
            graph,
            pipeline,
        }
    }

    /// Test seam: run with an injected pipeline (or none).
    pub fn with_pipeline(
        config: Config,
        sessions: Arc<SessionStore>,
        graph: Arc<KnowledgeGraphStore>,
        pipeline: Option<AutoConnectionPipeline>,
    ) -> Self {
        Self {
            config,
            sessions,
            graph,
            pipeline,
        }
    }

    /// Advance a session by one transition.
    pub async fn advance(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionResponse, EngineError> {
        let phase_completed = request
            .phase_completed
            .as_deref()
            .map(str::parse::<Phase>)
            .transpose()?;

        let session_id = request
            .session_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("session_{}", Uuid::new_v4()));

        let mut session = match self.sessions.get(&session_id) {
            Some(existing) => existing,
            None => {
                let objective = request.initial_objective.clone().unwrap_or_default();
                let role = roles::detect_role(&objective);
                if let Err(e) = self.graph.initialize_session(&session_id, &objective, role) {
                    tracing::warn!(error = %e, session_id = %session_id, "graph session init failed");
                }
                SessionRecord::new(&session_id, objective, role)
            }
        };

        // A session created by the graph tool before its first JARVIS
        // call has no objective yet; the first one supplied counts as
        // the initial objective and fixes the role.
        if session.initial_objective.is_empty() {
            if let Some(objective) = request
                .initial_objective
                .as_deref()
                .filter(|o| !o.trim().is_empty())
            {
                session.initial_objective = objective.to_string();
                session.detected_role = roles::detect_role(objective);
            }
        }

        // Last-writer-wins payload merge; unknown keys pass through.
        if let Some(payload) = request.payload {
            for (key, value) in payload {
                session.payload.insert(key, value);
            }
        }

        let from_phase = session.current_phase;
        let next_phase = self.compute_transition(&mut session, phase_completed).await;
        session.current_phase = next_phase;

        if next_phase != from_phase {
            if let Err(e) = self
                .graph
                .record_phase_transition(&session.session_id, from_phase, next_phase)
            {
                tracing::warn!(error = %e, session_id = %session.session_id, "graph transition record failed");
            }
            tracing::info!(
                session_id = %session.session_id,
                from = %from_phase,
                to = %next_phase,
                "phase transition"
            );
        }

        let system_prompt = compose_prompt(session.detected_role, next_phase, &session);
        let allowed_next_tools: Vec<String> = allowed_tools(next_phase)
            .iter()
            .map(|t| (*t).to_string())
            .collect();
        let status = if next_phase.is_terminal() {
            SessionStatus::Done
        } else {
            SessionStatus::InProgress
        };
        let payload = session.payload.clone();
        let session_id = session.session_id.clone();
        self.sessions.upsert(session);

        Ok(TransitionResponse {
            session_id,
            next_phase,
            system_prompt,
            allowed_next_tools,
            status,
            payload,
        })
    }

    async fn compute_transition(
        &self,
        session: &mut SessionRecord,
        phase_completed: Option<Phase>,
    ) -> Phase {
        let current = session.current_phase;
        match (current, phase_completed) {
            (Phase::Done, _) => Phase::Done,
            (Phase::Init, _) => Phase::Query,
            (_, Some(completed)) if completed == current => self.apply_edge(session).await,
            // Mismatched or absent completion: no transition, the
            // current phase prompt is simply re-issued.
            _ => current,
        }
    }

    async fn apply_edge(&self, session: &mut SessionRecord) -> Phase {
        match session.current_phase {
            Phase::Init | Phase::Done => session.current_phase,
            Phase::Query => Phase::Enhance,
            Phase::Enhance => {
                self.run_auto_connection(session).await;
                Phase::Knowledge
            }
            Phase::Knowledge => Phase::Plan,
            Phase::Plan => {
                self.ingest_plan(session);
                Phase::Execute
            }
            Phase::Execute => self.complete_execute_step(session),
            Phase::Verify => self.run_verification(session),
        }
    }

    /// ENHANCE→KNOWLEDGE: run the auto-connection pipeline so its
    /// synthesis (or a fallback notice) lands in the KNOWLEDGE prompt.
    /// Failures never block the transition.
    async fn run_auto_connection(&self, session: &mut SessionRecord) {
        let Some(pipeline) = (self.config.auto_connection_enabled)
            .then_some(self.pipeline.as_ref())
            .flatten()
        else {
            session.payload.insert(
                "auto_connection_metadata".to_string(),
                json!({ "successful": false, "reason": "auto-connection disabled" }),
            );
            session.payload.insert(
                "api_usage_metrics".to_string(),
                json!({ "apis_attempted": 0, "successful": 0, "avg_confidence": 0.0, "processing_time_ms": 0 }),
            );
            return;
        };

        let objective = session
            .payload
            .get("enhanced_goal")
            .and_then(Value::as_str)
            .or_else(|| session.payload.get("interpreted_goal").and_then(Value::as_str))
            .unwrap_or(&session.initial_objective)
            .to_string();

        let synthesis = pipeline.run(&objective, session.detected_role).await;
        let successful = synthesis.succeeded();
        tracing::info!(
            session_id = %session.session_id,
            successful,
            sources = synthesis.sources_used.len(),
            confidence = synthesis.overall_confidence,
            "auto-connection finished"
        );

        session.payload.insert(
            "api_usage_metrics".to_string(),
            json!({
                "apis_attempted": synthesis.metadata.total,
                "successful": synthesis.metadata.successful,
                "avg_confidence": synthesis.metadata.avg_confidence,
                "processing_time_ms": synthesis.metadata.processing_time_ms,
            }),
        );
        session.payload.insert(
            "auto_connection_metadata".to_string(),
            json!({
                "successful": successful,
                "sources_used": synthesis.sources_used,
                "overall_confidence": synthesis.overall_confidence,
                "contradictions": synthesis.contradictions.len(),
            }),
        );
        session.payload.insert(
            "synthesized_knowledge".to_string(),
            Value::String(synthesis.synthesized_content),
        );
    }

    /// PLAN→EXECUTE: parse the submitted todos, extract meta-prompts
    /// and reset the task cursor.
    fn ingest_plan(&self, session: &mut SessionRecord) {
        let todos = parse_todos(session.payload.get("todos_with_metaprompts"));
        for todo in &todos {
            if let Err(e) = self.graph.record_task_creation(
                &session.session_id,
                &todo.id,
                &todo.content,
                todo.priority,
            ) {
                tracing::warn!(error = %e, task_id = %todo.id, "graph task record failed");
            }
        }
        session.payload.insert(
            "current_todos".to_string(),
            serde_json::to_value(&todos).unwrap_or(Value::Array(Vec::new())),
        );
        session
            .payload
            .insert("current_task_index".to_string(), json!(0));
    }

    /// EXECUTE→EXECUTE|VERIFY: adjust effectiveness from the reported
    /// outcome, then either move the cursor or proceed to verification.
    fn complete_execute_step(&self, session: &mut SessionRecord) -> Phase {
        let success = session
            .payload
            .get("execution_success")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        session.adjust_effectiveness(if success {
            EFFECTIVENESS_STEP
        } else {
            -EFFECTIVENESS_STEP
        });
        if let Err(e) = self
            .graph
            .record_performance(&session.session_id, session.reasoning_effectiveness)
        {
            tracing::warn!(error = %e, "graph performance record failed");
        }

        let index = session.current_task_index();
        let total = prompts::payload_todos(session).len();
        let more_pending = session
            .payload
            .get("more_tasks_pending")
            .and_then(Value::as_bool)
            .unwrap_or(index + 1 < total);

        if more_pending {
            session
                .payload
                .insert("current_task_index".to_string(), json!(index + 1));
            Phase::Execute
        } else {
            Phase::Verify
        }
    }

    /// VERIFY→DONE or rollback. The rollback depth scales with how far
    /// the work actually got.
    fn run_verification(&self, session: &mut SessionRecord) -> Phase {
        let todos = prompts::payload_todos(session);
        let claimed = session
            .payload
            .get("verification_passed")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let outcome =
            validate_completion(&todos, session.reasoning_effectiveness, claimed);

        if outcome.passed {
            session.payload.remove("verification_failure_reason");
            return Phase::Done;
        }

        let reason = outcome
            .reason
            .clone()
            .unwrap_or_else(|| "verification failed".to_string());
        tracing::info!(
            session_id = %session.session_id,
            completion_pct = outcome.completion_pct,
            reason = %reason,
            "verification failed, rolling back"
        );
        session.payload.insert(
            "verification_failure_reason".to_string(),
            Value::String(reason),
        );
        session.payload.insert(
            "last_completion_percentage".to_string(),
            json!(outcome.completion_pct),
        );

        let index = session.current_task_index();
        if outcome.completion_pct < 50 {
            session
                .payload
                .insert("current_task_index".to_string(), json!(0));
            Phase::Plan
        } else if outcome.completion_pct < 80 {
            Phase::Execute
        } else {
            session
                .payload
                .insert("current_task_index".to_string(), json!(index.saturating_sub(1)));
            Phase::Execute
        }
    }
}

/// Parse the executor-submitted todo list. Accepts plain strings or
/// objects with the todo fields; anything unreadable is skipped.
fn parse_todos(raw: Option<&Value>) -> Vec<TodoItem> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };

    let mut todos = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let default_id = (i + 1).to_string();
        let mut todo = match item {
            Value::String(content) => TodoItem::new(default_id, content.clone()),
            Value::Object(_) => {
                let mut parsed: TodoItem = match serde_json::from_value(pad_todo_object(
                    item.clone(),
                    &default_id,
                )) {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(error = %e, index = i, "skipping malformed todo");
                        continue;
                    }
                };
                if parsed.id.is_empty() {
                    parsed.id = default_id;
                }
                parsed
            }
            _ => continue,
        };
        if todo.meta_prompt.is_none() {
            todo.meta_prompt = extract_meta_prompt(&todo.content);
        }
        if todo.meta_prompt.is_some() && todo.task_type.is_none() {
            todo.task_type = Some("TaskAgent".to_string());
        }
        todos.push(todo);
    }
    todos
}

/// Fill the fields `TodoItem` requires before deserializing a loose
/// object.
fn pad_todo_object(mut value: Value, default_id: &str) -> Value {
    if let Value::Object(map) = &mut value {
        map.entry("id".to_string())
            .or_insert_with(|| Value::String(default_id.to_string()));
        map.entry("content".to_string())
            .or_insert_with(|| Value::String(String::new()));
    }
    value
}
