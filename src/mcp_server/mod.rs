//! MCP server for Iron Manus.
//!
//! Exposes the orchestrator as MCP tools over stdio transport using the
//! rmcp SDK: JARVIS (one FSM transition per call), APITaskAgent
//! (discover → validate → fetch → synthesize), IronManusStateGraph
//! (session knowledge graph CRUD) and HealthCheck.

use std::sync::Arc;
use std::time::Instant;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use iron_manus_runtime::catalog::{select_relevant_apis, ScoredApi};
use iron_manus_runtime::engine::detect_role;
use iron_manus_runtime::graph::{Entity, EntityType, Relation, RelationType};
use iron_manus_runtime::health::health_check;
use iron_manus_runtime::knowledge::{AutoConnectionPipeline, HttpContentFetcher, SynthesisResult};
use iron_manus_runtime::session::SessionStore;
use iron_manus_runtime::types::{Role, TodoPriority, TodoStatus};
use iron_manus_runtime::{
    Config, KnowledgeGraphStore, Phase, PhaseEngine, RateLimiter, TransitionRequest,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct JarvisParams {
    /// Session identifier; omit on the first call to start a new session
    pub session_id: Option<String>,
    /// The phase just completed (QUERY, ENHANCE, KNOWLEDGE, PLAN, EXECUTE or VERIFY)
    pub phase_completed: Option<String>,
    /// The user objective; required on the first call of a session
    pub initial_objective: Option<String>,
    /// Phase outputs to merge into the session payload
    pub payload: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ApiTaskAgentParams {
    /// What to research
    pub objective: String,
    /// Role lens for source selection (researcher, analyzer, coder, ...)
    pub user_role: String,
    /// light (2 sources), standard (3) or deep (5)
    pub research_depth: Option<String>,
    /// Append a validation section covering confidence and contradictions
    pub validation_required: Option<bool>,
    /// Override the number of sources to fetch (1-5)
    pub max_sources: Option<usize>,
    /// Only consider catalog APIs in this category
    pub category_filter: Option<String>,
    /// Override the per-request timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Extra headers to send, as a name→value map
    pub headers: Option<std::collections::HashMap<String, String>>,
    /// Fetch these URLs instead of discovering catalog APIs
    pub api_endpoints: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EntityParam {
    pub name: String,
    /// session, phase, task, role, api or performance
    pub entity_type: String,
    pub observations: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RelationParam {
    pub from: String,
    pub to: String,
    /// transitions_to, spawns, depends_on, uses, tracks or contains
    pub relation_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ObservationParam {
    pub entity_name: String,
    pub contents: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StateGraphParams {
    /// create_entities, create_relations, add_observations, delete_entities,
    /// delete_observations, delete_relations, read_graph, search_nodes,
    /// open_nodes, initialize_session, record_phase_transition,
    /// record_task_creation or update_task_status
    pub action: String,
    pub session_id: String,
    pub entities: Option<Vec<EntityParam>>,
    pub relations: Option<Vec<RelationParam>>,
    pub observations: Option<Vec<ObservationParam>>,
    /// Entity names for delete_entities
    pub entity_names: Option<Vec<String>>,
    /// Entity names for open_nodes
    pub names: Option<Vec<String>>,
    /// Query string for search_nodes
    pub query: Option<String>,
    /// Objective for initialize_session
    pub objective: Option<String>,
    /// Role for initialize_session
    pub role: Option<String>,
    /// Source phase for record_phase_transition
    pub from_phase: Option<String>,
    /// Target phase for record_phase_transition
    pub to_phase: Option<String>,
    pub task_id: Option<String>,
    /// Todo content for record_task_creation
    pub content: Option<String>,
    /// low, medium or high
    pub priority: Option<String>,
    /// pending, in_progress or completed
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct HealthCheckParams {
    /// Include the active configuration snapshot
    pub detailed: Option<bool>,
}

// ---------------------------------------------------------------------------
// Server struct
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct IronManusServer {
    config: Config,
    engine: Arc<PhaseEngine>,
    graph: Arc<KnowledgeGraphStore>,
    limiter: Arc<RateLimiter>,
    started_at: Instant,
    tool_router: ToolRouter<Self>,
}

// ---------------------------------------------------------------------------
// Tool definitions
// ---------------------------------------------------------------------------

#[tool_router]
impl IronManusServer {
    pub fn new(config: Config) -> Self {
        let sessions = Arc::new(SessionStore::new());
        let graph = Arc::new(KnowledgeGraphStore::from_session_dir(
            config.session_dir.as_deref(),
        ));
        let limiter = Arc::new(RateLimiter::new());
        let engine = Arc::new(PhaseEngine::new(
            config.clone(),
            Arc::clone(&sessions),
            Arc::clone(&graph),
            Arc::clone(&limiter),
        ));
        let _ = Arc::clone(&sessions).spawn_sweeper();

        Self {
            config,
            engine,
            graph,
            limiter,
            started_at: Instant::now(),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "JARVIS",
        description = "Advance the orchestration workflow by one phase transition. Call with initial_objective to start a session, then call back after each phase with phase_completed and the phase's payload. Returns the next phase, its system prompt and the allowed tool whitelist."
    )]
    async fn jarvis(
        &self,
        Parameters(params): Parameters<JarvisParams>,
    ) -> Result<CallToolResult, McpError> {
        let request = TransitionRequest {
            session_id: params.session_id,
            phase_completed: params.phase_completed,
            initial_objective: params.initial_objective,
            payload: params.payload,
        };

        match self.engine.advance(request).await {
            Ok(response) => {
                let text = serde_json::to_string_pretty(&response)
                    .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(error_with_guidance(
                &e.to_string(),
                "Check session_id and phase_completed: phase_completed must name the phase \
                 you just finished (QUERY, ENHANCE, KNOWLEDGE, PLAN, EXECUTE or VERIFY), and \
                 the first call of a session needs initial_objective. Session state is \
                 unchanged; retry with corrected arguments.",
            )),
        }
    }

    #[tool(
        name = "APITaskAgent",
        description = "Research an objective through the API catalog: discover role-relevant sources, validate them against SSRF and rate-limit policy, fetch in parallel and synthesize a confidence-weighted report."
    )]
    async fn api_task_agent(
        &self,
        Parameters(params): Parameters<ApiTaskAgentParams>,
    ) -> Result<CallToolResult, McpError> {
        let role = params
            .user_role
            .parse::<Role>()
            .unwrap_or_else(|_| detect_role(&params.objective));

        let mut config = self.config.clone();
        if let Some(timeout_ms) = params.timeout_ms {
            config.knowledge_timeout_ms = timeout_ms.clamp(100, 60_000);
        }

        let headers: Vec<(String, String)> = params
            .headers
            .map(|h| h.into_iter().collect())
            .unwrap_or_default();
        let fetcher = match HttpContentFetcher::with_headers(&config, &headers) {
            Ok(f) => f,
            Err(e) => {
                return Ok(error_with_guidance(
                    &e.to_string(),
                    "Header names must be valid HTTP tokens and values must be visible \
                     ASCII. Drop or fix the offending header and retry.",
                ))
            }
        };
        let pipeline = AutoConnectionPipeline::with_fetcher(
            &config,
            Arc::clone(&self.limiter),
            Arc::new(fetcher),
        );

        let max_sources = params
            .max_sources
            .unwrap_or_else(|| match params.research_depth.as_deref() {
                Some("light") => 2,
                Some("deep") => 5,
                _ => 3,
            })
            .clamp(1, 5);

        let (synthesis, discovered) = if let Some(endpoints) =
            params.api_endpoints.as_ref().filter(|e| !e.is_empty())
        {
            let endpoints: Vec<String> = endpoints.iter().take(max_sources).cloned().collect();
            (
                pipeline.run_with_endpoints(&params.objective, &endpoints).await,
                Vec::new(),
            )
        } else {
            let mut scored = select_relevant_apis(&params.objective, role, usize::MAX);
            if let Some(category) = &params.category_filter {
                scored.retain(|s| s.api.category.eq_ignore_ascii_case(category));
            }
            scored.truncate(max_sources);
            if scored.is_empty() {
                return Ok(error_with_guidance(
                    "no catalog API matches the category filter",
                    "Drop category_filter or use one of the catalog categories (books, \
                     science, news, reference, development, tools, data, finance, \
                     analytics, art, color, calendar, productivity, testing, security, \
                     integration).",
                ));
            }
            let urls: Vec<String> = scored.iter().map(|s| s.api.url.clone()).collect();
            (
                pipeline.run_with_endpoints(&params.objective, &urls).await,
                scored,
            )
        };

        let report = format_research_report(
            &params.objective,
            role,
            &discovered,
            &synthesis,
            params.validation_required.unwrap_or(false),
            self.config.knowledge_confidence_threshold,
        );
        Ok(CallToolResult::success(vec![Content::text(report)]))
    }

    #[tool(
        name = "IronManusStateGraph",
        description = "Session-scoped knowledge graph: create and delete entities, relations and observations, read or search the graph, and record session lifecycle events (phase transitions, task creation, status updates)."
    )]
    async fn state_graph(
        &self,
        Parameters(params): Parameters<StateGraphParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.dispatch_graph_action(&params) {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value)
                    .unwrap_or_else(|_| value.to_string());
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(message) => Ok(error_with_guidance(
                &message,
                "Check the action name and its required fields: entities for \
                 create_entities, relations for create_relations, observations for \
                 add_observations/delete_observations, entity_names for delete_entities, \
                 query for search_nodes, names for open_nodes. The graph is unchanged.",
            )),
        }
    }

    #[tool(
        name = "HealthCheck",
        description = "Report orchestrator health: configuration validity, tool registry consistency, process memory and uptime."
    )]
    async fn health(
        &self,
        Parameters(params): Parameters<HealthCheckParams>,
    ) -> Result<CallToolResult, McpError> {
        let report = health_check(&self.config, self.started_at, VERSION);
        let mut value = serde_json::to_value(&report).unwrap_or_else(|_| json!({}));
        if params.detailed.unwrap_or(false) {
            if let (Value::Object(map), Ok(config)) =
                (&mut value, serde_json::to_value(&self.config))
            {
                map.insert("configuration_snapshot".to_string(), config);
            }
        }
        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

impl IronManusServer {
    fn dispatch_graph_action(&self, params: &StateGraphParams) -> Result<Value, String> {
        let sid = params.session_id.as_str();
        match params.action.as_str() {
            "create_entities" => {
                let entities = convert_entities(params.entities.as_deref().unwrap_or_default())?;
                let created = self
                    .graph
                    .create_entities(sid, entities)
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "created": created }))
            }
            "create_relations" => {
                let relations =
                    convert_relations(params.relations.as_deref().unwrap_or_default())?;
                let created = self
                    .graph
                    .create_relations(sid, relations)
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "created": created }))
            }
            "add_observations" => {
                let mut added = 0;
                for obs in params.observations.as_deref().unwrap_or_default() {
                    added += self
                        .graph
                        .add_observations(sid, &obs.entity_name, obs.contents.clone())
                        .map_err(|e| e.to_string())?;
                }
                Ok(json!({ "added": added }))
            }
            "delete_entities" => {
                let names = params
                    .entity_names
                    .clone()
                    .ok_or("delete_entities requires entity_names")?;
                let deleted = self
                    .graph
                    .delete_entities(sid, &names)
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "deleted": deleted }))
            }
            "delete_observations" => {
                let mut deleted = 0;
                for obs in params.observations.as_deref().unwrap_or_default() {
                    deleted += self
                        .graph
                        .delete_observations(sid, &obs.entity_name, &obs.contents)
                        .map_err(|e| e.to_string())?;
                }
                Ok(json!({ "deleted": deleted }))
            }
            "delete_relations" => {
                let relations =
                    convert_relations(params.relations.as_deref().unwrap_or_default())?;
                let deleted = self
                    .graph
                    .delete_relations(sid, &relations)
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "deleted": deleted }))
            }
            "read_graph" => {
                serde_json::to_value(self.graph.read_graph(sid)).map_err(|e| e.to_string())
            }
            "search_nodes" => {
                let query = params.query.as_deref().ok_or("search_nodes requires query")?;
                serde_json::to_value(self.graph.search_nodes(sid, query))
                    .map_err(|e| e.to_string())
            }
            "open_nodes" => {
                let names = params.names.clone().ok_or("open_nodes requires names")?;
                serde_json::to_value(self.graph.open_nodes(sid, &names))
                    .map_err(|e| e.to_string())
            }
            "initialize_session" => {
                let objective = params
                    .objective
                    .as_deref()
                    .ok_or("initialize_session requires objective")?;
                let role = parse_role(params.role.as_deref())?;
                self.graph
                    .initialize_session(sid, objective, role)
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "initialized": sid }))
            }
            "record_phase_transition" => {
                let from = parse_phase(params.from_phase.as_deref(), "from_phase")?;
                let to = parse_phase(params.to_phase.as_deref(), "to_phase")?;
                self.graph
                    .record_phase_transition(sid, from, to)
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "recorded": format!("{from} -> {to}") }))
            }
            "record_task_creation" => {
                let task_id = params
                    .task_id
                    .as_deref()
                    .ok_or("record_task_creation requires task_id")?;
                let content = params
                    .content
                    .as_deref()
                    .ok_or("record_task_creation requires content")?;
                let priority = parse_priority(params.priority.as_deref())?;
                self.graph
                    .record_task_creation(sid, task_id, content, priority)
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "recorded": task_id }))
            }
            "update_task_status" => {
                let task_id = params
                    .task_id
                    .as_deref()
                    .ok_or("update_task_status requires task_id")?;
                let status = parse_status(params.status.as_deref())?;
                self.graph
                    .update_task_status(sid, task_id, status)
                    .map_err(|e| e.to_string())?;
                Ok(json!({ "updated": task_id }))
            }
            other => Err(format!("unknown action: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerHandler — #[tool_handler] auto-generates list_tools + call_tool
// ---------------------------------------------------------------------------

#[tool_handler]
impl ServerHandler for IronManusServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Iron Manus orchestration server — drive the JARVIS workflow one phase \
                 at a time, research through APITaskAgent, record session state in \
                 IronManusStateGraph"
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// All boundary failures become structured error responses with a short
/// corrective block; nothing propagates to the transport as a protocol
/// error.
fn error_with_guidance(message: &str, guidance: &str) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!(
        "Error: {message}\n\nNext step: {guidance}"
    ))])
}

fn convert_entities(params: &[EntityParam]) -> Result<Vec<Entity>, String> {
    params
        .iter()
        .map(|p| {
            let entity_type = parse_entity_type(&p.entity_type)?;
            Ok(Entity {
                name: p.name.clone(),
                entity_type,
                observations: p.observations.clone().unwrap_or_default(),
            })
        })
        .collect()
}

fn convert_relations(params: &[RelationParam]) -> Result<Vec<Relation>, String> {
    params
        .iter()
        .map(|p| {
            let relation_type = parse_relation_type(&p.relation_type)?;
            Ok(Relation {
                from: p.from.clone(),
                to: p.to.clone(),
                relation_type,
            })
        })
        .collect()
}

fn parse_entity_type(raw: &str) -> Result<EntityType, String> {
    serde_json::from_value(Value::String(raw.to_lowercase()))
        .map_err(|_| format!("unknown entity type: {raw}"))
}

fn parse_relation_type(raw: &str) -> Result<RelationType, String> {
    serde_json::from_value(Value::String(raw.to_lowercase()))
        .map_err(|_| format!("unknown relation type: {raw}"))
}

fn parse_role(raw: Option<&str>) -> Result<Role, String> {
    raw.ok_or("initialize_session requires role")?
        .parse::<Role>()
        .map_err(|e| e.to_string())
}

fn parse_phase(raw: Option<&str>, field: &str) -> Result<Phase, String> {
    raw.ok_or(format!("record_phase_transition requires {field}"))?
        .parse::<Phase>()
        .map_err(|e| e.to_string())
}

fn parse_priority(raw: Option<&str>) -> Result<TodoPriority, String> {
    match raw {
        None => Ok(TodoPriority::Medium),
        Some(s) => serde_json::from_value(Value::String(s.to_lowercase()))
            .map_err(|_| format!("unknown priority: {s}")),
    }
}

fn parse_status(raw: Option<&str>) -> Result<TodoStatus, String> {
    let raw = raw.ok_or_else(|| "update_task_status requires status".to_string())?;
    serde_json::from_value(Value::String(raw.to_lowercase()))
        .map_err(|_| format!("unknown status: {raw}"))
}

fn format_research_report(
    objective: &str,
    role: Role,
    discovered: &[ScoredApi],
    synthesis: &SynthesisResult,
    validation_required: bool,
    confidence_threshold: f64,
) -> String {
    let mut report = String::new();
    report.push_str(&format!("# API Research Report\n\n**Objective:** {objective}\n**Role lens:** {role}\n\n"));

    if !discovered.is_empty() {
        report.push_str("## Discovery\n\n");
        for scored in discovered {
            report.push_str(&format!(
                "- {} ({}) — score {:.2}{}\n",
                scored.api.name,
                scored.api.category,
                scored.score,
                if scored.role_match { ", role match" } else { "" }
            ));
        }
        report.push('\n');
    }

    report.push_str(&synthesis.synthesized_content);

    if validation_required {
        report.push_str("\n\n## Validation\n\n");
        report.push_str(&format!(
            "- Confidence threshold: {confidence_threshold:.2}\n- Overall confidence: {:.2} ({})\n- Contradictions: {}\n",
            synthesis.overall_confidence,
            if synthesis.overall_confidence >= confidence_threshold {
                "meets threshold"
            } else {
                "below threshold — corroborate before relying on this"
            },
            synthesis.contradictions.len(),
        ));
    }

    report.push_str(&format!(
        "\n---\n{} of {} sources fetched successfully in {} ms.\n",
        synthesis.metadata.successful,
        synthesis.metadata.total,
        synthesis.metadata.processing_time_ms,
    ));
    report
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Start the MCP server over stdio transport.
pub async fn start_mcp_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let service = IronManusServer::new(config).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
