//! End-to-end workflow scenarios driven through the phase engine:
//! the full happy path, verification rollback, and the meta-prompt
//! extraction behavior visible from the executor's side.

use iron_manus_runtime::engine::{PhaseEngine, SessionStatus, TransitionRequest};
use iron_manus_runtime::{
    Config, KnowledgeGraphStore, Phase, RateLimiter, Role, SessionStore,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

struct Harness {
    engine: PhaseEngine,
    sessions: Arc<SessionStore>,
    graph: Arc<KnowledgeGraphStore>,
}

fn harness() -> Harness {
    let config = Config {
        auto_connection_enabled: false,
        session_dir: None,
        ..Config::default()
    };
    let sessions = Arc::new(SessionStore::new());
    let graph = Arc::new(KnowledgeGraphStore::in_memory());
    let engine = PhaseEngine::new(
        config,
        Arc::clone(&sessions),
        Arc::clone(&graph),
        Arc::new(RateLimiter::new()),
    );
    Harness {
        engine,
        sessions,
        graph,
    }
}

fn payload(entries: &[(&str, Value)]) -> Option<Map<String, Value>> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert((*key).to_string(), value.clone());
    }
    Some(map)
}

async fn advance(
    harness: &Harness,
    session_id: &str,
    completed: Option<&str>,
    extra: Option<Map<String, Value>>,
) -> iron_manus_runtime::engine::TransitionResponse {
    harness
        .engine
        .advance(TransitionRequest {
            session_id: Some(session_id.to_string()),
            phase_completed: completed.map(str::to_string),
            initial_objective: None,
            payload: extra,
        })
        .await
        .expect("transition should succeed")
}

#[tokio::test]
async fn happy_path_runs_init_to_done() {
    let h = harness();

    // First call: no session id, objective only.
    let response = h
        .engine
        .advance(TransitionRequest {
            session_id: None,
            phase_completed: None,
            initial_objective: Some("Research cat facts and summarize".to_string()),
            payload: None,
        })
        .await
        .unwrap();
    let sid = response.session_id.clone();

    assert_eq!(response.next_phase, Phase::Query);
    assert_eq!(response.allowed_next_tools, vec!["JARVIS"]);
    let role = h.sessions.get(&sid).unwrap().detected_role;
    assert!(
        role == Role::Researcher || role == Role::Synthesizer,
        "unexpected role {role}"
    );

    // QUERY → ENHANCE.
    let response = advance(
        &h,
        &sid,
        Some("QUERY"),
        payload(&[("interpreted_goal", json!("collect and condense cat facts"))]),
    )
    .await;
    assert_eq!(response.next_phase, Phase::Enhance);
    assert!(response.system_prompt.contains("collect and condense cat facts"));

    // ENHANCE → KNOWLEDGE. Auto-connection is disabled, so the prompt
    // must carry the manual-research fallback.
    let response = advance(
        &h,
        &sid,
        Some("ENHANCE"),
        payload(&[("enhanced_goal", json!("cat facts with sources and caveats"))]),
    )
    .await;
    assert_eq!(response.next_phase, Phase::Knowledge);
    for tool in ["WebSearch", "WebFetch", "APITaskAgent"] {
        assert!(
            response.system_prompt.contains(tool),
            "fallback notice should list {tool}"
        );
        assert!(response.allowed_next_tools.contains(&tool.to_string()));
    }
    assert_eq!(
        response.payload["auto_connection_metadata"]["successful"],
        json!(false)
    );

    // KNOWLEDGE → PLAN.
    let response = advance(
        &h,
        &sid,
        Some("KNOWLEDGE"),
        payload(&[("knowledge_gathered", json!("cats are crepuscular; sleep 12-16h"))]),
    )
    .await;
    assert_eq!(response.next_phase, Phase::Plan);
    assert_eq!(response.allowed_next_tools, vec!["TodoWrite"]);
    assert!(response.system_prompt.contains("(ROLE:"));

    // PLAN → EXECUTE with a meta-prompt todo.
    let response = advance(
        &h,
        &sid,
        Some("PLAN"),
        payload(&[(
            "todos_with_metaprompts",
            json!(["(ROLE: researcher) (CONTEXT: cats) (PROMPT: Summarize cat facts) (OUTPUT: report)"]),
        )]),
    )
    .await;
    assert_eq!(response.next_phase, Phase::Execute);
    let todos = response.payload["current_todos"].as_array().unwrap();
    assert_eq!(todos.len(), 1);
    assert_eq!(
        todos[0]["meta_prompt"]["role_specification"],
        json!("researcher")
    );
    assert_eq!(
        todos[0]["meta_prompt"]["instruction_block"],
        json!("Summarize cat facts")
    );
    assert_eq!(response.payload["current_task_index"], json!(0));

    // EXECUTE → VERIFY.
    let response = advance(
        &h,
        &sid,
        Some("EXECUTE"),
        payload(&[
            ("execution_success", json!(true)),
            ("more_tasks_pending", json!(false)),
        ]),
    )
    .await;
    assert_eq!(response.next_phase, Phase::Verify);

    // VERIFY → DONE with everything completed.
    let response = advance(
        &h,
        &sid,
        Some("VERIFY"),
        payload(&[
            (
                "current_todos",
                json!([{
                    "id": "1",
                    "content": "(ROLE: researcher) (CONTEXT: cats) (PROMPT: Summarize cat facts) (OUTPUT: report)",
                    "status": "completed",
                    "priority": "medium"
                }]),
            ),
            ("verification_passed", json!(true)),
        ]),
    )
    .await;
    assert_eq!(response.next_phase, Phase::Done);
    assert_eq!(response.status, SessionStatus::Done);
    assert!(response.allowed_next_tools.is_empty());

    // The graph mirrored the walk: every phase entity exists and the
    // task was recorded.
    let graph = h.graph.read_graph(&sid);
    for phase in ["QUERY", "ENHANCE", "KNOWLEDGE", "PLAN", "EXECUTE", "VERIFY", "DONE"] {
        assert!(
            graph.entity(&format!("{sid}_phase_{phase}")).is_some(),
            "missing phase entity for {phase}"
        );
    }
    assert!(graph.entity(&format!("{sid}_task_1")).is_some());
}

#[tokio::test]
async fn phase_sequence_is_a_prefix_of_the_nominal_order() {
    let h = harness();
    let sid = "monotone";
    let mut seen = vec![];

    seen.push(advance(&h, sid, None, None).await.next_phase);
    seen.push(
        advance(&h, sid, Some("QUERY"), payload(&[("interpreted_goal", json!("g"))]))
            .await
            .next_phase,
    );
    seen.push(
        advance(&h, sid, Some("ENHANCE"), payload(&[("enhanced_goal", json!("g"))]))
            .await
            .next_phase,
    );
    seen.push(
        advance(&h, sid, Some("KNOWLEDGE"), payload(&[("knowledge_gathered", json!("k"))]))
            .await
            .next_phase,
    );
    seen.push(
        advance(
            &h,
            sid,
            Some("PLAN"),
            payload(&[("todos_with_metaprompts", json!(["only task"]))]),
        )
        .await
        .next_phase,
    );
    seen.push(
        advance(
            &h,
            sid,
            Some("EXECUTE"),
            payload(&[("execution_success", json!(true)), ("more_tasks_pending", json!(false))]),
        )
        .await
        .next_phase,
    );
    seen.push(
        advance(
            &h,
            sid,
            Some("VERIFY"),
            payload(&[(
                "current_todos",
                json!([{"id": "1", "content": "only task", "status": "completed", "priority": "low"}]),
            )]),
        )
        .await
        .next_phase,
    );

    assert_eq!(
        seen,
        vec![
            Phase::Query,
            Phase::Enhance,
            Phase::Knowledge,
            Phase::Plan,
            Phase::Execute,
            Phase::Verify,
            Phase::Done,
        ]
    );
}

#[tokio::test]
async fn verify_failure_below_half_rolls_back_to_plan() {
    let h = harness();
    let sid = "rollback";

    advance(&h, sid, None, None).await;
    advance(&h, sid, Some("QUERY"), payload(&[("interpreted_goal", json!("g"))])).await;
    advance(&h, sid, Some("ENHANCE"), payload(&[("enhanced_goal", json!("g"))])).await;
    advance(&h, sid, Some("KNOWLEDGE"), payload(&[("knowledge_gathered", json!("k"))])).await;
    advance(
        &h,
        sid,
        Some("PLAN"),
        payload(&[("todos_with_metaprompts", json!(["t1", "t2", "t3", "t4", "t5"]))]),
    )
    .await;
    let response = advance(
        &h,
        sid,
        Some("EXECUTE"),
        payload(&[("execution_success", json!(true)), ("more_tasks_pending", json!(false))]),
    )
    .await;
    assert_eq!(response.next_phase, Phase::Verify);

    // Only 2 of 5 done (40%): the validator cites the 95% threshold and
    // the engine rolls all the way back to PLAN.
    let todos = json!([
        {"id": "1", "content": "t1", "status": "completed", "priority": "medium"},
        {"id": "2", "content": "t2", "status": "completed", "priority": "medium"},
        {"id": "3", "content": "t3", "status": "pending", "priority": "medium"},
        {"id": "4", "content": "t4", "status": "pending", "priority": "medium"},
        {"id": "5", "content": "t5", "status": "pending", "priority": "medium"}
    ]);
    let response = advance(&h, sid, Some("VERIFY"), payload(&[("current_todos", todos)])).await;

    assert_eq!(response.next_phase, Phase::Plan);
    assert_eq!(response.payload["current_task_index"], json!(0));
    assert_eq!(response.payload["last_completion_percentage"], json!(40));
    assert!(response.payload["verification_failure_reason"]
        .as_str()
        .unwrap()
        .contains("95%"));
    // The re-entered PLAN prompt surfaces the failure context on the
    // next VERIFY attempt; effectiveness survived the rollback.
    let record = h.sessions.get(sid).unwrap();
    assert!((record.reasoning_effectiveness - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn verify_failure_midway_stays_in_execute() {
    let h = harness();
    let sid = "midway";

    advance(&h, sid, None, None).await;
    advance(&h, sid, Some("QUERY"), payload(&[("interpreted_goal", json!("g"))])).await;
    advance(&h, sid, Some("ENHANCE"), payload(&[("enhanced_goal", json!("g"))])).await;
    advance(&h, sid, Some("KNOWLEDGE"), payload(&[("knowledge_gathered", json!("k"))])).await;
    advance(
        &h,
        sid,
        Some("PLAN"),
        payload(&[("todos_with_metaprompts", json!(["t1", "t2", "t3", "t4", "t5"]))]),
    )
    .await;
    // Work through three tasks, then jump to VERIFY.
    advance(&h, sid, Some("EXECUTE"), payload(&[("execution_success", json!(true))])).await;
    advance(&h, sid, Some("EXECUTE"), payload(&[("execution_success", json!(true))])).await;
    let response = advance(
        &h,
        sid,
        Some("EXECUTE"),
        payload(&[("execution_success", json!(true)), ("more_tasks_pending", json!(false))]),
    )
    .await;
    assert_eq!(response.next_phase, Phase::Verify);
    let index_at_verify = response.payload["current_task_index"].as_u64().unwrap();

    // 3 of 5 done (60%): stay in EXECUTE at the same index.
    let todos = json!([
        {"id": "1", "content": "t1", "status": "completed", "priority": "medium"},
        {"id": "2", "content": "t2", "status": "completed", "priority": "medium"},
        {"id": "3", "content": "t3", "status": "completed", "priority": "medium"},
        {"id": "4", "content": "t4", "status": "pending", "priority": "medium"},
        {"id": "5", "content": "t5", "status": "pending", "priority": "medium"}
    ]);
    let response = advance(&h, sid, Some("VERIFY"), payload(&[("current_todos", todos)])).await;
    assert_eq!(response.next_phase, Phase::Execute);
    assert_eq!(
        response.payload["current_task_index"].as_u64().unwrap(),
        index_at_verify
    );

    // 4 of 5 done (80%): retry from the previous index.
    let response = advance(
        &h,
        sid,
        Some("EXECUTE"),
        payload(&[("execution_success", json!(true)), ("more_tasks_pending", json!(false))]),
    )
    .await;
    assert_eq!(response.next_phase, Phase::Verify);
    let todos = json!([
        {"id": "1", "content": "t1", "status": "completed", "priority": "medium"},
        {"id": "2", "content": "t2", "status": "completed", "priority": "medium"},
        {"id": "3", "content": "t3", "status": "completed", "priority": "medium"},
        {"id": "4", "content": "t4", "status": "completed", "priority": "medium"},
        {"id": "5", "content": "t5", "status": "pending", "priority": "medium"}
    ]);
    let response = advance(&h, sid, Some("VERIFY"), payload(&[("current_todos", todos)])).await;
    assert_eq!(response.next_phase, Phase::Execute);
    assert_eq!(
        response.payload["current_task_index"].as_u64().unwrap(),
        index_at_verify.saturating_sub(1)
    );
}

#[tokio::test]
async fn plain_todo_without_grammar_yields_no_meta_prompt() {
    let h = harness();
    let sid = "plain";

    advance(&h, sid, None, None).await;
    advance(&h, sid, Some("QUERY"), payload(&[("interpreted_goal", json!("g"))])).await;
    advance(&h, sid, Some("ENHANCE"), payload(&[("enhanced_goal", json!("g"))])).await;
    advance(&h, sid, Some("KNOWLEDGE"), payload(&[("knowledge_gathered", json!("k"))])).await;
    let response = advance(
        &h,
        sid,
        Some("PLAN"),
        payload(&[("todos_with_metaprompts", json!(["do the thing"]))]),
    )
    .await;

    assert_eq!(response.next_phase, Phase::Execute);
    let todos = response.payload["current_todos"].as_array().unwrap();
    assert!(todos[0].get("meta_prompt").is_none());
    assert!(response.system_prompt.contains("do the thing"));
    assert!(response.system_prompt.contains("single tool per iteration"));
}

#[tokio::test]
async fn whitelists_match_the_frozen_table_per_phase() {
    let h = harness();
    let sid = "gate";

    let expectations: &[(Option<&str>, Option<Map<String, Value>>, &[&str])] = &[
        (None, None, &["JARVIS"]),
        (
            Some("QUERY"),
            payload(&[("interpreted_goal", json!("g"))]),
            &["JARVIS"],
        ),
        (
            Some("ENHANCE"),
            payload(&[("enhanced_goal", json!("g"))]),
            &[
                "WebSearch",
                "WebFetch",
                "APITaskAgent",
                "PythonComputationalTool",
                "Task",
            ],
        ),
        (
            Some("KNOWLEDGE"),
            payload(&[("knowledge_gathered", json!("k"))]),
            &["TodoWrite"],
        ),
    ];

    for (completed, extra, expected) in expectations {
        let response = advance(&h, sid, *completed, extra.clone()).await;
        let expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
        assert_eq!(response.allowed_next_tools, expected);
    }
}

#[tokio::test]
async fn done_is_terminal() {
    let h = harness();
    let sid = "terminal";

    advance(&h, sid, None, None).await;
    advance(&h, sid, Some("QUERY"), payload(&[("interpreted_goal", json!("g"))])).await;
    advance(&h, sid, Some("ENHANCE"), payload(&[("enhanced_goal", json!("g"))])).await;
    advance(&h, sid, Some("KNOWLEDGE"), payload(&[("knowledge_gathered", json!("k"))])).await;
    advance(&h, sid, Some("PLAN"), payload(&[("todos_with_metaprompts", json!([]))])).await;
    // An empty plan goes straight through EXECUTE to VERIFY and passes
    // at 100% completion.
    let response = advance(
        &h,
        sid,
        Some("EXECUTE"),
        payload(&[("execution_success", json!(true)), ("more_tasks_pending", json!(false))]),
    )
    .await;
    assert_eq!(response.next_phase, Phase::Verify);
    let response = advance(&h, sid, Some("VERIFY"), None).await;
    assert_eq!(response.next_phase, Phase::Done);

    // Any further call stays in DONE.
    let response = advance(&h, sid, Some("VERIFY"), None).await;
    assert_eq!(response.next_phase, Phase::Done);
    let response = advance(&h, sid, None, None).await;
    assert_eq!(response.next_phase, Phase::Done);
    assert_eq!(response.status, SessionStatus::Done);
}
