//! Prompt composition
//!
//! `compose_prompt` is a pure function of the role, the phase being
//! entered and the session record: a role-enhanced base prompt plus
//! phase-specific context blocks read from the payload. The full role
//! prompt library is an external collaborator; the guidance strings
//! here are the contract surface the engine owns.

use crate::engine::tool_gate::allowed_tools;
use crate::types::{Phase, Role, SessionRecord, TodoItem, TodoStatus};
use serde_json::Value;

/// Compose the system prompt for a session entering `phase`.
pub fn compose_prompt(role: Role, phase: Phase, session: &SessionRecord) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format!(
        "You are the execution layer of an orchestrated workflow, currently in the {phase} phase."
    ));
    parts.push(role_guidance(role).to_string());
    parts.push(phase_instructions(phase).to_string());

    match phase {
        Phase::Enhance => {
            if let Some(goal) = payload_str(session, "interpreted_goal") {
                parts.push(format!("Interpreted goal:\n{goal}"));
            }
        }
        Phase::Knowledge => {
            parts.push(knowledge_context(session));
        }
        Phase::Plan => {
            if let Some(goal) = payload_str(session, "enhanced_goal") {
                parts.push(format!("Enhanced goal:\n{goal}"));
            }
            parts.push(META_PROMPT_GRAMMAR.to_string());
        }
        Phase::Execute => {
            parts.push(execute_context(session));
        }
        Phase::Verify => {
            parts.push(verify_context(session));
        }
        Phase::Init | Phase::Query | Phase::Done => {}
    }

    parts.push(format!(
        "Objective: {}",
        if session.initial_objective.is_empty() {
            "(not provided)"
        } else {
            &session.initial_objective
        }
    ));

    parts.join("\n\n")
}

fn role_guidance(role: Role) -> &'static str {
    match role {
        Role::Planner => {
            "Think like a planner: decompose the objective into ordered, verifiable steps \
             and keep dependencies explicit."
        }
        Role::Coder => {
            "Think like a coder: favor concrete implementation steps, small testable \
             changes and explicit failure modes."
        }
        Role::Critic => {
            "Think like a critic: challenge assumptions, look for gaps and risks, and \
             grade the work against stated requirements."
        }
        Role::Researcher => {
            "Think like a researcher: gather evidence from multiple sources, keep \
             provenance and separate facts from interpretation."
        }
        Role::Analyzer => {
            "Think like an analyzer: quantify where possible, compare against baselines \
             and surface trends rather than single data points."
        }
        Role::Synthesizer => {
            "Think like a synthesizer: reconcile inputs from different sources into one \
             coherent picture and flag disagreements."
        }
        Role::UiArchitect => {
            "Think like a UI architect: structure information hierarchy and user flows \
             before visual detail."
        }
        Role::UiImplementer => {
            "Think like a UI implementer: translate designs into accessible, working \
             components with exact spacing and states."
        }
        Role::UiRefiner => {
            "Think like a UI refiner: polish visual and interaction details against the \
             existing design language."
        }
    }
}

fn phase_instructions(phase: Phase) -> &'static str {
    match phase {
        Phase::Init | Phase::Query => {
            "Interpret what the user actually needs. Distill the objective into a single \
             interpreted goal, then report back with phase_completed=QUERY and \
             payload.interpreted_goal."
        }
        Phase::Enhance => {
            "Enrich the interpreted goal with constraints, edge cases and success \
             criteria. Report back with phase_completed=ENHANCE and payload.enhanced_goal."
        }
        Phase::Knowledge => {
            "Gather the knowledge the goal requires using the allowed research tools. \
             When you have enough, report back with phase_completed=KNOWLEDGE and \
             payload.knowledge_gathered."
        }
        Phase::Plan => {
            "Break the goal into a todo list. Mark delegable items with the meta-prompt \
             grammar below. Report back with phase_completed=PLAN and \
             payload.todos_with_metaprompts."
        }
        Phase::Execute => {
            "Work the current task only. Use exactly one tool per iteration, then report \
             back with phase_completed=EXECUTE, payload.execution_success and \
             payload.more_tasks_pending."
        }
        Phase::Verify => {
            "Check the completed work against the success criteria using read-only \
             tools. Report back with phase_completed=VERIFY, the final \
             payload.current_todos statuses and payload.verification_passed."
        }
        Phase::Done => "The objective is complete. No further tool calls are expected.",
    }
}

const META_PROMPT_GRAMMAR: &str = "Meta-prompt grammar for delegable todos — include, in any \
order: (ROLE: planner|coder|critic|researcher|analyzer|synthesizer|ui_architect|\
ui_implementer|ui_refiner) (CONTEXT: domain) (PROMPT: instruction) (OUTPUT: deliverable). \
Todos written this way spawn a fresh executor with that role via the Task tool.";

fn knowledge_context(session: &SessionRecord) -> String {
    let auto_ok = session
        .payload
        .get("auto_connection_metadata")
        .and_then(|m| m.get("successful"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if auto_ok {
        let metadata = &session.payload["auto_connection_metadata"];
        let sources = metadata
            .get("sources_used")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        let confidence = metadata
            .get("overall_confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let contradictions = metadata
            .get("contradictions")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let synthesized = payload_str(session, "synthesized_knowledge").unwrap_or_default();

        format!(
            "Automated knowledge gathering succeeded (confidence {confidence:.2}, \
             sources: {sources}, contradictions: {contradictions}). Review the synthesis \
             below, fill gaps with the allowed tools, then report back.\n\n{synthesized}"
        )
    } else {
        let manual: Vec<&str> = allowed_tools(Phase::Knowledge)
            .iter()
            .copied()
            .filter(|t| *t != "Task" && *t != "PythonComputationalTool")
            .collect();
        format!(
            "Automated knowledge gathering is unavailable for this run. Research manually \
             with: {}.",
            manual.join(", ")
        )
    }
}

fn execute_context(session: &SessionRecord) -> String {
    let todos = payload_todos(session);
    let index = session.current_task_index();
    let total = todos.len();
    let effectiveness_pct = (session.reasoning_effectiveness * 100.0).round();

    let current = todos
        .get(index)
        .map(|t| t.content.clone())
        .unwrap_or_else(|| "(no task at this index)".to_string());

    let mut block = format!(
        "Task {} of {total}: {current}\n\nReasoning effectiveness: {effectiveness_pct}%.",
        index + 1
    );
    if let Some(todo) = todos.get(index) {
        if let Some(mp) = &todo.meta_prompt {
            block.push_str(&format!(
                "\nThis task is delegable — spawn a {} agent via the Task tool with: {}",
                mp.role_specification, mp.instruction_block
            ));
        }
    }
    block.push_str(
        "\n\nUse a single tool per iteration: one focused action, observe the result, \
         then report back through the orchestrator.",
    );
    block
}

fn verify_context(session: &SessionRecord) -> String {
    let todos = payload_todos(session);
    let total = todos.len();
    let completed = todos
        .iter()
        .filter(|t| t.status == TodoStatus::Completed)
        .count();
    let critical_total = todos.iter().filter(|t| t.is_critical()).count();

    let mut block = format!(
        "Completion so far: {completed} of {total} tasks done, {critical_total} critical. \
         Verification requires: all critical tasks completed, at least 95% overall \
         completion, no pending high-priority or in-progress tasks, and reasoning \
         effectiveness of 0.7 or better."
    );

    if let Some(reason) = payload_str(session, "verification_failure_reason") {
        let pct = session
            .payload
            .get("last_completion_percentage")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        block.push_str(&format!(
            "\n\nPrevious verification failed at {pct}%: {reason}. Address this before \
             reporting back."
        ));
    }
    block
}

fn payload_str<'a>(session: &'a SessionRecord, key: &str) -> Option<&'a str> {
    session.payload.get(key).and_then(Value::as_str)
}

/// Todos as last stored by the engine (`current_todos`).
pub fn payload_todos(session: &SessionRecord) -> Vec<TodoItem> {
    session
        .payload
        .get("current_todos")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}
