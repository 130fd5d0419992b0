//! Task-completion validation
//!
//! The quantitative gate VERIFY runs before a session may finish.
//! Rules are evaluated in order and the first failure wins; the
//! executor's own `verification_passed` claim is consistency-checked
//! but never sufficient on its own.

use crate::types::{TodoItem, TodoPriority, TodoStatus};
use serde::{Deserialize, Serialize};

/// Minimum reasoning effectiveness to pass verification.
pub const MIN_EFFECTIVENESS: f64 = 0.7;
/// Minimum overall completion percentage.
pub const MIN_COMPLETION_PCT: u32 = 95;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    /// First failing rule, when not passed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub completion_pct: u32,
    pub breakdown: StatusBreakdown,
    pub critical_total: usize,
    pub critical_done: usize,
}

/// Run the verification gate over the final todo list.
pub fn validate_completion(
    todos: &[TodoItem],
    reasoning_effectiveness: f64,
    claimed_pass: bool,
) -> ValidationOutcome {
    let mut breakdown = StatusBreakdown {
        total: todos.len(),
        ..StatusBreakdown::default()
    };
    for todo in todos {
        match todo.status {
            TodoStatus::Pending => breakdown.pending += 1,
            TodoStatus::InProgress => breakdown.in_progress += 1,
            TodoStatus::Completed => breakdown.completed += 1,
        }
    }

    let completion_pct = if breakdown.total == 0 {
        100
    } else {
        ((breakdown.completed as f64 / breakdown.total as f64) * 100.0).round() as u32
    };

    let critical: Vec<&TodoItem> = todos.iter().filter(|t| t.is_critical()).collect();
    let critical_total = critical.len();
    let critical_done = critical
        .iter()
        .filter(|t| t.status == TodoStatus::Completed)
        .count();

    let pending_high = todos
        .iter()
        .any(|t| t.status == TodoStatus::Pending && t.priority == TodoPriority::High);

    let reason = if critical_total > 0 && critical_done < critical_total {
        Some(format!(
            "critical tasks incomplete: {critical_done} of {critical_total} done"
        ))
    } else if completion_pct < MIN_COMPLETION_PCT {
        Some(format!(
            "completion {completion_pct}% is below the {MIN_COMPLETION_PCT}% threshold"
        ))
    } else if pending_high {
        Some("high-priority tasks still pending".to_string())
    } else if breakdown.in_progress > 0 {
        Some(format!("{} tasks still in progress", breakdown.in_progress))
    } else if reasoning_effectiveness < MIN_EFFECTIVENESS {
        Some(format!(
            "reasoning effectiveness {reasoning_effectiveness:.2} is below {MIN_EFFECTIVENESS}"
        ))
    } else if claimed_pass && critical_total > 0 && completion_pct < 100 {
        Some(format!(
            "verification claim inconsistent: {critical_total} critical tasks but completion is {completion_pct}%"
        ))
    } else {
        None
    };

    ValidationOutcome {
        passed: reason.is_none(),
        reason,
        completion_pct,
        breakdown,
        critical_total,
        critical_done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn todo(id: &str, status: TodoStatus, priority: TodoPriority) -> TodoItem {
        TodoItem {
            status,
            priority,
            ..TodoItem::new(id, format!("task {id}"))
        }
    }

    fn completed(id: &str) -> TodoItem {
        todo(id, TodoStatus::Completed, TodoPriority::Medium)
    }

    #[test]
    fn empty_todo_list_passes_at_full_completion() {
        let outcome = validate_completion(&[], 0.8, false);
        assert!(outcome.passed);
        assert_eq!(outcome.completion_pct, 100);
    }

    #[test]
    fn all_complete_and_effective_passes() {
        let todos = vec![completed("1"), completed("2"), completed("3")];
        let outcome = validate_completion(&todos, 0.8, false);
        assert!(outcome.passed);
        assert!(outcome.reason.is_none());
    }

    #[test]
    fn incomplete_critical_fails_first() {
        let todos = vec![
            todo("1", TodoStatus::Pending, TodoPriority::High),
            completed("2"),
        ];
        let outcome = validate_completion(&todos, 0.9, false);
        assert!(!outcome.passed);
        assert!(outcome.reason.unwrap().contains("critical"));
        assert_eq!(outcome.critical_total, 1);
        assert_eq!(outcome.critical_done, 0);
    }

    #[test]
    fn low_completion_cites_the_threshold() {
        // 2 of 5 complete → 40%; nothing is critical.
        let todos = vec![
            completed("1"),
            completed("2"),
            todo("3", TodoStatus::Pending, TodoPriority::Medium),
            todo("4", TodoStatus::Pending, TodoPriority::Low),
            todo("5", TodoStatus::Pending, TodoPriority::Medium),
        ];
        let outcome = validate_completion(&todos, 0.8, false);
        assert!(!outcome.passed);
        assert_eq!(outcome.completion_pct, 40);
        assert!(outcome.reason.unwrap().contains("95%"));
    }

    #[test]
    fn in_progress_tasks_block_completion() {
        // 19 of 20 complete rounds to 95%, but one is still running.
        let mut todos: Vec<TodoItem> = (0..19).map(|i| completed(&i.to_string())).collect();
        todos.push(todo("19", TodoStatus::InProgress, TodoPriority::Low));
        let outcome = validate_completion(&todos, 0.9, false);
        assert!(!outcome.passed);
        assert!(outcome.reason.unwrap().contains("in progress"));
    }

    #[test]
    fn low_effectiveness_blocks_completion() {
        let todos = vec![completed("1")];
        let outcome = validate_completion(&todos, 0.5, false);
        assert!(!outcome.passed);
        assert!(outcome.reason.unwrap().contains("effectiveness"));
    }

    #[test]
    fn inconsistent_executor_claim_is_flagged() {
        // 39 of 40 done (98%) clears rules 1-5; the one critical task
        // is completed and the open task is low priority, so only the
        // consistency rule can fire.
        let mut todos: Vec<TodoItem> = (0..39).map(|i| completed(&i.to_string())).collect();
        todos[0].priority = TodoPriority::High; // critical and completed
        todos.push(todo("39", TodoStatus::Pending, TodoPriority::Low));
        let outcome = validate_completion(&todos, 0.9, true);
        assert!(!outcome.passed);
        assert!(outcome.reason.unwrap().contains("inconsistent"));

        // Without the executor claim the same state passes.
        let outcome = validate_completion(&todos, 0.9, false);
        assert!(outcome.passed, "reason: {:?}", outcome.reason);
    }

    #[test]
    fn metaprompt_todos_count_as_critical() {
        let mut t = completed("1");
        t.meta_prompt = crate::engine::metaprompt::extract_meta_prompt(
            "(ROLE: coder) (PROMPT: build it)",
        );
        let outcome = validate_completion(&[t], 0.9, false);
        assert_eq!(outcome.critical_total, 1);
        assert_eq!(outcome.critical_done, 1);
        assert!(outcome.passed);
    }
}
