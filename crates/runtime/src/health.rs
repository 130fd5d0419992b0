//! Runtime health snapshot
//!
//! Backs the HealthCheck tool and the `doctor` command: configuration
//! validity, tool registry shape, process memory and uptime, assembled
//! into one serializable report.

use crate::config::Config;
use crate::engine::allowed_tools;
use crate::types::Phase;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use sysinfo::{Pid, System};

/// Memory above this is reported as degraded.
const MEMORY_WARN_BYTES: u64 = 1_024 * 1_024 * 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: HealthStatus,
    pub detail: String,
}

impl CheckResult {
    fn healthy(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            detail: detail.into(),
        }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            detail: detail.into(),
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChecks {
    pub configuration: CheckResult,
    pub tool_registry: CheckResult,
    pub memory: CheckResult,
    pub process: CheckResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub response_time_ms: u64,
    pub version: String,
    pub checks: HealthChecks,
}

/// Run all checks and assemble the report. `started_at` is process
/// start; `version` comes from the binary's crate metadata.
pub fn health_check(config: &Config, started_at: Instant, version: &str) -> HealthReport {
    let check_start = Instant::now();

    let configuration = match config.validate() {
        Ok(()) => CheckResult::healthy(format!(
            "valid; auto-connection {}",
            if config.auto_connection_enabled {
                "enabled"
            } else {
                "disabled"
            }
        )),
        Err(e) => CheckResult::unhealthy(e.to_string()),
    };

    let tool_registry = check_tool_registry();
    let memory = check_memory();
    let process = CheckResult::healthy(format!("pid {}", std::process::id()));

    let status = [&configuration, &tool_registry, &memory, &process]
        .iter()
        .map(|c| c.status)
        .fold(HealthStatus::Healthy, worst);

    HealthReport {
        status,
        timestamp: Utc::now().to_rfc3339(),
        uptime_seconds: started_at.elapsed().as_secs(),
        response_time_ms: check_start.elapsed().as_millis() as u64,
        version: version.to_string(),
        checks: HealthChecks {
            configuration,
            tool_registry,
            memory,
            process,
        },
    }
}

fn worst(a: HealthStatus, b: HealthStatus) -> HealthStatus {
    use HealthStatus::*;
    match (a, b) {
        (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
        (Degraded, _) | (_, Degraded) => Degraded,
        _ => Healthy,
    }
}

/// Every non-terminal phase must whitelist at least one tool; DONE must
/// whitelist none.
fn check_tool_registry() -> CheckResult {
    for phase in Phase::ALL {
        let tools = allowed_tools(phase);
        if phase == Phase::Done {
            if !tools.is_empty() {
                return CheckResult::unhealthy("DONE phase whitelists tools");
            }
        } else if tools.is_empty() {
            return CheckResult::unhealthy(format!("{phase} phase whitelists no tools"));
        }
    }
    CheckResult::healthy("phase whitelists consistent")
}

fn check_memory() -> CheckResult {
    let mut system = System::new();
    let pid = Pid::from_u32(std::process::id());
    system.refresh_process(pid);
    match system.process(pid) {
        Some(process) => {
            let rss = process.memory();
            let detail = format!("rss {} MiB", rss / (1_024 * 1_024));
            if rss > MEMORY_WARN_BYTES {
                CheckResult::degraded(detail)
            } else {
                CheckResult::healthy(detail)
            }
        }
        None => CheckResult::degraded("process stats unavailable"),
    }
}
