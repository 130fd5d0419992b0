//! Local health check, mirroring what the HealthCheck tool reports.

use iron_manus_runtime::health::{health_check, HealthStatus};
use iron_manus_runtime::Config;
use std::time::Instant;

pub async fn run(config: &Config, detailed: bool) {
    println!("🔍 Checking orchestrator health...\n");

    let report = health_check(config, Instant::now(), env!("CARGO_PKG_VERSION"));

    print_check("Configuration", &report.checks.configuration.detail, report.checks.configuration.status);
    print_check("Tool registry", &report.checks.tool_registry.detail, report.checks.tool_registry.status);
    print_check("Memory", &report.checks.memory.detail, report.checks.memory.status);
    print_check("Process", &report.checks.process.detail, report.checks.process.status);

    if detailed {
        match serde_json::to_string_pretty(config) {
            Ok(snapshot) => println!("\nActive configuration:\n{snapshot}"),
            Err(e) => println!("\nActive configuration unavailable: {e}"),
        }
    }

    println!();
    match report.status {
        HealthStatus::Healthy => println!("✅ All checks passed. Ready to run: iron-manus serve"),
        HealthStatus::Degraded => println!("⚠️  Degraded but serviceable; see the checks above."),
        HealthStatus::Unhealthy => {
            println!("❌ Unhealthy. Fix the failing checks before serving.");
            std::process::exit(1);
        }
    }
}

fn print_check(label: &str, detail: &str, status: HealthStatus) {
    let glyph = match status {
        HealthStatus::Healthy => "✓",
        HealthStatus::Degraded => "○",
        HealthStatus::Unhealthy => "✗",
    };
    println!("• {label}... {glyph} {detail}");
}
