#![allow(clippy::multiple_crate_versions)]

use clap::{Arg, ArgAction, Command};
use iron_manus_runtime::Config;

mod commands;
mod mcp_server;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let matches = Command::new("iron-manus")
        .version(VERSION)
        .about("Iron Manus - agent orchestration MCP server")
        .subcommand(
            Command::new("serve")
                .about("Start the MCP server on stdio (default when no subcommand is given)"),
        )
        .subcommand(
            Command::new("doctor")
                .about("Run the health checks locally and print the report")
                .arg(
                    Arg::new("detailed")
                        .long("detailed")
                        .action(ArgAction::SetTrue)
                        .help("Include the active configuration snapshot"),
                ),
        )
        .get_matches();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    match matches.subcommand() {
        Some(("doctor", sub)) => {
            commands::doctor::run(&config, sub.get_flag("detailed")).await;
        }
        _ => {
            // stdout is the MCP transport channel; logs go to stderr.
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::WARN.into()),
                )
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .init();

            if let Err(e) = mcp_server::start_mcp_server(config).await {
                eprintln!("MCP server failed: {e}");
                std::process::exit(1);
            }
        }
    }
}
