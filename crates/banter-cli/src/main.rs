//! banter CLI entry point.
//!
//! Binary name: `banter`
//!
//! Parses CLI arguments, loads and validates configuration, then either
//! runs the preflight check or starts the local REPL chat loop.

mod check;
mod repl;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use banter_observe::tracing_setup::{init_tracing, shutdown_tracing};

#[derive(Parser)]
#[command(
    name = "banter",
    about = "A chat bot that bridges group messaging with a text-generation backend",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "banter.toml")]
    config: PathBuf,

    /// Emit machine-readable JSON where a command supports it.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration, templates, and the prompt budget.
    Check,
    /// Chat with the bot locally over stdin/stdout.
    Repl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = banter_infra::config::load_config(&cli.config).await?;
    init_tracing(config.log.format, config.log.otel).map_err(|err| anyhow::anyhow!(err.to_string()))?;

    let result = match cli.command {
        Commands::Check => check::run(&config, cli.json),
        Commands::Repl => repl::run(config).await,
    };

    shutdown_tracing();
    result
}
