//! ragqa CLI
//!
//! Main entry point for the ragqa command-line tool.
//! Answers open-domain questions with retrieval-augmented generation.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{AskCommand, DemoCommand, IndexCommand};
use ragqa_core::{config::AppConfig, logging};
use std::path::PathBuf;

/// ragqa - retrieval-augmented question answering
#[derive(Parser, Debug)]
#[command(name = "ragqa")]
#[command(about = "Retrieval-augmented question answering", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGQA_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGQA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Compute device (auto, cpu, accelerator)
    #[arg(short, long, global = true, env = "RAGQA_DEVICE")]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every model configuration on the demo questions
    Demo(DemoCommand),

    /// Answer questions with one model
    Ask(AskCommand),

    /// Passage index management
    Index(IndexCommand),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load(cli.workspace, cli.config)
        .context("Failed to load configuration")?
        .with_overrides(cli.log_level, cli.verbose, cli.no_color, cli.device);

    logging::init_logging(config.log_level.as_deref(), config.no_color)?;
    config.validate()?;

    tracing::info!("ragqa starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Device preference: {}", config.device);
    tracing::debug!(
        "Generator: {} ({})",
        config.generator.provider,
        config.generator.model
    );

    let command_name = match &cli.command {
        Commands::Demo(_) => "demo",
        Commands::Ask(_) => "ask",
        Commands::Index(_) => "index",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Demo(cmd) => cmd.execute(&config).await,
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Index(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    Ok(result?)
}
