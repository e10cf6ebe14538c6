// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Inkwell CLI
//!
//! The `inkwell` binary is a thin front end over the pattern cortex.
//!
//! ## Commands
//!
//! - `inkwell search <query>` - Fused search over every configured backend
//! - `inkwell memory add` - Store a memory in the semantic (and graph) store
//! - `inkwell pattern create|show|reinforce|outcome|stale|for-type` - Pattern lifecycle
//! - `inkwell experience record` - Log an experience for milestone tracking
//! - `inkwell health snapshot|growth|milestones|watch` - Growth summaries
//! - `inkwell config show|validate|generate` - Configuration management
//!
//! Data commands print JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use inkwell_cortex::domain::cortex_config::CortexConfig;

use inkwell_cli::commands::{self, ConfigCommand, ExperienceCommand, HealthCommand, MemoryCommand, PatternCommand, SearchArgs};

/// Inkwell - grow and reuse your writing patterns
#[derive(Parser)]
#[command(name = "inkwell")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "INKWELL_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error) [default: spec.logging.level or warn]
    #[arg(long, global = true, env = "INKWELL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json) [default: spec.logging.format or text]
    #[arg(long, global = true, env = "INKWELL_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search memories, patterns and relations
    #[command(name = "search")]
    Search(SearchArgs),

    /// Memory operations
    #[command(name = "memory")]
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },

    /// Pattern lifecycle operations
    #[command(name = "pattern")]
    Pattern {
        #[command(subcommand)]
        command: PatternCommand,
    },

    /// Experience log
    #[command(name = "experience")]
    Experience {
        #[command(subcommand)]
        command: ExperienceCommand,
    },

    /// Health and growth summaries
    #[command(name = "health")]
    Health {
        #[command(subcommand)]
        command: HealthCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logging settings from the config file apply unless given on the command line.
    let configured = CortexConfig::load_or_default(cli.config.clone())
        .ok()
        .and_then(|config| config.spec.logging);
    let level = cli
        .log_level
        .clone()
        .or_else(|| configured.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "warn".to_string());
    let format = cli
        .log_format
        .clone()
        .or_else(|| configured.as_ref().map(|l| l.format.clone()))
        .unwrap_or_else(|| "text".to_string());
    init_logging(&level, &format)?;

    match cli.command {
        Some(Commands::Search(args)) => commands::search::execute(args, cli.config).await,
        Some(Commands::Memory { command }) => commands::memory::handle_command(command, cli.config).await,
        Some(Commands::Pattern { command }) => commands::pattern::handle_command(command, cli.config).await,
        Some(Commands::Experience { command }) => commands::experience::handle_command(command, cli.config).await,
        Some(Commands::Health { command }) => commands::health::handle_command(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging. `RUST_LOG` wins over
/// `--log-level`.
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    match format {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init(),
        "text" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init(),
        other => anyhow::bail!("Unknown log format '{other}' (expected text or json)"),
    }

    Ok(())
}
