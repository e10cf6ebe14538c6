// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use inkwell_cortex::domain::cortex_config::{CortexConfig, HttpBackendConfig, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./inkwell-config.yaml)
        #[arg(short, long, default_value = "./inkwell-config.yaml")]
        output: PathBuf,

        /// Include every section with comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(&output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let mut config = CortexConfig::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "(not set)".to_string()).dimmed()
        );
        println!("  3. ./inkwell-config.yaml");
        println!("  4. ~/.inkwell/config.yaml");
        println!("  5. /etc/inkwell/config.yaml");
        println!();
    }

    redact(&mut config);
    println!("{}", "Current configuration:".bold());
    println!();
    print!("{}", serde_yaml::to_string(&config)?);

    Ok(())
}

/// Hide literal secrets; `env:` references are shown as written.
fn redact(config: &mut CortexConfig) {
    fn hide(value: &mut String) {
        if !value.starts_with("env:") {
            *value = "********".to_string();
        }
    }
    fn hide_backend(backend: &mut Option<HttpBackendConfig>) {
        if let Some(key) = backend.as_mut().and_then(|b| b.api_key.as_mut()) {
            hide(key);
        }
    }

    if let Some(relational) = config.spec.backends.relational.as_mut() {
        hide(&mut relational.database_url);
    }
    hide_backend(&mut config.spec.backends.graph);
    hide_backend(&mut config.spec.backends.reranker);
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = CortexConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: &Path, with_examples: bool) -> Result<()> {
    if with_examples {
        std::fs::write(output, include_str!("../../templates/config-with-examples.yaml"))
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    } else {
        CortexConfig::default()
            .to_yaml_file(output)
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    }

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());
    Ok(())
}
