// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Inkwell CLI

pub mod config;
pub mod experience;
pub mod health;
pub mod memory;
pub mod pattern;
pub mod search;

pub use self::config::ConfigCommand;
pub use self::experience::ExperienceCommand;
pub use self::health::HealthCommand;
pub use self::memory::MemoryCommand;
pub use self::pattern::PatternCommand;
pub use self::search::SearchArgs;

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};

use inkwell_cortex::domain::cortex_config::CortexConfig;
use inkwell_cortex::infrastructure::build_cortex;
use inkwell_cortex::Cortex;

/// Discovery plus env overrides.
pub fn load_config(config_path: Option<PathBuf>) -> Result<CortexConfig> {
    CortexConfig::load_or_default(config_path).context("Failed to load configuration")
}

/// Each CLI call is its own process, so in-memory stores would forget every
/// write on exit. Commands therefore require a relational backend.
pub async fn open_cortex_with(config: &CortexConfig) -> Result<Cortex> {
    if config.spec.backends.relational.is_none() {
        anyhow::bail!(
            "No relational backend configured. Set spec.backends.relational.database_url \
             in the config file or INKWELL_DATABASE_URL"
        );
    }
    build_cortex(config).await.context("Failed to initialize cortex")
}

/// Load configuration and assemble the cortex.
pub async fn open_cortex(config_path: Option<PathBuf>) -> Result<Cortex> {
    open_cortex_with(&load_config(config_path)?).await
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a `--details` / `--meta` style argument. Must be a JSON object.
pub fn parse_json_object(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("Invalid JSON")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("Expected a JSON object, got {other}"),
    }
}
