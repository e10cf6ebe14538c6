// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pattern lifecycle commands
//!
//! Commands: create, show, reinforce, outcome, stale, for-type
//!
//! Patterns are addressed by id or, case-insensitively, by name.

use anyhow::{anyhow, Result};
use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;

use inkwell_cortex::domain::{NewPattern, Pattern, PatternId};
use inkwell_cortex::Cortex;

use super::{load_config, open_cortex_with, print_json};

#[derive(Subcommand)]
pub enum PatternCommand {
    /// Record a new pattern (starts at LOW confidence)
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        topic: String,

        /// The technique itself
        #[arg(long)]
        text: String,

        /// Where the pattern was observed (repeatable)
        #[arg(long)]
        evidence: Vec<String>,

        /// What to avoid (repeatable)
        #[arg(long = "anti-pattern")]
        anti_patterns: Vec<String>,

        /// Restrict to content types (repeatable); universal when omitted
        #[arg(long = "content-type")]
        content_types: Vec<String>,
    },

    /// Show one pattern
    Show {
        /// Pattern id or name
        pattern: String,
    },

    /// Reinforce a pattern after it was used again
    Reinforce {
        /// Pattern id or name
        pattern: String,

        /// New evidence (repeatable)
        #[arg(long)]
        evidence: Vec<String>,
    },

    /// Report whether applying a pattern worked
    Outcome {
        /// Pattern id or name
        pattern: String,

        /// The pattern did not work this time
        #[arg(long)]
        failed: bool,
    },

    /// Patterns not reinforced recently
    Stale {
        /// Days without an update (default: spec.lifecycle.stale_days)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Patterns that apply to a content type, strongest first
    ForType {
        content_type: String,
    },
}

pub async fn handle_command(command: PatternCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let cortex = open_cortex_with(&config).await?;

    match command {
        PatternCommand::Create { name, topic, text, evidence, anti_patterns, content_types } => {
            let mut draft = NewPattern::new(name, topic, text);
            draft.evidence = evidence;
            draft.anti_patterns = anti_patterns;
            if !content_types.is_empty() {
                draft = draft.for_content_types(content_types);
            }
            print_json(&cortex.create_pattern(draft).await?)
        }
        PatternCommand::Show { pattern } => print_json(&resolve(&cortex, &pattern).await?),
        PatternCommand::Reinforce { pattern, evidence } => {
            let target = resolve(&cortex, &pattern).await?;
            let evidence = (!evidence.is_empty()).then_some(evidence);
            print_json(&cortex.reinforce_pattern(target.id, evidence).await?)
        }
        PatternCommand::Outcome { pattern, failed } => {
            let target = resolve(&cortex, &pattern).await?;
            print_json(&cortex.record_pattern_outcome(target.id, !failed).await?)
        }
        PatternCommand::Stale { days } => {
            let days = days.unwrap_or(config.spec.lifecycle.stale_days);
            let names = cortex.lifecycle().stale_patterns(days).await?;
            print_json(&json!({ "cutoff_days": days, "patterns": names }))
        }
        PatternCommand::ForType { content_type } => {
            print_json(&cortex.lifecycle().patterns_for_content_type(&content_type).await?)
        }
    }
}

/// Look up by id first, then by name.
async fn resolve(cortex: &Cortex, reference: &str) -> Result<Pattern> {
    if let Ok(id) = reference.parse::<PatternId>() {
        return Ok(cortex.get_pattern(id).await?);
    }
    cortex
        .lifecycle()
        .find_by_name(reference)
        .await?
        .ok_or_else(|| anyhow!("No pattern named '{reference}'"))
}
