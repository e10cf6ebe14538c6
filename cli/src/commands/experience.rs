// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Experience log commands
//!
//! Commands: record

use anyhow::Result;
use clap::Subcommand;
use std::path::PathBuf;

use super::{open_cortex, parse_json_object, print_json};

#[derive(Subcommand)]
pub enum ExperienceCommand {
    /// Record an experience (interview, workshop, reader feedback, ...)
    Record {
        topic: String,

        summary: String,

        /// Extra details as a JSON object
        #[arg(long)]
        details: Option<String>,
    },
}

pub async fn handle_command(command: ExperienceCommand, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        ExperienceCommand::Record { topic, summary, details } => {
            let details = parse_json_object(details.as_deref())?;
            let cortex = open_cortex(config_path).await?;
            print_json(&cortex.record_experience(&topic, &summary, details).await?)
        }
    }
}
