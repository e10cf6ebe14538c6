// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Memory commands
//!
//! Commands: add

use anyhow::Result;
use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;

use super::{open_cortex, parse_json_object, print_json};

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Store a memory for the configured scope
    Add {
        text: String,

        /// Metadata as a JSON object
        #[arg(long)]
        meta: Option<String>,
    },
}

pub async fn handle_command(command: MemoryCommand, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        MemoryCommand::Add { text, meta } => {
            let metadata = parse_json_object(meta.as_deref())?;
            let cortex = open_cortex(config_path).await?;
            let id = cortex.add_memory(&text, metadata).await?;
            print_json(&json!({ "id": id }))
        }
    }
}
