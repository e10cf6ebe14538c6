// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `inkwell search`

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use inkwell_cortex::application::SearchRequest;
use inkwell_cortex::domain::FilterExpr;

use super::{open_cortex, print_json};

#[derive(Args)]
pub struct SearchArgs {
    /// Free-text query
    pub query: String,

    /// Maximum memories returned
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Filter as JSON, e.g. '{"AND":[{"category":"openings"}]}'
    #[arg(long)]
    pub filter: Option<String>,

    /// Extra guidance for the reranker
    #[arg(long)]
    pub rerank_instruction: Option<String>,
}

pub async fn execute(args: SearchArgs, config_path: Option<PathBuf>) -> Result<()> {
    let cortex = open_cortex(config_path).await?;

    let mut request = SearchRequest::new(args.query);
    if let Some(limit) = args.limit {
        request = request.with_limit(limit);
    }
    if let Some(raw) = args.filter {
        let value: serde_json::Value = serde_json::from_str(&raw).context("Invalid --filter JSON")?;
        request = request.with_filter(FilterExpr::from_json(&value)?);
    }
    if let Some(instruction) = args.rerank_instruction {
        request = request.with_rerank_instruction(instruction);
    }

    let result = cortex.search(request).await?;
    print_json(&result)
}
