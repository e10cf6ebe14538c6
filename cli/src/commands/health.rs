// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Health and growth commands
//!
//! Commands: snapshot, growth, milestones, watch

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use inkwell_cortex::domain::GrowthEvent;

use super::{open_cortex, print_json};

#[derive(Subcommand)]
pub enum HealthCommand {
    /// Pattern counts, memory count and graph status
    Snapshot,

    /// Activity and review trend over a recent window
    Growth {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },

    /// Milestone level and what the next one needs
    Milestones,

    /// Run the health monitor in the foreground and print growth events as
    /// they are logged (by any process) until interrupted
    Watch {
        /// Seconds between polls of the event log
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
}

pub async fn handle_command(command: HealthCommand, config_path: Option<PathBuf>) -> Result<()> {
    let cortex = open_cortex(config_path).await?;

    match command {
        HealthCommand::Snapshot => print_json(&cortex.get_health_snapshot().await),
        HealthCommand::Growth { days } => print_json(&cortex.get_growth_window(days).await),
        HealthCommand::Milestones => print_json(&cortex.get_milestones().await),
        HealthCommand::Watch { interval } => {
            let (monitor, handle) = cortex.spawn_health_monitor();
            let shutdown = monitor.shutdown_token();
            let mut cursor = EventCursor::new(Utc::now());
            let mut tick = tokio::time::interval(Duration::from_secs(interval.max(1)));
            eprintln!("{}", "Watching growth events, press Ctrl-C to stop".dimmed());

            loop {
                tokio::select! {
                    _ = tick.tick() => match cortex.events_since(cursor.since()).await {
                        Ok(events) => {
                            for event in cursor.advance(events) {
                                print_json(&event)?;
                            }
                        }
                        Err(e) => warn!(error = %e, "Reading growth events failed"),
                    },
                    _ = tokio::signal::ctrl_c() => {
                        shutdown.cancel();
                        break;
                    }
                }
            }

            handle.await?;
            if let Some(snapshot) = monitor.last_snapshot() {
                print_json(&snapshot)?;
            }
            Ok(())
        }
    }
}

/// Position in the growth event log. The log is read with an inclusive
/// lower bound, so events sharing the cursor timestamp that were already
/// returned are skipped on the next read.
struct EventCursor {
    since: DateTime<Utc>,
    seen_at_since: usize,
}

impl EventCursor {
    fn new(since: DateTime<Utc>) -> Self {
        Self { since, seen_at_since: 0 }
    }

    fn since(&self) -> DateTime<Utc> {
        self.since
    }

    /// Take a read ordered oldest first and return only the unseen events.
    fn advance(&mut self, events: Vec<GrowthEvent>) -> Vec<GrowthEvent> {
        let mut skip = self.seen_at_since;
        let since = self.since;
        let fresh: Vec<GrowthEvent> = events
            .into_iter()
            .filter(|e| {
                if e.event_date == since && skip > 0 {
                    skip -= 1;
                    return false;
                }
                true
            })
            .collect();

        if let Some(last) = fresh.last().map(|e| e.event_date) {
            let at_last = fresh.iter().filter(|e| e.event_date == last).count();
            self.seen_at_since = if last == since { self.seen_at_since + at_last } else { at_last };
            self.since = last;
        }
        fresh
    }
}
