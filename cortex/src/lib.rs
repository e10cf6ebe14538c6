// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inkwell Cortex
//!
//! Pattern confidence lifecycle and multi-source retrieval fusion for the
//! Inkwell writing assistant.
//!
//! # Architecture
//!
//! - **Layer:** Learning & Memory Layer
//! - **Purpose:** Grows confidence in writing patterns through reinforcement
//!   and serves them back through a fused search over semantic, relational
//!   and graph stores

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::*;
