// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Entities, value objects and the contracts the cortex depends on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pattern aggregate, audit records, filter trees, search
//!   envelopes, backend and repository traits, configuration

pub mod backend;
pub mod cortex_config;
pub mod error;
pub mod events;
pub mod filter;
pub mod pattern;
pub mod repository;
pub mod review;
pub mod search;

pub use backend::*;
pub use error::*;
pub use events::*;
pub use filter::*;
pub use pattern::*;
pub use repository::*;
pub use review::*;
pub use search::*;
