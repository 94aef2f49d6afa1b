//! Sylon Types - Canonical domain types for prediction arenas
//!
//! This crate contains the foundational types shared by the store, the
//! lifecycle engine and the server, with zero dependencies on other sylon
//! crates:
//!
//! - Arena identity (`ArenaId`, `SYLON-YYYYMMDD-NNN`)
//! - Arena shape (`ArenaType`, `ArenaCondition`, `ArenaStatus`, `Outcome`)
//! - Predictions and per-user accuracy stats
//! - Leaderboard rows
//!
//! # Invariants
//!
//! 1. An arena moves OPEN → RESOLVED exactly once and never back
//! 2. `resolved_at` is set iff the arena is RESOLVED
//! 3. HIT_TARGET carries a target, STAY_ABOVE a floor, MACRO neither
//! 4. `current_streak <= max_streak` and `wins + losses == total_predictions`

pub mod arena;
pub mod error;
pub mod prediction;
pub mod stats;

pub use arena::*;
pub use error::*;
pub use prediction::*;
pub use stats::*;

/// Prefix of every arena identifier
pub const ARENA_ID_PREFIX: &str = "SYLON";
