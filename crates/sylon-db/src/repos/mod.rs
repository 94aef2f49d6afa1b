//! Repository implementations
//!
//! Each repository is a set of functions over a `SqliteConnection`, so the
//! same query runs against a pooled connection or inside a `StoreTx`.

pub mod arena;
pub mod prediction;
pub mod user_stats;
