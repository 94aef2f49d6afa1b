//! Prediction types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ArenaId, Outcome};

/// A user's YES/NO call on an arena.
///
/// Keyed by `(arena_id, username)`; immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub arena_id: ArenaId,
    /// Lowercased, without a leading `@`
    pub username: String,
    pub prediction: Outcome,
    pub created_at: DateTime<Utc>,
}

impl Prediction {
    /// Whether this prediction matches the arena's outcome
    pub fn is_correct(&self, outcome: Outcome) -> bool {
        self.prediction == outcome
    }
}

/// Canonical form of a username: trimmed, `@` stripped, lowercased
pub fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').trim().to_lowercase()
}
