//! Arena types
//!
//! An arena is one yes/no question with a deadline and a resolution rule.
//! Price arenas are settled against an oracle price, macro arenas by an
//! operator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{TypesError, ARENA_ID_PREFIX};

// ============================================================================
// Arena Identity
// ============================================================================

/// Unique arena identifier of the form `SYLON-YYYYMMDD-NNN`.
///
/// The sequence number is the arena's slot within its UTC day, so ids sort
/// lexicographically in creation order within a day.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArenaId(String);

impl ArenaId {
    /// Largest sequence the three-digit suffix can hold
    pub const MAX_SEQUENCE: u32 = 999;

    /// Build the id for `sequence` (1-based) on `day`
    pub fn for_slot(day: NaiveDate, sequence: u32) -> Self {
        Self(format!("{}{:03}", Self::day_prefix(day), sequence))
    }

    /// The `SYLON-YYYYMMDD-` prefix shared by every arena created on `day`
    pub fn day_prefix(day: NaiveDate) -> String {
        format!("{}-{}-", ARENA_ID_PREFIX, day.format("%Y%m%d"))
    }

    /// Parse and validate an id string
    pub fn parse(s: &str) -> Result<Self, TypesError> {
        let invalid = || TypesError::InvalidArenaId(s.to_string());

        let mut parts = s.split('-');
        let (prefix, date, seq) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(d), Some(n), None) => (p, d, n),
            _ => return Err(invalid()),
        };

        if prefix != ARENA_ID_PREFIX || seq.len() != 3 || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;

        Ok(Self(s.to_string()))
    }

    /// UTC day encoded in the id
    pub fn day(&self) -> NaiveDate {
        // Validated on construction
        NaiveDate::parse_from_str(&self.0[6..14], "%Y%m%d").unwrap_or_default()
    }

    /// Daily sequence number encoded in the id
    pub fn sequence(&self) -> u32 {
        self.0[15..].parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ArenaId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ArenaId {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ArenaId> for String {
    fn from(id: ArenaId) -> Self {
        id.0
    }
}

// ============================================================================
// Arena Shape
// ============================================================================

/// Kind of arena; selects the oracle used at resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArenaType {
    /// Resolves YES if the oracle price is at or above the target
    HitTarget,
    /// Resolves YES if the oracle price is still at or above the floor
    StayAbove,
    /// Non-quantifiable claim, resolved by an operator
    Macro,
}

impl ArenaType {
    pub fn all() -> [ArenaType; 3] {
        [ArenaType::HitTarget, ArenaType::StayAbove, ArenaType::Macro]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArenaType::HitTarget => "HIT_TARGET",
            ArenaType::StayAbove => "STAY_ABOVE",
            ArenaType::Macro => "MACRO",
        }
    }

    /// Whether arenas of this type are settled against a price
    pub fn is_price_based(&self) -> bool {
        matches!(self, ArenaType::HitTarget | ArenaType::StayAbove)
    }
}

impl fmt::Display for ArenaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArenaType {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HIT_TARGET" => Ok(ArenaType::HitTarget),
            "STAY_ABOVE" => Ok(ArenaType::StayAbove),
            "MACRO" => Ok(ArenaType::Macro),
            other => Err(TypesError::UnknownArenaType(other.to_string())),
        }
    }
}

/// Arena type together with its threshold.
///
/// Keeping the threshold inside the variant means a HIT_TARGET arena always
/// has a target and never a floor, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArenaCondition {
    HitTarget { target: Decimal },
    StayAbove { floor: Decimal },
    Macro,
}

impl ArenaCondition {
    /// Rebuild a condition from its persisted columns
    pub fn from_parts(
        arena_type: ArenaType,
        target: Option<Decimal>,
        floor: Option<Decimal>,
    ) -> Result<Self, TypesError> {
        let inconsistent = |detail: &str| TypesError::InconsistentCondition {
            arena_type: arena_type.to_string(),
            detail: detail.to_string(),
        };

        match (arena_type, target, floor) {
            (ArenaType::HitTarget, Some(target), None) => Ok(Self::HitTarget { target }),
            (ArenaType::StayAbove, None, Some(floor)) => Ok(Self::StayAbove { floor }),
            (ArenaType::Macro, None, None) => Ok(Self::Macro),
            (ArenaType::HitTarget, _, _) => Err(inconsistent("requires a target and no floor")),
            (ArenaType::StayAbove, _, _) => Err(inconsistent("requires a floor and no target")),
            (ArenaType::Macro, _, _) => Err(inconsistent("takes no threshold")),
        }
    }

    pub fn arena_type(&self) -> ArenaType {
        match self {
            Self::HitTarget { .. } => ArenaType::HitTarget,
            Self::StayAbove { .. } => ArenaType::StayAbove,
            Self::Macro => ArenaType::Macro,
        }
    }

    pub fn target(&self) -> Option<Decimal> {
        match self {
            Self::HitTarget { target } => Some(*target),
            _ => None,
        }
    }

    pub fn floor(&self) -> Option<Decimal> {
        match self {
            Self::StayAbove { floor } => Some(*floor),
            _ => None,
        }
    }

    /// Outcome implied by an oracle price, or `None` for macro arenas
    pub fn evaluate(&self, price: Decimal) -> Option<Outcome> {
        let threshold = self.target().or(self.floor())?;
        Some(if price >= threshold { Outcome::Yes } else { Outcome::No })
    }
}

/// Lifecycle state of an arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArenaStatus {
    Open,
    Resolved,
}

impl ArenaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArenaStatus::Open => "OPEN",
            ArenaStatus::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for ArenaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArenaStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(ArenaStatus::Open),
            "RESOLVED" => Ok(ArenaStatus::Resolved),
            other => Err(TypesError::UnknownStatus(other.to_string())),
        }
    }
}

/// Answer to an arena question; also the value of a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "YES",
            Outcome::No => "NO",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YES" => Ok(Outcome::Yes),
            "NO" => Ok(Outcome::No),
            other => Err(TypesError::InvalidOutcome(other.to_string())),
        }
    }
}

// ============================================================================
// Arena
// ============================================================================

/// One prediction-market instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arena {
    pub arena_id: ArenaId,
    pub condition: ArenaCondition,
    /// Symbol priced by the oracle; `None` for macro arenas
    pub asset: Option<String>,
    pub question: String,
    pub rules: String,
    pub deadline: DateTime<Utc>,
    pub status: ArenaStatus,
    pub outcome: Option<Outcome>,
    /// Oracle price used for resolution (price arenas only)
    pub resolved_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Arena {
    pub fn arena_type(&self) -> ArenaType {
        self.condition.arena_type()
    }

    pub fn target(&self) -> Option<Decimal> {
        self.condition.target()
    }

    pub fn floor(&self) -> Option<Decimal> {
        self.condition.floor()
    }

    pub fn is_open(&self) -> bool {
        self.status == ArenaStatus::Open
    }

    /// Deadline reached; the arena is eligible for resolution
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline <= now
    }

    /// Predictions are accepted only while OPEN and before the deadline
    pub fn accepts_predictions(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && !self.is_expired(now)
    }
}
