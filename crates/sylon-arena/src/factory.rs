//! Arena factory
//!
//! Builds the next arena of the day from the number already created. The
//! factory never touches storage; the caller checks the daily quota and
//! persists the result (see `ArenaStore::create_arena_within_quota`).

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sylon_types::{Arena, ArenaCondition, ArenaId, ArenaStatus, ArenaType};

use crate::error::{ArenaError, ArenaResult};

const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M";

// ============================================================================
// Configuration
// ============================================================================

/// Which arena type fills each daily slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RotationPolicy {
    /// HIT_TARGET and STAY_ABOVE alternate; the last slot of the day is MACRO
    AlternateWithMacroFinal,
    /// Repeat the listed types in order
    Cycle { types: Vec<ArenaType> },
    /// Every slot gets the same type
    Fixed {
        #[serde(rename = "type")]
        arena_type: ArenaType,
    },
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::AlternateWithMacroFinal
    }
}

impl RotationPolicy {
    /// Type for the 1-based `slot` of a day holding `daily_limit` arenas
    pub fn type_for_slot(&self, slot: u32, daily_limit: u32) -> ArenaType {
        match self {
            Self::AlternateWithMacroFinal => {
                if slot >= daily_limit {
                    ArenaType::Macro
                } else if slot % 2 == 1 {
                    ArenaType::HitTarget
                } else {
                    ArenaType::StayAbove
                }
            }
            Self::Cycle { types } => {
                let index = slot.saturating_sub(1) as usize;
                types
                    .get(index % types.len().max(1))
                    .copied()
                    .unwrap_or(ArenaType::HitTarget)
            }
            Self::Fixed { arena_type } => *arena_type,
        }
    }
}

/// Arena factory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// Symbol priced by the oracle for price arenas
    #[serde(default = "default_asset")]
    pub asset: String,
    #[serde(default = "default_target_levels")]
    pub target_levels: Vec<Decimal>,
    #[serde(default = "default_floor_levels")]
    pub floor_levels: Vec<Decimal>,
    /// Question stems for MACRO arenas; the deadline is appended
    #[serde(default = "default_macro_questions")]
    pub macro_questions: Vec<String>,
    #[serde(default)]
    pub rotation: RotationPolicy,
    #[serde(default = "default_hit_target_days")]
    pub hit_target_days: i64,
    #[serde(default = "default_short_days")]
    pub stay_above_days: i64,
    #[serde(default = "default_short_days")]
    pub macro_days: i64,
}

fn default_asset() -> String {
    "BTC".to_string()
}

fn default_target_levels() -> Vec<Decimal> {
    [88000, 90000, 92000, 95000].into_iter().map(Decimal::from).collect()
}

fn default_floor_levels() -> Vec<Decimal> {
    [85000, 87500, 90000].into_iter().map(Decimal::from).collect()
}

fn default_macro_questions() -> Vec<String> {
    [
        "will the fed cut interest rates",
        "will spot eth etfs record net inflows for the week",
        "will us cpi come in below consensus",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_hit_target_days() -> i64 {
    3
}

fn default_short_days() -> i64 {
    2
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            asset: default_asset(),
            target_levels: default_target_levels(),
            floor_levels: default_floor_levels(),
            macro_questions: default_macro_questions(),
            rotation: RotationPolicy::default(),
            hit_target_days: default_hit_target_days(),
            stay_above_days: default_short_days(),
            macro_days: default_short_days(),
        }
    }
}

impl FactoryConfig {
    pub fn validate(&self) -> ArenaResult<()> {
        let invalid = |msg: &str| Err(ArenaError::InvalidConfig(msg.to_string()));

        if self.asset.trim().is_empty() {
            return invalid("asset must not be empty");
        }
        if self.target_levels.is_empty() {
            return invalid("target_levels must not be empty");
        }
        if self.floor_levels.is_empty() {
            return invalid("floor_levels must not be empty");
        }
        if self.macro_questions.is_empty() {
            return invalid("macro_questions must not be empty");
        }
        if let RotationPolicy::Cycle { types } = &self.rotation {
            if types.is_empty() {
                return invalid("rotation cycle must list at least one type");
            }
        }
        if self.hit_target_days <= 0 || self.stay_above_days <= 0 || self.macro_days <= 0 {
            return invalid("arena durations must be positive");
        }
        Ok(())
    }

    fn days_for(&self, arena_type: ArenaType) -> i64 {
        match arena_type {
            ArenaType::HitTarget => self.hit_target_days,
            ArenaType::StayAbove => self.stay_above_days,
            ArenaType::Macro => self.macro_days,
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Builds OPEN arenas
#[derive(Debug, Clone)]
pub struct ArenaFactory {
    config: FactoryConfig,
    daily_limit: u32,
}

impl ArenaFactory {
    pub fn new(config: FactoryConfig, daily_limit: u32) -> ArenaResult<Self> {
        config.validate()?;
        if daily_limit == 0 || daily_limit > ArenaId::MAX_SEQUENCE {
            return Err(ArenaError::InvalidConfig(format!(
                "daily arena limit must be between 1 and {}, got {daily_limit}",
                ArenaId::MAX_SEQUENCE
            )));
        }
        Ok(Self { config, daily_limit })
    }

    /// Build the arena for slot `created_today + 1`
    pub fn build<R: Rng + ?Sized>(&self, created_today: u32, now: DateTime<Utc>, rng: &mut R) -> Arena {
        let slot = created_today + 1;
        let arena_type = self.config.rotation.type_for_slot(slot, self.daily_limit);
        let deadline = now + Duration::days(self.config.days_for(arena_type));
        let asset = self.config.asset.to_lowercase();
        let when = deadline.format(DEADLINE_FORMAT);

        let (condition, question, rules) = match arena_type {
            ArenaType::HitTarget => {
                let target = pick(&self.config.target_levels, rng);
                (
                    ArenaCondition::HitTarget { target },
                    format!("will {asset} hit {target} usd before {when} utc?"),
                    format!(
                        "resolution rule: arena resolves YES if {asset} last traded price on \
                         binance reaches or exceeds the target before deadline."
                    ),
                )
            }
            ArenaType::StayAbove => {
                let floor = pick(&self.config.floor_levels, rng);
                (
                    ArenaCondition::StayAbove { floor },
                    format!("will {asset} stay above {floor} usd until {when} utc?"),
                    format!(
                        "resolution rule: arena resolves YES if {asset} last traded price on \
                         binance is at or above the floor at the deadline."
                    ),
                )
            }
            ArenaType::Macro => {
                let stem = pick(&self.config.macro_questions, rng);
                (
                    ArenaCondition::Macro,
                    format!("{stem} before {when} utc?"),
                    "resolution rule: arena is resolved by the operator against public \
                     reporting once the deadline passes."
                        .to_string(),
                )
            }
        };

        Arena {
            arena_id: ArenaId::for_slot(now.date_naive(), slot),
            condition,
            asset: arena_type.is_price_based().then(|| self.config.asset.to_uppercase()),
            question,
            rules,
            deadline,
            status: ArenaStatus::Open,
            outcome: None,
            resolved_price: None,
            created_at: now,
            resolved_at: None,
        }
    }
}

/// Uniform choice from a candidate set validated as non-empty
fn pick<T: Clone, R: Rng + ?Sized>(candidates: &[T], rng: &mut R) -> T {
    let index = rng.gen_range(0..candidates.len());
    candidates[index].clone()
}
