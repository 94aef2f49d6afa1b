//! Sylon Arena - prediction arena lifecycle engine
//!
//! Recurring yes/no arenas with a deadline, resolved against a price oracle
//! or by an operator, with per-user accuracy and streak tracking.
//!
//! # Components
//!
//! - [`ArenaFactory`]: builds the next arena of the day from a rotation policy
//! - [`PredictionLedger`]: one immutable YES/NO call per user per arena
//! - [`ResolutionEngine`]: resolves expired arenas through type-keyed oracles
//! - [`StatsAggregator`]: folds outcomes into user stats exactly once
//! - [`Scheduler`]: the tick loop tying it together, plus operator commands
//!
//! Persistence lives in `sylon-db`; every component shares one
//! [`ArenaStore`](sylon_db::ArenaStore).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sylon_arena::{command_channel, BinancePriceOracle, OracleRegistry, Scheduler};
//!
//! let store = ArenaStore::connect(&DatabaseConfig::default()).await?;
//! let prices = Arc::new(BinancePriceOracle::new(&OracleSettings::default())?);
//! let scheduler = Scheduler::new(
//!     store,
//!     FactoryConfig::default(),
//!     OracleRegistry::with_defaults(prices),
//!     SchedulerConfig::default(),
//! )?;
//!
//! let (handle, commands) = command_channel(64);
//! tokio::spawn(scheduler.run(commands, shutdown_signal()));
//!
//! handle.predict("SYLON-20261019-001", "@alice", "yes").await?;
//! ```

pub mod error;
pub mod factory;
pub mod ledger;
pub mod oracle;
pub mod resolution;
pub mod scheduler;
pub mod stats;

pub use error::{ArenaError, ArenaResult, OracleError};
pub use factory::{ArenaFactory, FactoryConfig, RotationPolicy};
pub use ledger::{parse_prediction, PredictionLedger};
pub use oracle::{
    ArenaOracle, BinancePriceOracle, ManualOracle, OracleRegistry, OracleSettings, PriceOracle,
    PriceThresholdOracle, Verdict,
};
pub use resolution::{Resolution, ResolutionEngine, SweepReport, DEFAULT_ORACLE_TIMEOUT};
pub use scheduler::{command_channel, OperatorCommand, Scheduler, SchedulerConfig, SchedulerHandle, TickReport};
pub use stats::{StatsAggregator, StatsApplication};
