//! Scheduler loop
//!
//! A single task owns arena creation and resolution. Each tick it creates
//! at most one arena (subject to the daily quota), repairs stats left
//! behind by an interrupted run, then sweeps expired arenas. Operator
//! commands arrive over an mpsc channel and are handled one at a time
//! between ticks.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sylon_db::ArenaStore;
use sylon_types::{Arena, ArenaId, LeaderboardEntry, Outcome, Prediction};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{ArenaError, ArenaResult};
use crate::factory::{ArenaFactory, FactoryConfig};
use crate::ledger::PredictionLedger;
use crate::oracle::OracleRegistry;
use crate::resolution::{ResolutionEngine, SweepReport};
use crate::stats::StatsAggregator;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_daily_arena_limit")]
    pub daily_arena_limit: u32,
    #[serde(default = "default_oracle_timeout")]
    pub oracle_timeout_secs: u64,
    /// Operator command queue depth
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

fn default_tick_interval() -> u64 {
    3600
}

fn default_daily_arena_limit() -> u32 {
    3
}

fn default_oracle_timeout() -> u64 {
    10
}

fn default_command_buffer() -> usize {
    64
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            daily_arena_limit: default_daily_arena_limit(),
            oracle_timeout_secs: default_oracle_timeout(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }
}

// ============================================================================
// Operator Commands
// ============================================================================

/// Request handled by the scheduler between ticks
#[derive(Debug)]
pub enum OperatorCommand {
    Predict {
        arena_id: String,
        username: String,
        prediction: String,
        reply: oneshot::Sender<ArenaResult<Prediction>>,
    },
    /// Manual resolution of an operator-confirmed arena
    Resolve {
        arena_id: String,
        outcome: String,
        reply: oneshot::Sender<ArenaResult<Arena>>,
    },
    Leaderboard {
        limit: u32,
        reply: oneshot::Sender<ArenaResult<Vec<LeaderboardEntry>>>,
    },
    GetArena {
        arena_id: String,
        reply: oneshot::Sender<ArenaResult<Arena>>,
    },
    ListOpen {
        reply: oneshot::Sender<ArenaResult<Vec<Arena>>>,
    },
}

/// Cloneable sender side of the operator command channel
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<OperatorCommand>,
}

impl SchedulerHandle {
    pub async fn predict(&self, arena_id: &str, username: &str, prediction: &str) -> ArenaResult<Prediction> {
        self.request(|reply| OperatorCommand::Predict {
            arena_id: arena_id.to_string(),
            username: username.to_string(),
            prediction: prediction.to_string(),
            reply,
        })
        .await
    }

    pub async fn resolve(&self, arena_id: &str, outcome: &str) -> ArenaResult<Arena> {
        self.request(|reply| OperatorCommand::Resolve {
            arena_id: arena_id.to_string(),
            outcome: outcome.to_string(),
            reply,
        })
        .await
    }

    pub async fn leaderboard(&self, limit: u32) -> ArenaResult<Vec<LeaderboardEntry>> {
        self.request(|reply| OperatorCommand::Leaderboard { limit, reply }).await
    }

    pub async fn get_arena(&self, arena_id: &str) -> ArenaResult<Arena> {
        self.request(|reply| OperatorCommand::GetArena {
            arena_id: arena_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn list_open(&self) -> ArenaResult<Vec<Arena>> {
        self.request(|reply| OperatorCommand::ListOpen { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<ArenaResult<T>>) -> OperatorCommand,
    ) -> ArenaResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ArenaError::SchedulerUnavailable)?;
        rx.await.map_err(|_| ArenaError::SchedulerUnavailable)?
    }
}

/// Operator command channel with the given queue depth
pub fn command_channel(buffer: usize) -> (SchedulerHandle, mpsc::Receiver<OperatorCommand>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (SchedulerHandle { tx }, rx)
}

// ============================================================================
// Scheduler
// ============================================================================

/// What one tick did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub created: Option<ArenaId>,
    pub repaired: usize,
    pub sweep: SweepReport,
}

pub struct Scheduler {
    store: ArenaStore,
    factory: ArenaFactory,
    ledger: PredictionLedger,
    engine: ResolutionEngine,
    stats: StatsAggregator,
    config: SchedulerConfig,
    rng: StdRng,
}

impl Scheduler {
    pub fn new(
        store: ArenaStore,
        factory_config: FactoryConfig,
        oracles: OracleRegistry,
        config: SchedulerConfig,
    ) -> ArenaResult<Self> {
        let factory = ArenaFactory::new(factory_config, config.daily_arena_limit)?;
        let engine = ResolutionEngine::new(store.clone(), oracles).with_oracle_timeout(config.oracle_timeout());

        Ok(Self {
            ledger: PredictionLedger::new(store.clone()),
            stats: StatsAggregator::new(store.clone()),
            store,
            factory,
            engine,
            config,
            rng: StdRng::from_entropy(),
        })
    }

    /// Seeded randomness for threshold selection
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Create one arena for `now`'s UTC day if the quota allows
    pub async fn create_if_under_quota(&mut self, now: DateTime<Utc>) -> ArenaResult<Option<Arena>> {
        let factory = &self.factory;
        let rng = &mut self.rng;
        let created = self
            .store
            .create_arena_within_quota(now.date_naive(), self.config.daily_arena_limit, |count| {
                factory.build(count, now, rng)
            })
            .await?;

        if let Some(arena) = &created {
            info!(
                arena_id = %arena.arena_id,
                arena_type = %arena.arena_type(),
                deadline = %arena.deadline,
                "Arena created"
            );
        }
        Ok(created)
    }

    /// One scheduling step: create, repair, sweep.
    ///
    /// Storage errors fail the tick; per-arena resolution failures do not.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> ArenaResult<TickReport> {
        let created = self.create_if_under_quota(now).await?.map(|a| a.arena_id);
        let repaired = self.stats.repair_pending(now).await?;
        let sweep = self.engine.sweep(now).await?;

        Ok(TickReport {
            created,
            repaired,
            sweep,
        })
    }

    /// Handle one operator command, replying on its oneshot
    pub async fn handle(&self, command: OperatorCommand, now: DateTime<Utc>) {
        let delivered = match command {
            OperatorCommand::Predict {
                arena_id,
                username,
                prediction,
                reply,
            } => {
                let result = self.ledger.submit(&arena_id, &username, &prediction, now).await;
                reply.send(result).is_ok()
            }
            OperatorCommand::Resolve {
                arena_id,
                outcome,
                reply,
            } => {
                let result = match parse_outcome(&outcome) {
                    Ok(outcome) => self.engine.resolve_manual(&arena_id, outcome, now).await,
                    Err(e) => Err(e),
                };
                reply.send(result).is_ok()
            }
            OperatorCommand::Leaderboard { limit, reply } => {
                let result = self.store.leaderboard(limit).await.map_err(ArenaError::from);
                reply.send(result).is_ok()
            }
            OperatorCommand::GetArena { arena_id, reply } => {
                let result = self.get_arena(&arena_id).await;
                reply.send(result).is_ok()
            }
            OperatorCommand::ListOpen { reply } => {
                let result = self.store.list_open_arenas().await.map_err(ArenaError::from);
                reply.send(result).is_ok()
            }
        };

        if !delivered {
            debug!("Operator command reply dropped by requester");
        }
    }

    async fn get_arena(&self, arena_id: &str) -> ArenaResult<Arena> {
        let id = ArenaId::parse(arena_id.trim()).map_err(|_| ArenaError::ArenaNotFound(arena_id.to_string()))?;
        self.store
            .get_arena(&id)
            .await?
            .ok_or_else(|| ArenaError::ArenaNotFound(id.to_string()))
    }

    /// Drive ticks and operator commands until `shutdown` completes.
    ///
    /// The first tick fires immediately. If every handle is dropped the loop
    /// keeps ticking without a command source.
    pub async fn run<S>(mut self, mut commands: mpsc::Receiver<OperatorCommand>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        tokio::pin!(shutdown);

        info!(
            tick_interval_secs = self.config.tick_interval_secs,
            daily_arena_limit = self.config.daily_arena_limit,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(report) => debug!(
                            created = ?report.created,
                            repaired = report.repaired,
                            resolved = report.sweep.resolved.len(),
                            deferred = report.sweep.deferred.len(),
                            "Tick complete"
                        ),
                        Err(e) => error!(error = %e, "Tick failed"),
                    }
                }
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(command) => self.handle(command, Utc::now()).await,
                        None => {
                            warn!("Operator command channel closed");
                            commands_open = false;
                        }
                    }
                }
            }
        }
    }
}

fn parse_outcome(value: &str) -> ArenaResult<Outcome> {
    value
        .trim()
        .to_uppercase()
        .parse()
        .map_err(|_| ArenaError::InvalidOutcome(value.to_string()))
}
