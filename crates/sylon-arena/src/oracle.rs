//! Oracles
//!
//! Two layers:
//!
//! - [`PriceOracle`] answers "what is the price of this symbol right now".
//!   [`BinancePriceOracle`] is the production implementation.
//! - [`ArenaOracle`] answers "how does this arena resolve". One is registered
//!   per [`ArenaType`] in an [`OracleRegistry`]; the resolution engine only
//!   ever talks to the registry, so a new arena type needs a new oracle and
//!   nothing else.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sylon_types::{Arena, ArenaType, Outcome};
use tracing::debug;

use crate::error::{ArenaError, ArenaResult, OracleError};

// ============================================================================
// Price Oracle
// ============================================================================

/// Source of spot prices for price-based arenas
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current price of `symbol` (e.g. `BTC`) in the quote currency
    async fn get_price(&self, symbol: &str) -> Result<Decimal, OracleError>;
}

/// Price oracle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Quote currency appended to the symbol (`BTC` + `USDT`)
    #[serde(default = "default_quote")]
    pub quote: String,
    /// HTTP client timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_quote() -> String {
    "USDT".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            quote: default_quote(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

/// Last traded price from Binance's public ticker endpoint
pub struct BinancePriceOracle {
    client: reqwest::Client,
    base_url: String,
    quote: String,
}

impl BinancePriceOracle {
    pub fn new(settings: &OracleSettings) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            quote: settings.quote.to_uppercase(),
        })
    }

    fn pair(&self, symbol: &str) -> String {
        format!("{}{}", symbol.to_uppercase(), self.quote)
    }
}

#[async_trait]
impl PriceOracle for BinancePriceOracle {
    async fn get_price(&self, symbol: &str) -> Result<Decimal, OracleError> {
        let pair = self.pair(symbol);
        let url = format!("{}/api/v3/ticker/price", self.base_url);

        let response = self.client.get(&url).query(&[("symbol", &pair)]).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        let ticker: TickerPrice = response.json().await?;
        let price = Decimal::from_str(&ticker.price)
            .map_err(|e| OracleError::Malformed(format!("price {:?}: {}", ticker.price, e)))?;

        debug!(symbol = %ticker.symbol, %price, "Fetched ticker price");
        Ok(price)
    }
}

// ============================================================================
// Arena Oracles
// ============================================================================

/// What an oracle decided about an expired arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Decided {
        outcome: Outcome,
        resolved_price: Option<Decimal>,
    },
    /// No automatic answer; the arena stays OPEN until an operator resolves it
    AwaitingManual,
}

/// Resolution strategy for one arena type
#[async_trait]
pub trait ArenaOracle: Send + Sync {
    async fn decide(&self, arena: &Arena) -> ArenaResult<Verdict>;

    /// Arenas of this type may be resolved through the manual path
    fn is_manual(&self) -> bool {
        false
    }
}

/// Compares the asset's current price to the arena threshold
pub struct PriceThresholdOracle {
    prices: Arc<dyn PriceOracle>,
}

impl PriceThresholdOracle {
    pub fn new(prices: Arc<dyn PriceOracle>) -> Self {
        Self { prices }
    }
}

#[async_trait]
impl ArenaOracle for PriceThresholdOracle {
    async fn decide(&self, arena: &Arena) -> ArenaResult<Verdict> {
        let asset = arena
            .asset
            .as_deref()
            .ok_or_else(|| ArenaError::InvalidArena(format!("{} has no asset", arena.arena_id)))?;

        let price = self.prices.get_price(asset).await?;
        let outcome = arena.condition.evaluate(price).ok_or_else(|| {
            ArenaError::InvalidArena(format!("{} has no price threshold", arena.arena_id))
        })?;

        Ok(Verdict::Decided {
            outcome,
            resolved_price: Some(price),
        })
    }
}

/// Operator-confirmed arenas
pub struct ManualOracle;

#[async_trait]
impl ArenaOracle for ManualOracle {
    async fn decide(&self, _arena: &Arena) -> ArenaResult<Verdict> {
        Ok(Verdict::AwaitingManual)
    }

    fn is_manual(&self) -> bool {
        true
    }
}

/// Oracles keyed by arena type
#[derive(Clone, Default)]
pub struct OracleRegistry {
    oracles: HashMap<ArenaType, Arc<dyn ArenaOracle>>,
}

impl OracleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Price threshold oracle for the price types, manual for MACRO
    pub fn with_defaults(prices: Arc<dyn PriceOracle>) -> Self {
        let threshold: Arc<dyn ArenaOracle> = Arc::new(PriceThresholdOracle::new(prices));
        Self::new()
            .with(ArenaType::HitTarget, threshold.clone())
            .with(ArenaType::StayAbove, threshold)
            .with(ArenaType::Macro, Arc::new(ManualOracle))
    }

    pub fn with(mut self, arena_type: ArenaType, oracle: Arc<dyn ArenaOracle>) -> Self {
        self.register(arena_type, oracle);
        self
    }

    /// Register an oracle, replacing any previous one for the type
    pub fn register(&mut self, arena_type: ArenaType, oracle: Arc<dyn ArenaOracle>) {
        self.oracles.insert(arena_type, oracle);
    }

    pub fn get(&self, arena_type: ArenaType) -> Option<Arc<dyn ArenaOracle>> {
        self.oracles.get(&arena_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use sylon_types::{ArenaCondition, ArenaId, ArenaStatus};

    struct FixedPrice(Decimal);

    #[async_trait]
    impl PriceOracle for FixedPrice {
        async fn get_price(&self, _symbol: &str) -> Result<Decimal, OracleError> {
            Ok(self.0)
        }
    }

    fn arena(condition: ArenaCondition) -> Arena {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        Arena {
            arena_id: ArenaId::for_slot(at.date_naive(), 1),
            condition,
            asset: Some("BTC".to_string()),
            question: "q".to_string(),
            rules: "r".to_string(),
            deadline: at,
            status: ArenaStatus::Open,
            outcome: None,
            resolved_price: None,
            created_at: at,
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_threshold_oracle_uses_price() {
        let oracle = PriceThresholdOracle::new(Arc::new(FixedPrice(dec!(91000))));

        let verdict = oracle
            .decide(&arena(ArenaCondition::HitTarget { target: dec!(90000) }))
            .await
            .unwrap();
        assert_eq!(
            verdict,
            Verdict::Decided {
                outcome: Outcome::Yes,
                resolved_price: Some(dec!(91000)),
            }
        );

        let verdict = oracle
            .decide(&arena(ArenaCondition::StayAbove { floor: dec!(92000) }))
            .await
            .unwrap();
        assert!(matches!(verdict, Verdict::Decided { outcome: Outcome::No, .. }));
    }

    #[tokio::test]
    async fn test_threshold_oracle_rejects_macro() {
        let oracle = PriceThresholdOracle::new(Arc::new(FixedPrice(dec!(1))));
        let result = oracle.decide(&arena(ArenaCondition::Macro)).await;
        assert!(matches!(result, Err(ArenaError::InvalidArena(_))));
    }

    #[tokio::test]
    async fn test_manual_oracle_never_decides() {
        let verdict = ManualOracle.decide(&arena(ArenaCondition::Macro)).await.unwrap();
        assert_eq!(verdict, Verdict::AwaitingManual);
        assert!(ManualOracle.is_manual());
    }

    #[test]
    fn test_default_registry_covers_all_types() {
        let registry = OracleRegistry::with_defaults(Arc::new(FixedPrice(dec!(1))));
        assert_eq!(registry.len(), 3);
        for arena_type in ArenaType::all() {
            let oracle = registry.get(arena_type).unwrap();
            assert_eq!(oracle.is_manual(), arena_type == ArenaType::Macro);
        }
    }

    #[test]
    fn test_binance_pair() {
        let oracle = BinancePriceOracle::new(&OracleSettings::default()).unwrap();
        assert_eq!(oracle.pair("btc"), "BTCUSDT");
    }
}
