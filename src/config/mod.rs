//! Configuration management for the synthetic arbitrage engine.
//!
//! Loads settings from an optional `config.toml`, environment variables
//! (`SAE__SECTION__KEY`) and a `.env` file. Every value is static for the
//! lifetime of a run.

use anyhow::{Context, Result};
use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Venue endpoint and identity
    #[serde(default)]
    pub venue: VenueConfig,
    /// Synthetic instrument and its components
    #[serde(default)]
    pub basket: BasketConfig,
    /// Position limits and shared request spacing
    #[serde(default)]
    pub risk: RiskConfig,
    /// Arbitrage detection and execution
    #[serde(default)]
    pub arbitrage: ArbitrageConfig,
    /// Inventory-skewed quoting
    #[serde(default)]
    pub market_making: MarketMakingConfig,
    /// Delta hedging of the derivative instrument
    #[serde(default)]
    pub hedge: HedgeConfig,
    /// Runner settings
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Venue endpoint
    #[serde(default = "default_venue_url")]
    pub url: String,
    /// Account name; fills are attributed to us by comparing against it
    #[serde(default = "default_username")]
    pub username: String,
    /// Account password
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasketConfig {
    /// The exchange-traded synthetic product
    #[serde(default = "default_synthetic")]
    pub synthetic: String,
    /// Components whose prices sum to the synthetic's value
    #[serde(default = "default_components")]
    pub components: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Symmetric per-instrument position limit
    #[serde(default = "default_position_limit")]
    pub position_limit: i64,
    /// Distance from the limit at which quoting on the growing side stops
    #[serde(default = "default_position_buffer")]
    pub position_buffer: i64,
    /// Minimum spacing between any two outbound venue actions (0 = disabled)
    #[serde(default)]
    pub api_min_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageConfig {
    /// Minimum profit (in price units) before firing; absorbs slippage
    #[serde(default = "default_profit_margin")]
    pub profit_margin: Decimal,
    /// Volume per leg
    #[serde(default = "default_trade_volume")]
    pub trade_volume: i64,
    /// Minimum time between two arbitrage fires
    #[serde(default = "default_arbitrage_cooldown")]
    pub cooldown_ms: u64,
    /// Stop firing after this many arbitrage trades in one session
    #[serde(default)]
    pub max_fires: Option<u32>,
}

/// Externally supplied fair value for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairValue {
    pub instrument: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketMakingConfig {
    /// Full width between our bid and ask around the skewed center
    #[serde(default = "default_spread")]
    pub spread: Decimal,
    /// Price shift applied at a position equal to the limit
    #[serde(default = "default_skew_coefficient")]
    pub skew_coefficient: Decimal,
    /// Volume per quote
    #[serde(default = "default_quote_volume")]
    pub quote_volume: i64,
    /// Minimum time between two full requotes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
    /// Fair values; the synthetic's is derived from its components if absent
    #[serde(default = "default_fair_values")]
    pub fair_values: Vec<FairValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeConfig {
    /// Instrument whose delta is being offset
    #[serde(default = "default_derivative")]
    pub derivative: String,
    /// Instrument traded to offset it (defaults to the basket's synthetic)
    #[serde(default)]
    pub hedge_instrument: Option<String>,
    /// Ascending price breakpoints of the delta step function
    #[serde(default = "default_breakpoints")]
    pub breakpoints: Vec<Decimal>,
    /// Delta per price band; one more entry than `breakpoints`
    #[serde(default = "default_deltas")]
    pub deltas: Vec<Decimal>,
    /// Hedge differences smaller than this are ignored
    #[serde(default = "default_min_trade_size")]
    pub min_trade_size: i64,
    /// Minimum time between two hedge orders
    #[serde(default = "default_hedge_cooldown")]
    pub cooldown_ms: u64,
    /// Derivative inventory to maintain; replenishment is off when unset
    #[serde(default)]
    pub target_inventory: Option<i64>,
    /// Minimum time between two replenishment orders
    #[serde(default = "default_replenish_cooldown")]
    pub replenish_cooldown_ms: u64,
}

/// Which strategy the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Arbitrage,
    MarketMaker,
    Combined,
    DeltaHedge,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Arbitrage => write!(f, "arbitrage"),
            StrategyKind::MarketMaker => write!(f, "market_maker"),
            StrategyKind::Combined => write!(f, "combined"),
            StrategyKind::DeltaHedge => write!(f, "delta_hedge"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    /// Period of the polling timer that drives `on_timer`
    #[serde(default = "default_timer_interval")]
    pub timer_interval_ms: u64,
    /// Period of the ledger vs venue position reconciliation log
    #[serde(default = "default_status_interval")]
    pub status_interval_ms: u64,
}

// Default value functions
fn default_venue_url() -> String {
    "http://localhost:9000/".to_string()
}

fn default_username() -> String {
    "engine".to_string()
}

fn default_synthetic() -> String {
    "LON_ETF".to_string()
}

fn default_components() -> Vec<String> {
    vec![
        "TIDE_SPOT".to_string(),
        "WX_SPOT".to_string(),
        "LHR_COUNT".to_string(),
    ]
}

fn default_position_limit() -> i64 {
    100
}

fn default_position_buffer() -> i64 {
    10
}

fn default_profit_margin() -> Decimal {
    dec!(50)
}

fn default_trade_volume() -> i64 {
    1
}

fn default_arbitrage_cooldown() -> u64 {
    1500 // venue allows roughly one request per second
}

fn default_spread() -> Decimal {
    dec!(20)
}

fn default_skew_coefficient() -> Decimal {
    dec!(15)
}

fn default_quote_volume() -> i64 {
    10
}

fn default_refresh_interval() -> u64 {
    4000
}

fn default_fair_values() -> Vec<FairValue> {
    vec![
        FairValue {
            instrument: "WX_SPOT".to_string(),
            price: dec!(4556),
        },
        FairValue {
            instrument: "LHR_COUNT".to_string(),
            price: dec!(1250),
        },
        FairValue {
            instrument: "TIDE_SPOT".to_string(),
            price: dec!(2341),
        },
    ]
}

fn default_derivative() -> String {
    "LON_FLY".to_string()
}

fn default_breakpoints() -> Vec<Decimal> {
    vec![
        dec!(6200),
        dec!(6600),
        dec!(7000),
    ]
}

fn default_deltas() -> Vec<Decimal> {
    vec![
        dec!(-2),
        dec!(1),
        dec!(-1),
        dec!(2),
    ]
}

fn default_min_trade_size() -> i64 {
    1
}

fn default_hedge_cooldown() -> u64 {
    1000
}

fn default_replenish_cooldown() -> u64 {
    5000
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Combined
}

fn default_timer_interval() -> u64 {
    1000
}

fn default_status_interval() -> u64 {
    30_000
}

fn millis(ms: u64) -> Duration {
    Duration::milliseconds(ms as i64)
}

impl Config {
    /// Load configuration from environment variables and config files.
    ///
    /// `path` names a config file (without extension); `config` is tried when
    /// none is given and may be absent.
    pub fn load(path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(p) => config::File::with_name(p).required(true),
            None => config::File::with_name("config").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::default().separator("__").prefix("SAE"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.basket.components.is_empty(),
            "basket must have at least one component"
        );

        anyhow::ensure!(
            !self.basket.components.contains(&self.basket.synthetic),
            "synthetic {} cannot also be a component",
            self.basket.synthetic
        );

        anyhow::ensure!(
            self.risk.position_limit > 0,
            "position_limit must be positive"
        );

        anyhow::ensure!(
            self.risk.position_buffer >= 0 && self.risk.position_buffer < self.risk.position_limit,
            "position_buffer must be >= 0 and < position_limit"
        );

        anyhow::ensure!(
            self.arbitrage.profit_margin >= Decimal::ZERO,
            "profit_margin must not be negative"
        );

        anyhow::ensure!(
            self.arbitrage.trade_volume > 0
                && self.arbitrage.trade_volume <= self.risk.position_limit,
            "trade_volume must be > 0 and <= position_limit"
        );

        anyhow::ensure!(
            self.market_making.spread >= Decimal::ZERO,
            "spread must not be negative"
        );

        // A quote posted just inside the buffer must not be able to carry the
        // position past the limit when it fills.
        anyhow::ensure!(
            self.market_making.quote_volume > 0
                && self.market_making.quote_volume <= self.risk.position_buffer,
            "quote_volume must be > 0 and <= position_buffer"
        );

        anyhow::ensure!(
            self.hedge.deltas.len() == self.hedge.breakpoints.len() + 1,
            "hedge.deltas needs exactly one more entry than hedge.breakpoints"
        );

        anyhow::ensure!(
            self.hedge.breakpoints.windows(2).all(|w| w[0] < w[1]),
            "hedge.breakpoints must be strictly ascending"
        );

        anyhow::ensure!(
            self.hedge.min_trade_size > 0,
            "hedge.min_trade_size must be positive"
        );

        if let Some(target) = self.hedge.target_inventory {
            anyhow::ensure!(
                target.abs() <= self.risk.position_limit,
                "hedge.target_inventory must lie within the position limit"
            );
        }

        Ok(())
    }

    /// Every instrument the engine tracks quotes and positions for.
    pub fn watched_instruments(&self) -> Vec<String> {
        let mut instruments = vec![self.basket.synthetic.clone()];
        instruments.extend(self.basket.components.iter().cloned());

        if self.engine.strategy == StrategyKind::DeltaHedge {
            for instrument in [&self.hedge.derivative, &self.hedge_instrument()] {
                if !instruments.contains(instrument) {
                    instruments.push(instrument.clone());
                }
            }
        }

        instruments
    }

    /// The instrument traded to offset the derivative's delta.
    pub fn hedge_instrument(&self) -> String {
        self.hedge
            .hedge_instrument
            .clone()
            .unwrap_or_else(|| self.basket.synthetic.clone())
    }
}

impl RiskConfig {
    pub fn api_min_interval(&self) -> Duration {
        millis(self.api_min_interval_ms)
    }
}

impl ArbitrageConfig {
    pub fn cooldown(&self) -> Duration {
        millis(self.cooldown_ms)
    }
}

impl MarketMakingConfig {
    pub fn refresh_interval(&self) -> Duration {
        millis(self.refresh_interval_ms)
    }

    /// Look up a configured fair value.
    pub fn fair_value(&self, instrument: &str) -> Option<Decimal> {
        self.fair_values
            .iter()
            .find(|fv| fv.instrument == instrument)
            .map(|fv| fv.price)
    }
}

impl HedgeConfig {
    pub fn cooldown(&self) -> Duration {
        millis(self.cooldown_ms)
    }

    pub fn replenish_cooldown(&self) -> Duration {
        millis(self.replenish_cooldown_ms)
    }
}

impl EngineConfig {
    pub fn timer_interval(&self) -> Duration {
        millis(self.timer_interval_ms)
    }

    pub fn status_interval(&self) -> Duration {
        millis(self.status_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            venue: VenueConfig::default(),
            basket: BasketConfig::default(),
            risk: RiskConfig::default(),
            arbitrage: ArbitrageConfig::default(),
            market_making: MarketMakingConfig::default(),
            hedge: HedgeConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            url: default_venue_url(),
            username: default_username(),
            password: String::new(),
        }
    }
}

impl Default for BasketConfig {
    fn default() -> Self {
        Self {
            synthetic: default_synthetic(),
            components: default_components(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            position_limit: default_position_limit(),
            position_buffer: default_position_buffer(),
            api_min_interval_ms: 0,
        }
    }
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            profit_margin: default_profit_margin(),
            trade_volume: default_trade_volume(),
            cooldown_ms: default_arbitrage_cooldown(),
            max_fires: None,
        }
    }
}

impl Default for MarketMakingConfig {
    fn default() -> Self {
        Self {
            spread: default_spread(),
            skew_coefficient: default_skew_coefficient(),
            quote_volume: default_quote_volume(),
            refresh_interval_ms: default_refresh_interval(),
            fair_values: default_fair_values(),
        }
    }
}

impl Default for HedgeConfig {
    fn default() -> Self {
        Self {
            derivative: default_derivative(),
            hedge_instrument: None,
            breakpoints: default_breakpoints(),
            deltas: default_deltas(),
            min_trade_size: default_min_trade_size(),
            cooldown_ms: default_hedge_cooldown(),
            target_inventory: None,
            replenish_cooldown_ms: default_replenish_cooldown(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            timer_interval_ms: default_timer_interval(),
            status_interval_ms: default_status_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_quote_volume_larger_than_buffer_rejected() {
        let mut config = Config::default();
        config.market_making.quote_volume = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delta_table_shape_checked() {
        let mut config = Config::default();
        config.hedge.deltas.pop();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.hedge.breakpoints = vec![dec!(7000), dec!(6600), dec!(6200)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_synthetic_cannot_be_component() {
        let mut config = Config::default();
        config.basket.components.push("LON_ETF".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_watched_instruments_include_hedge_legs_only_for_delta_hedge() {
        let mut config = Config::default();
        assert_eq!(config.watched_instruments().len(), 4);

        config.engine.strategy = StrategyKind::DeltaHedge;
        let watched = config.watched_instruments();
        assert_eq!(watched.len(), 5);
        assert!(watched.contains(&"LON_FLY".to_string()));
    }

    #[test]
    fn test_fair_value_lookup() {
        let config = MarketMakingConfig::default();
        assert_eq!(config.fair_value("WX_SPOT"), Some(dec!(4556)));
        assert_eq!(config.fair_value("LON_ETF"), None);
    }
}
