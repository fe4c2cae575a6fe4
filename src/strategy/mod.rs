//! Trading strategies.
//!
//! Contains the decision logic for:
//! - Synthetic-vs-components arbitrage detection and execution
//! - Inventory-skewed two-sided quoting
//! - Delta hedging of a derivative position with inventory replenishment
//!
//! Every strategy implements [`Strategy`]; the engine calls it sequentially
//! from a single task, so handlers never run concurrently.

mod arbitrage;
mod combined;
mod executor;
mod hedge;
mod quoter;

pub use arbitrage::{ArbitrageDetector, ArbitrageStrategy, Direction, Opportunity};
pub use combined::CombinedStrategy;
pub use executor::{ArbitrageExecutor, ArbitrageOutcome, ExecutionReport};
pub use hedge::{DeltaCurve, DeltaHedgeStrategy, HedgeOrder};
pub use quoter::{MarketMakerQuoter, MarketMakerStrategy, SkewedQuote};

use crate::config::{Config, StrategyKind};
use crate::engine::EngineContext;
use crate::exchange::{BookUpdate, Fill, VenueConnector};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Callbacks a strategy receives from the engine.
///
/// Market state and positions are already updated when a callback runs.
#[async_trait]
pub trait Strategy: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// A book update for a watched instrument.
    async fn on_book_update(
        &mut self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        book: &BookUpdate,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// One of our own fills, after it was applied to the ledger.
    async fn on_fill(
        &mut self,
        _ctx: &mut EngineContext,
        _venue: &dyn VenueConnector,
        _fill: &Fill,
        _now: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }

    /// Periodic polling tick.
    async fn on_timer(
        &mut self,
        _ctx: &mut EngineContext,
        _venue: &dyn VenueConnector,
        _now: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Build the configured strategy.
pub fn build_strategy(config: &Config) -> Box<dyn Strategy> {
    match config.engine.strategy {
        StrategyKind::Arbitrage => Box::new(ArbitrageStrategy::from_config(config)),
        StrategyKind::MarketMaker => Box::new(MarketMakerStrategy::from_config(config)),
        StrategyKind::Combined => Box::new(CombinedStrategy::from_config(config)),
        StrategyKind::DeltaHedge => Box::new(DeltaHedgeStrategy::from_config(config)),
    }
}
