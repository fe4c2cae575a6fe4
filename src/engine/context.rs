//! Per-run engine state handed to every strategy callback.

use super::gate::{ActionClass, ActionGate};
use super::market_state::MarketState;
use super::positions::PositionLedger;
use crate::config::Config;
use crate::exchange::Fill;
use serde::Serialize;
use tracing::warn;

/// Counters reported at shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub book_updates: u64,
    pub own_fills: u64,
    pub arbitrage_fired: u64,
    pub limit_aborts: u64,
    pub quote_refreshes: u64,
    pub hedge_orders: u64,
    pub replenish_orders: u64,
    pub remnants_cancelled: u64,
}

/// How a trade print relates to this account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillAttribution {
    /// We bought `volume`
    Bought(i64),
    /// We sold `volume`
    Sold(i64),
    /// We were both buyer and seller; net position change is zero
    SelfTrade,
    /// Someone else's trade
    NotOurs,
}

impl FillAttribution {
    /// Signed ledger change, if any.
    pub fn delta(self) -> Option<i64> {
        match self {
            FillAttribution::Bought(v) => Some(v),
            FillAttribution::Sold(v) => Some(-v),
            FillAttribution::SelfTrade | FillAttribution::NotOurs => None,
        }
    }
}

/// All mutable state of one strategy run. Owned by exactly one engine.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub identity: String,
    pub market: MarketState,
    pub positions: PositionLedger,
    pub gate: ActionGate,
    pub stats: EngineStats,
}

impl EngineContext {
    pub fn new(
        identity: impl Into<String>,
        market: MarketState,
        positions: PositionLedger,
        gate: ActionGate,
    ) -> Self {
        Self {
            identity: identity.into(),
            market,
            positions,
            gate,
            stats: EngineStats::default(),
        }
    }

    /// Build the context for a configured run: watched instruments, limit and
    /// every action class's cooldown.
    pub fn from_config(config: &Config) -> Self {
        let gate = ActionGate::new()
            .with_interval(ActionClass::Arbitrage, config.arbitrage.cooldown())
            .with_interval(ActionClass::QuoteRefresh, config.market_making.refresh_interval())
            .with_interval(ActionClass::Hedge, config.hedge.cooldown())
            .with_interval(ActionClass::Replenish, config.hedge.replenish_cooldown())
            .with_interval(ActionClass::VenueRequest, config.risk.api_min_interval());

        Self::new(
            config.venue.username.clone(),
            MarketState::new(config.watched_instruments()),
            PositionLedger::new(config.risk.position_limit),
            gate,
        )
    }

    /// Decide whether a trade print is ours by comparing identities.
    pub fn attribute(&self, fill: &Fill) -> FillAttribution {
        let bought = fill.buyer == self.identity;
        let sold = fill.seller == self.identity;

        match (bought, sold) {
            (true, true) => {
                warn!(
                    instrument = %fill.instrument,
                    volume = fill.volume,
                    "Self-trade print; position unchanged"
                );
                FillAttribution::SelfTrade
            }
            (true, false) => FillAttribution::Bought(fill.volume),
            (false, true) => FillAttribution::Sold(fill.volume),
            (false, false) => FillAttribution::NotOurs,
        }
    }
}
