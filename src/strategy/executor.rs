//! Arbitrage execution: pre-trade limit check, batch submission and
//! cancellation of unfilled remnants.

use super::arbitrage::{Direction, Opportunity};
use crate::config::Config;
use crate::engine::{ActionClass, EngineContext, LimitBreach};
use crate::exchange::{OrderId, OrderResponse, VenueConnector};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

const ARBITRAGE_CLASSES: [ActionClass; 2] = [ActionClass::Arbitrage, ActionClass::VenueRequest];

/// What happened to a detected opportunity.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbitrageOutcome {
    /// Legs were submitted
    Fired(ExecutionReport),
    /// Nothing to do this tick
    NoOpportunity,
    /// Cooldown has not elapsed
    Throttled,
    /// A leg would carry its position past the limit; nothing was sent
    LimitBlocked(LimitBreach),
    /// Session fire cap reached
    CapReached,
}

impl ArbitrageOutcome {
    pub fn fired(&self) -> bool {
        matches!(self, ArbitrageOutcome::Fired(_))
    }
}

/// Result of a fired arbitrage batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub direction: Direction,
    pub profit: Decimal,
    pub responses: Vec<OrderResponse>,
    /// Orders whose unfilled remainder was cancelled
    pub cancelled: Vec<OrderId>,
}

impl ExecutionReport {
    /// Every leg filled completely.
    pub fn fully_filled(&self) -> bool {
        self.responses.iter().all(OrderResponse::is_fully_filled)
    }
}

/// Turns opportunities into immediate-or-cancel style order batches.
#[derive(Debug, Clone)]
pub struct ArbitrageExecutor {
    trade_volume: i64,
    max_fires: Option<u32>,
    fires: u32,
}

impl ArbitrageExecutor {
    pub fn new(trade_volume: i64, max_fires: Option<u32>) -> Self {
        Self {
            trade_volume,
            max_fires,
            fires: 0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.arbitrage.trade_volume, config.arbitrage.max_fires)
    }

    /// Number of batches fired this session.
    pub fn fires(&self) -> u32 {
        self.fires
    }

    /// Whether the cooldown and the session cap would let a batch through
    /// at `now`. Position limits are checked separately in [`Self::execute`].
    pub fn ready(&self, ctx: &EngineContext, now: DateTime<Utc>) -> bool {
        ctx.gate.allowed_all(&ARBITRAGE_CLASSES, now)
            && self.max_fires.map_or(true, |cap| self.fires < cap)
    }

    /// Fire `opportunity` if the gate, the session cap and every leg's
    /// position limit allow it.
    ///
    /// Each leg is checked against the current ledger on its own since venue
    /// fills settle independently. The gate is recorded only once the batch
    /// is committed.
    pub async fn execute(
        &mut self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        opportunity: &Opportunity,
        now: DateTime<Utc>,
    ) -> Result<ArbitrageOutcome> {
        if !ctx.gate.allowed_all(&ARBITRAGE_CLASSES, now) {
            return Ok(ArbitrageOutcome::Throttled);
        }

        if let Some(cap) = self.max_fires {
            if self.fires >= cap {
                return Ok(ArbitrageOutcome::CapReached);
            }
        }

        let legs = opportunity.legs(self.trade_volume);
        for leg in &legs {
            if let Err(breach) = ctx.positions.check(&leg.instrument, leg.position_delta()) {
                warn!(
                    direction = %opportunity.direction,
                    reason = %breach,
                    "Arbitrage aborted: position limit"
                );
                ctx.stats.limit_aborts += 1;
                return Ok(ArbitrageOutcome::LimitBlocked(breach));
            }
        }

        ctx.gate.record_all(&ARBITRAGE_CLASSES, now);
        self.fires += 1;
        ctx.stats.arbitrage_fired += 1;

        info!(
            direction = %opportunity.direction,
            profit = %opportunity.profit,
            legs = legs.len(),
            volume = self.trade_volume,
            fire = self.fires,
            "Firing arbitrage"
        );

        let responses = venue
            .submit_orders(legs.clone())
            .await
            .context("Failed to submit arbitrage legs")?;

        let mut cancelled = Vec::new();
        for (leg, response) in legs.iter().zip(&responses) {
            if response.is_fully_filled() {
                continue;
            }

            match venue.cancel_order(response.id).await {
                Ok(()) => {
                    info!(
                        instrument = %leg.instrument,
                        order_id = response.id,
                        requested = response.requested_volume,
                        filled = response.filled_volume,
                        "Cancelled arbitrage remnant"
                    );
                    cancelled.push(response.id);
                    ctx.stats.remnants_cancelled += 1;
                }
                Err(e) => {
                    warn!(
                        instrument = %leg.instrument,
                        order_id = response.id,
                        error = %e,
                        "Failed to cancel arbitrage remnant"
                    );
                }
            }
        }

        Ok(ArbitrageOutcome::Fired(ExecutionReport {
            direction: opportunity.direction,
            profit: opportunity.profit,
            responses,
            cancelled,
        }))
    }
}
