//! Delta hedging of a derivative position, plus derivative inventory
//! replenishment on the polling timer.

use super::Strategy;
use crate::config::Config;
use crate::engine::{ActionClass, EngineContext};
use crate::exchange::{
    BookUpdate, Fill, OrderRequest, OrderResponse, Side, VenueConnector, VenueError,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Step function from underlying price to derivative delta.
///
/// `deltas[i]` applies below `breakpoints[i]`; the last delta applies at or
/// above the last breakpoint. A price equal to a breakpoint belongs to the
/// band above it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaCurve {
    breakpoints: Vec<Decimal>,
    deltas: Vec<Decimal>,
}

impl DeltaCurve {
    pub fn new(breakpoints: Vec<Decimal>, deltas: Vec<Decimal>) -> Self {
        Self { breakpoints, deltas }
    }

    pub fn delta(&self, price: Decimal) -> Decimal {
        let band = self.breakpoints.partition_point(|b| *b <= price);
        self.deltas
            .get(band)
            .or_else(|| self.deltas.last())
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

/// A hedge or replenishment order that was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HedgeOrder {
    pub instrument: String,
    pub side: Side,
    pub price: Decimal,
    pub volume: i64,
    /// Position the order is meant to reach
    pub target: i64,
    /// Volume that traded on submission; the rest is cancelled
    pub filled: i64,
}

/// Keeps the hedge instrument's position at `-(derivative position × delta)`.
pub struct DeltaHedgeStrategy {
    /// Instrument whose mid price drives the delta
    underlying: String,
    derivative: String,
    hedge_instrument: String,
    curve: DeltaCurve,
    min_trade_size: i64,
    target_inventory: Option<i64>,
}

impl DeltaHedgeStrategy {
    pub fn new(
        underlying: impl Into<String>,
        derivative: impl Into<String>,
        hedge_instrument: impl Into<String>,
        curve: DeltaCurve,
        min_trade_size: i64,
        target_inventory: Option<i64>,
    ) -> Self {
        Self {
            underlying: underlying.into(),
            derivative: derivative.into(),
            hedge_instrument: hedge_instrument.into(),
            curve,
            min_trade_size,
            target_inventory,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let hedge = &config.hedge;
        Self::new(
            config.basket.synthetic.clone(),
            hedge.derivative.clone(),
            config.hedge_instrument(),
            DeltaCurve::new(hedge.breakpoints.clone(), hedge.deltas.clone()),
            hedge.min_trade_size,
            hedge.target_inventory,
        )
    }

    /// Hedge position wanted for `derivative_position` at `price`, kept
    /// inside ±`limit`.
    pub fn desired_hedge(&self, derivative_position: i64, price: Decimal, limit: i64) -> i64 {
        let delta = self.curve.delta(price);
        let hedge = Decimal::from(derivative_position)
            .checked_mul(delta)
            .map(|exposure| (-exposure).round());
        let desired = match hedge.and_then(|h| h.to_i64()) {
            Some(desired) => desired,
            // Out of range: saturate on the side the hedge points to.
            None if (derivative_position < 0) == delta.is_sign_negative() => -limit,
            None => limit,
        };
        desired.clamp(-limit, limit)
    }

    /// Bring the hedge position to its target if the difference is large
    /// enough and the hedge cooldown allows.
    pub async fn rehedge(
        &self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        now: DateTime<Utc>,
    ) -> Result<Option<HedgeOrder>> {
        let Some(mid) = ctx.market.get(&self.underlying).mid() else {
            return Ok(None);
        };

        let derivative_position = ctx.positions.get(&self.derivative);
        let current = ctx.positions.get(&self.hedge_instrument);
        let desired = self.desired_hedge(derivative_position, mid, ctx.positions.limit());
        let difference = desired - current;

        // A difference of exactly `min_trade_size` is traded.
        if difference.abs() < self.min_trade_size {
            return Ok(None);
        }

        if !ctx.gate.allowed(ActionClass::Hedge, now) {
            debug!(desired, current, "Hedge throttled");
            return Ok(None);
        }

        let side = if difference > 0 { Side::Buy } else { Side::Sell };
        let Some(price) = best_opposite(ctx, venue, &self.hedge_instrument, side).await? else {
            warn!(instrument = %self.hedge_instrument, %side, "No price to hedge against");
            return Ok(None);
        };

        if let Err(breach) = ctx.positions.check(&self.hedge_instrument, difference) {
            warn!(reason = %breach, "Hedge aborted: position limit");
            ctx.stats.limit_aborts += 1;
            return Ok(None);
        }

        ctx.gate.record_fired(ActionClass::Hedge, now);
        ctx.stats.hedge_orders += 1;

        let mut order = HedgeOrder {
            instrument: self.hedge_instrument.clone(),
            side,
            price,
            volume: difference.abs(),
            target: desired,
            filled: 0,
        };

        info!(
            instrument = %order.instrument,
            side = %order.side,
            volume = order.volume,
            price = %order.price,
            derivative_position,
            delta = %self.curve.delta(mid),
            current,
            desired,
            "Submitting hedge"
        );

        order.filled = submit(ctx, venue, &order)
            .await
            .context("Failed to submit hedge")?;
        Ok(Some(order))
    }

    /// Buy derivative inventory back up to the target at the best ask.
    pub async fn replenish(
        &self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        now: DateTime<Utc>,
    ) -> Result<Option<HedgeOrder>> {
        let Some(target) = self.target_inventory else {
            return Ok(None);
        };

        let position = ctx.positions.get(&self.derivative);
        let headroom = ctx.positions.limit() - position;
        let volume = (target - position).min(headroom);
        if volume <= 0 {
            return Ok(None);
        }

        if !ctx.gate.allowed(ActionClass::Replenish, now) {
            return Ok(None);
        }

        let Some(price) = best_opposite(ctx, venue, &self.derivative, Side::Buy).await? else {
            debug!(instrument = %self.derivative, "No ask to replenish from");
            return Ok(None);
        };

        ctx.gate.record_fired(ActionClass::Replenish, now);
        ctx.stats.replenish_orders += 1;

        let mut order = HedgeOrder {
            instrument: self.derivative.clone(),
            side: Side::Buy,
            price,
            volume,
            target,
            filled: 0,
        };

        info!(
            instrument = %order.instrument,
            volume,
            price = %price,
            position,
            target,
            "Replenishing inventory"
        );

        order.filled = submit(ctx, venue, &order)
            .await
            .context("Failed to submit replenishment")?;
        Ok(Some(order))
    }
}

/// Best price on the side an order of `side` would trade against: from the
/// pushed market state, or an on-demand book read when none was pushed.
async fn best_opposite(
    ctx: &EngineContext,
    venue: &dyn VenueConnector,
    instrument: &str,
    side: Side,
) -> Result<Option<Decimal>> {
    let quote = ctx.market.get(instrument);
    let pushed = match side {
        Side::Buy => quote.ask,
        Side::Sell => quote.bid,
    };
    if pushed.is_some() {
        return Ok(pushed);
    }

    let book = match venue.get_orderbook(instrument).await {
        Ok(book) => book,
        Err(VenueError::NoBook(_)) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read book for {}", instrument)),
    };

    Ok(match side {
        Side::Buy => book.best_ask(),
        Side::Sell => book.best_bid(),
    })
}

/// Send `order` and cancel whatever did not trade straight away, so the
/// ledger stays the only source of exposure for the next sizing.
///
/// Returns the filled volume.
async fn submit(
    ctx: &mut EngineContext,
    venue: &dyn VenueConnector,
    order: &HedgeOrder,
) -> Result<i64> {
    let request = OrderRequest::new(order.instrument.clone(), order.price, order.side, order.volume);
    let responses = venue.submit_orders(vec![request]).await?;

    let mut filled = 0;
    for response in responses {
        filled += response.filled_volume;
        cancel_remainder(ctx, venue, &order.instrument, &response).await;
    }
    Ok(filled)
}

async fn cancel_remainder(
    ctx: &mut EngineContext,
    venue: &dyn VenueConnector,
    instrument: &str,
    response: &OrderResponse,
) {
    if response.is_fully_filled() {
        return;
    }

    match venue.cancel_order(response.id).await {
        Ok(()) => {
            info!(
                instrument,
                order_id = response.id,
                requested = response.requested_volume,
                filled = response.filled_volume,
                "Cancelled hedge remnant"
            );
            ctx.stats.remnants_cancelled += 1;
        }
        Err(e) => {
            warn!(
                instrument,
                order_id = response.id,
                error = %e,
                "Failed to cancel hedge remnant"
            );
        }
    }
}

#[async_trait]
impl Strategy for DeltaHedgeStrategy {
    fn name(&self) -> &str {
        "delta_hedge"
    }

    async fn on_book_update(
        &mut self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        book: &BookUpdate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if book.instrument == self.underlying || book.instrument == self.hedge_instrument {
            self.rehedge(ctx, venue, now).await?;
        }
        Ok(())
    }

    async fn on_fill(
        &mut self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        fill: &Fill,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if fill.instrument == self.derivative {
            self.rehedge(ctx, venue, now).await?;
        }
        Ok(())
    }

    async fn on_timer(
        &mut self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.replenish(ctx, venue, now).await?;
        Ok(())
    }
}
