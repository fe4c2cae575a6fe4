//! Inventory-skewed two-sided quoting.
//!
//! Quotes are centred on an externally supplied fair value and shifted
//! against the current position, so a long book quotes lower (sells more
//! easily) and a short book quotes higher.

use super::Strategy;
use crate::config::Config;
use crate::engine::{ActionClass, EngineContext, PositionLedger};
use crate::exchange::{BookUpdate, OrderRequest, Side, VenueConnector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const REFRESH_CLASSES: [ActionClass; 2] = [ActionClass::QuoteRefresh, ActionClass::VenueRequest];

/// Skewed prices for one instrument and which sides may be posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkewedQuote {
    pub instrument: String,
    pub center: Decimal,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub post_bid: bool,
    pub post_ask: bool,
}

/// Computes maker quotes from fair values and inventory.
#[derive(Debug, Clone)]
pub struct MarketMakerQuoter {
    /// Instruments quoted, in posting order
    instruments: Vec<String>,
    fair_values: HashMap<String, Decimal>,
    spread: Decimal,
    skew_coefficient: Decimal,
    quote_volume: i64,
    position_buffer: i64,
}

impl MarketMakerQuoter {
    pub fn new(
        instruments: Vec<String>,
        fair_values: HashMap<String, Decimal>,
        spread: Decimal,
        skew_coefficient: Decimal,
        quote_volume: i64,
        position_buffer: i64,
    ) -> Self {
        Self {
            instruments,
            fair_values,
            spread,
            skew_coefficient,
            quote_volume,
            position_buffer,
        }
    }

    /// Quote the whole basket. The synthetic's fair value, when not
    /// configured, is the sum of its components' fair values.
    pub fn from_config(config: &Config) -> Self {
        let mm = &config.market_making;
        let basket = &config.basket;

        let mut fair_values: HashMap<String, Decimal> = mm
            .fair_values
            .iter()
            .map(|fv| (fv.instrument.clone(), fv.price))
            .collect();

        if !fair_values.contains_key(&basket.synthetic) {
            let derived: Option<Decimal> = basket
                .components
                .iter()
                .map(|c| fair_values.get(c).copied())
                .sum();
            if let Some(value) = derived {
                debug!(synthetic = %basket.synthetic, %value, "Derived synthetic fair value");
                fair_values.insert(basket.synthetic.clone(), value);
            }
        }

        let mut instruments = basket.components.clone();
        instruments.push(basket.synthetic.clone());
        instruments.retain(|instrument| {
            let known = fair_values.contains_key(instrument);
            if !known {
                warn!(%instrument, "No fair value configured; instrument will not be quoted");
            }
            known
        });

        Self::new(
            instruments,
            fair_values,
            mm.spread,
            mm.skew_coefficient,
            mm.quote_volume,
            config.risk.position_buffer,
        )
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    pub fn fair_value(&self, instrument: &str) -> Option<Decimal> {
        self.fair_values.get(instrument).copied()
    }

    /// Skewed quote for `instrument` at `position` against a ±`limit` book.
    ///
    /// `skew = position / limit * coefficient`, `center = fair - skew`; the bid
    /// is floored and the ask ceiled so rounding only ever widens the spread.
    pub fn quote(
        &self,
        instrument: &str,
        fair_value: Decimal,
        position: i64,
        limit: i64,
    ) -> SkewedQuote {
        let skew = if limit > 0 {
            Decimal::from(position) / Decimal::from(limit) * self.skew_coefficient
        } else {
            Decimal::ZERO
        };
        let center = fair_value - skew;
        let half_spread = self.spread / Decimal::TWO;

        let threshold = limit - self.position_buffer;

        SkewedQuote {
            instrument: instrument.to_string(),
            center,
            bid_price: (center - half_spread).floor(),
            ask_price: (center + half_spread).ceil(),
            post_bid: position < threshold && position + self.quote_volume <= limit,
            post_ask: position > -threshold && position - self.quote_volume >= -limit,
        }
    }

    /// Orders for a full requote at current positions.
    pub fn orders(&self, positions: &PositionLedger) -> Vec<OrderRequest> {
        let mut orders = Vec::new();

        for instrument in &self.instruments {
            let Some(fair_value) = self.fair_value(instrument) else {
                continue;
            };
            let position = positions.get(instrument);
            let quote = self.quote(instrument, fair_value, position, positions.limit());

            if quote.post_bid {
                orders.push(OrderRequest::new(
                    instrument.clone(),
                    quote.bid_price,
                    Side::Buy,
                    self.quote_volume,
                ));
            }
            if quote.post_ask {
                orders.push(OrderRequest::new(
                    instrument.clone(),
                    quote.ask_price,
                    Side::Sell,
                    self.quote_volume,
                ));
            }
        }

        orders
    }

    /// Cancel everything resting and post a fresh set of quotes, if the
    /// refresh cooldown allows. Returns whether a refresh happened.
    pub async fn refresh(
        &self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if !ctx.gate.allowed_all(&REFRESH_CLASSES, now) {
            return Ok(false);
        }

        let orders = self.orders(&ctx.positions);
        ctx.gate.record_all(&REFRESH_CLASSES, now);
        ctx.stats.quote_refreshes += 1;

        venue
            .cancel_all_orders()
            .await
            .context("Failed to cancel resting quotes")?;

        if orders.is_empty() {
            info!("All instruments at their buffer; no quotes posted");
            return Ok(true);
        }

        let count = orders.len();
        venue
            .submit_orders(orders)
            .await
            .context("Failed to post quotes")?;

        info!(orders = count, "Quotes refreshed");
        Ok(true)
    }
}

/// Market making only.
pub struct MarketMakerStrategy {
    quoter: MarketMakerQuoter,
}

impl MarketMakerStrategy {
    pub fn new(quoter: MarketMakerQuoter) -> Self {
        Self { quoter }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(MarketMakerQuoter::from_config(config))
    }
}

#[async_trait]
impl Strategy for MarketMakerStrategy {
    fn name(&self) -> &str {
        "market_maker"
    }

    async fn on_book_update(
        &mut self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        _book: &BookUpdate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.quoter.refresh(ctx, venue, now).await?;
        Ok(())
    }
}
