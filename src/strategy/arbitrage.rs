//! Synthetic-vs-components arbitrage detection.

use super::executor::{ArbitrageExecutor, ArbitrageOutcome};
use super::Strategy;
use crate::config::Config;
use crate::engine::{EngineContext, MarketState};
use crate::exchange::{BookUpdate, OrderRequest, Side, VenueConnector};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use tracing::{debug, info};

/// Which way the synthetic is mispriced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Synthetic bid above the components' summed ask: sell synthetic, buy components
    SellSynthetic,
    /// Components' summed bid above the synthetic ask: buy synthetic, sell components
    BuySynthetic,
}

impl Direction {
    pub fn synthetic_side(self) -> Side {
        match self {
            Direction::SellSynthetic => Side::Sell,
            Direction::BuySynthetic => Side::Buy,
        }
    }

    pub fn component_side(self) -> Side {
        self.synthetic_side().opposite()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::SellSynthetic => write!(f, "sell_synthetic"),
            Direction::BuySynthetic => write!(f, "buy_synthetic"),
        }
    }
}

/// A detected mispricing with the price of every leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opportunity {
    pub direction: Direction,
    pub synthetic: String,
    pub synthetic_price: Decimal,
    /// (component, price) in basket order
    pub component_prices: Vec<(String, Decimal)>,
    pub profit: Decimal,
}

impl Opportunity {
    /// One order per leg, synthetic first.
    pub fn legs(&self, volume: i64) -> Vec<OrderRequest> {
        let mut legs = Vec::with_capacity(self.component_prices.len() + 1);
        legs.push(OrderRequest::new(
            self.synthetic.clone(),
            self.synthetic_price,
            self.direction.synthetic_side(),
            volume,
        ));
        for (component, price) in &self.component_prices {
            legs.push(OrderRequest::new(
                component.clone(),
                *price,
                self.direction.component_side(),
                volume,
            ));
        }
        legs
    }
}

/// Compares the synthetic's quotes with the sum of its components' quotes.
#[derive(Debug, Clone)]
pub struct ArbitrageDetector {
    synthetic: String,
    components: Vec<String>,
    margin: Decimal,
}

impl ArbitrageDetector {
    pub fn new(synthetic: impl Into<String>, components: Vec<String>, margin: Decimal) -> Self {
        Self {
            synthetic: synthetic.into(),
            components,
            margin,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.basket.synthetic.clone(),
            config.basket.components.clone(),
            config.arbitrage.profit_margin,
        )
    }

    /// Evaluate the current market. Pure: the same state always gives the
    /// same answer.
    ///
    /// Any missing bid or ask on any leg means no opportunity. The overpriced
    /// case is checked first and wins if both would hold.
    pub fn evaluate(&self, market: &MarketState) -> Option<Opportunity> {
        let (synthetic_bid, synthetic_ask) = market.get(&self.synthetic).two_sided()?;

        let mut legs = Vec::with_capacity(self.components.len());
        for component in &self.components {
            let (bid, ask) = market.get(component).two_sided()?;
            legs.push((component.as_str(), bid, ask));
        }

        let basket_ask: Decimal = legs.iter().map(|(_, _, ask)| *ask).sum();
        let basket_bid: Decimal = legs.iter().map(|(_, bid, _)| *bid).sum();

        let overpriced = synthetic_bid - basket_ask;
        if overpriced > self.margin {
            return Some(Opportunity {
                direction: Direction::SellSynthetic,
                synthetic: self.synthetic.clone(),
                synthetic_price: synthetic_bid,
                component_prices: legs
                    .iter()
                    .map(|(name, _, ask)| (name.to_string(), *ask))
                    .collect(),
                profit: overpriced,
            });
        }

        let underpriced = basket_bid - synthetic_ask;
        if underpriced > self.margin {
            return Some(Opportunity {
                direction: Direction::BuySynthetic,
                synthetic: self.synthetic.clone(),
                synthetic_price: synthetic_ask,
                component_prices: legs
                    .iter()
                    .map(|(name, bid, _)| (name.to_string(), *bid))
                    .collect(),
                profit: underpriced,
            });
        }

        None
    }
}

/// Arbitrage only: detect on every book update and fire through the executor.
pub struct ArbitrageStrategy {
    detector: ArbitrageDetector,
    executor: ArbitrageExecutor,
}

impl ArbitrageStrategy {
    pub fn new(detector: ArbitrageDetector, executor: ArbitrageExecutor) -> Self {
        Self { detector, executor }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ArbitrageDetector::from_config(config),
            ArbitrageExecutor::from_config(config),
        )
    }

    pub fn executor(&self) -> &ArbitrageExecutor {
        &self.executor
    }

    /// Check the current market for a mispricing.
    pub fn detect(&self, market: &MarketState) -> Option<Opportunity> {
        let opportunity = self.detector.evaluate(market)?;
        info!(
            direction = %opportunity.direction,
            synthetic_price = %opportunity.synthetic_price,
            profit = %opportunity.profit,
            "Arbitrage opportunity detected"
        );
        Some(opportunity)
    }

    /// Run one detection/execution pass against the current market.
    pub async fn tick(
        &mut self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        now: DateTime<Utc>,
    ) -> Result<ArbitrageOutcome> {
        let Some(opportunity) = self.detect(&ctx.market) else {
            return Ok(ArbitrageOutcome::NoOpportunity);
        };
        self.fire(ctx, venue, &opportunity, now).await
    }

    /// Hand a detected opportunity to the executor.
    pub async fn fire(
        &mut self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        opportunity: &Opportunity,
        now: DateTime<Utc>,
    ) -> Result<ArbitrageOutcome> {
        let outcome = self.executor.execute(ctx, venue, opportunity, now).await?;
        if !outcome.fired() {
            debug!(outcome = ?outcome, "Arbitrage not fired");
        }
        Ok(outcome)
    }
}

#[async_trait]
impl Strategy for ArbitrageStrategy {
    fn name(&self) -> &str {
        "arbitrage"
    }

    async fn on_book_update(
        &mut self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        _book: &BookUpdate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.tick(ctx, venue, now).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const COMPONENTS: [&str; 3] = ["TIDE_SPOT", "WX_SPOT", "LHR_COUNT"];

    fn detector(margin: Decimal) -> ArbitrageDetector {
        ArbitrageDetector::new(
            "LON_ETF",
            COMPONENTS.iter().map(|c| c.to_string()).collect(),
            margin,
        )
    }

    fn market(synthetic: (Decimal, Decimal), component: (Decimal, Decimal)) -> MarketState {
        let mut market = MarketState::new(["LON_ETF", "TIDE_SPOT", "WX_SPOT", "LHR_COUNT"]);
        market.update("LON_ETF", Some(synthetic.0), Some(synthetic.1));
        for c in COMPONENTS {
            market.update(c, Some(component.0), Some(component.1));
        }
        market
    }

    // =========================================================================
    // Scenario tests
    // =========================================================================

    #[test]
    fn test_overpriced_synthetic_fires_sell_side() {
        let market = market((dec!(360), dec!(370)), (dec!(95), dec!(100)));
        let opportunity = detector(dec!(50)).evaluate(&market).unwrap();

        assert_eq!(opportunity.direction, Direction::SellSynthetic);
        assert_eq!(opportunity.profit, dec!(60));
        assert_eq!(opportunity.synthetic_price, dec!(360));
        assert!(opportunity.component_prices.iter().all(|(_, p)| *p == dec!(100)));
    }

    #[test]
    fn test_profit_not_above_margin_is_ignored() {
        let market = market((dec!(340), dec!(370)), (dec!(95), dec!(100)));
        assert_eq!(detector(dec!(50)).evaluate(&market), None);

        // Exactly at the margin is not enough either.
        let market = market_at_margin();
        assert_eq!(detector(dec!(50)).evaluate(&market), None);
    }

    fn market_at_margin() -> MarketState {
        market((dec!(350), dec!(370)), (dec!(95), dec!(100)))
    }

    #[test]
    fn test_underpriced_synthetic_fires_buy_side() {
        let market = market((dec!(200), dec!(220)), (dec!(95), dec!(100)));
        let opportunity = detector(dec!(50)).evaluate(&market).unwrap();

        assert_eq!(opportunity.direction, Direction::BuySynthetic);
        assert_eq!(opportunity.synthetic_price, dec!(220));
        assert_eq!(opportunity.profit, dec!(65));
        assert!(opportunity.component_prices.iter().all(|(_, p)| *p == dec!(95)));
    }

    #[test]
    fn test_crossed_market_only_fires_overpriced_case() {
        // Synthetic bid 400 over basket ask 300, and basket bid 330 over
        // synthetic ask 250: both cases hold.
        let market = market((dec!(400), dec!(250)), (dec!(110), dec!(100)));
        let opportunity = detector(dec!(50)).evaluate(&market).unwrap();
        assert_eq!(opportunity.direction, Direction::SellSynthetic);
    }

    #[test]
    fn test_missing_side_never_fires() {
        let mut market = market((dec!(360), dec!(370)), (dec!(95), dec!(100)));
        market.update("WX_SPOT", Some(dec!(95)), None);
        assert_eq!(detector(dec!(50)).evaluate(&market), None);

        let mut market = market_at_margin();
        market.update("LON_ETF", None, Some(dec!(100)));
        assert_eq!(detector(dec!(0)).evaluate(&market), None);

        let empty = MarketState::new(["LON_ETF"]);
        assert_eq!(detector(dec!(0)).evaluate(&empty), None);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let market = market((dec!(360), dec!(370)), (dec!(95), dec!(100)));
        let detector = detector(dec!(50));
        assert_eq!(detector.evaluate(&market), detector.evaluate(&market));
    }

    #[test]
    fn test_legs_synthetic_first_with_opposite_sides() {
        let market = market((dec!(360), dec!(370)), (dec!(95), dec!(100)));
        let legs = detector(dec!(50)).evaluate(&market).unwrap().legs(2);

        assert_eq!(legs.len(), 4);
        assert_eq!(legs[0].instrument, "LON_ETF");
        assert_eq!(legs[0].side, Side::Sell);
        assert_eq!(legs[0].price, dec!(360));
        assert!(legs[1..].iter().all(|l| l.side == Side::Buy && l.volume == 2));
        assert_eq!(legs[2].instrument, "WX_SPOT");
    }
}
