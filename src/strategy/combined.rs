//! Arbitrage first, quoting otherwise.

use super::arbitrage::ArbitrageStrategy;
use super::executor::ArbitrageOutcome;
use super::quoter::MarketMakerQuoter;
use super::Strategy;
use crate::config::Config;
use crate::engine::EngineContext;
use crate::exchange::{BookUpdate, VenueConnector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

/// Runs the arbitrage check on every book update; the quoter only gets a
/// turn when no arbitrage batch was fired on that tick.
///
/// Resting quotes are pulled before an arbitrage batch goes out, so the
/// batch's limit check against the ledger covers every live order.
pub struct CombinedStrategy {
    arbitrage: ArbitrageStrategy,
    quoter: MarketMakerQuoter,
    quotes_resting: bool,
}

impl CombinedStrategy {
    pub fn new(arbitrage: ArbitrageStrategy, quoter: MarketMakerQuoter) -> Self {
        Self {
            arbitrage,
            quoter,
            quotes_resting: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ArbitrageStrategy::from_config(config),
            MarketMakerQuoter::from_config(config),
        )
    }

    /// One tick: the arbitrage outcome and whether quotes were refreshed.
    pub async fn tick(
        &mut self,
        ctx: &mut EngineContext,
        venue: &dyn VenueConnector,
        now: DateTime<Utc>,
    ) -> Result<(ArbitrageOutcome, bool)> {
        let outcome = match self.arbitrage.detect(&ctx.market) {
            Some(opportunity) => {
                if self.quotes_resting && self.arbitrage.executor().ready(ctx, now) {
                    venue
                        .cancel_all_orders()
                        .await
                        .context("Failed to pull quotes before arbitrage")?;
                    self.quotes_resting = false;
                    info!("Pulled resting quotes ahead of arbitrage");
                }
                self.arbitrage.fire(ctx, venue, &opportunity, now).await?
            }
            None => ArbitrageOutcome::NoOpportunity,
        };
        if outcome.fired() {
            return Ok((outcome, false));
        }

        let refreshed = self.quoter.refresh(ctx, venue, now).await?;
        if refreshed {
            self.quotes_resting = true;
        }
        Ok((outcome, refreshed))
    }
}

#[async_trait]
impl Strategy for CombinedStrategy {
    fn name(&self) -> &str {
        "combined"
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
    use crate::engine::ActionClass;
    use crate::exchange::{PaperVenue, PriceLevel};
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn book(instrument: &str, bid: Decimal, ask: Decimal) -> BookUpdate {
        BookUpdate {
            instrument: instrument.to_string(),
            buy_levels: vec![PriceLevel::new(bid, 5)],
            sell_levels: vec![PriceLevel::new(ask, 5)],
        }
    }

    async fn seed(ctx: &mut EngineContext, venue: &PaperVenue, books: &[BookUpdate]) {
        for b in books {
            venue.apply_book(b).await;
            ctx.market.update(&b.instrument, b.best_bid(), b.best_ask());
        }
    }

    #[tokio::test]
    async fn test_fired_arbitrage_skips_quoting() {
        let config = Config::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let venue = PaperVenue::new(config.venue.username.clone(), tx);
        let mut ctx = EngineContext::from_config(&config);

        seed(
            &mut ctx,
            &venue,
            &[
                book("TIDE_SPOT", dec!(2300), dec!(2310)),
                book("WX_SPOT", dec!(4500), dec!(4510)),
                book("LHR_COUNT", dec!(1200), dec!(1210)),
                book("LON_ETF", dec!(8200), dec!(8210)),
            ],
        )
        .await;

        let mut strategy = CombinedStrategy::from_config(&config);
        let (outcome, refreshed) = strategy.tick(&mut ctx, &venue, t0()).await.unwrap();

        assert!(outcome.fired());
        assert!(!refreshed);
        assert_eq!(ctx.stats.quote_refreshes, 0);
        let (orders, fills, _) = venue.activity().await;
        assert_eq!(orders, 4);
        assert_eq!(fills, 4);
    }

    #[tokio::test]
    async fn test_quotes_when_no_arbitrage() {
        let config = Config::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let venue = PaperVenue::new(config.venue.username.clone(), tx);
        let mut ctx = EngineContext::from_config(&config);

        seed(
            &mut ctx,
            &venue,
            &[
                book("TIDE_SPOT", dec!(2320), dec!(2360)),
                book("WX_SPOT", dec!(4530), dec!(4580)),
                book("LHR_COUNT", dec!(1230), dec!(1270)),
                book("LON_ETF", dec!(8100), dec!(8200)),
            ],
        )
        .await;

        let mut strategy = CombinedStrategy::from_config(&config);
        let (outcome, refreshed) = strategy.tick(&mut ctx, &venue, t0()).await.unwrap();
        assert_eq!(outcome, ArbitrageOutcome::NoOpportunity);
        assert!(refreshed);

        // Eight quotes on four instruments, all resting away from the market.
        assert_eq!(venue.resting_orders().await.len(), 8);

        let (_, refreshed) = strategy
            .tick(&mut ctx, &venue, t0() + Duration::seconds(1))
            .await
            .unwrap();
        assert!(!refreshed);
    }

    #[tokio::test]
    async fn test_throttled_arbitrage_still_lets_quoter_run() {
        let config = Config::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let venue = PaperVenue::new(config.venue.username.clone(), tx);
        let mut ctx = EngineContext::from_config(&config);
        ctx.gate.record_fired(ActionClass::Arbitrage, t0());

        seed(
            &mut ctx,
            &venue,
            &[
                book("TIDE_SPOT", dec!(2300), dec!(2310)),
                book("WX_SPOT", dec!(4500), dec!(4510)),
                book("LHR_COUNT", dec!(1200), dec!(1210)),
                book("LON_ETF", dec!(8200), dec!(8210)),
            ],
        )
        .await;

        let mut strategy = CombinedStrategy::from_config(&config);
        let (outcome, refreshed) = strategy
            .tick(&mut ctx, &venue, t0() + Duration::milliseconds(500))
            .await
            .unwrap();

        assert_eq!(outcome, ArbitrageOutcome::Throttled);
        assert!(refreshed);
    }

    #[tokio::test]
    async fn test_resting_quotes_pulled_before_arbitrage_fires() {
        let config = Config::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let venue = PaperVenue::new(config.venue.username.clone(), tx);
        let mut ctx = EngineContext::from_config(&config);

        seed(
            &mut ctx,
            &venue,
            &[
                book("TIDE_SPOT", dec!(2320), dec!(2360)),
                book("WX_SPOT", dec!(4530), dec!(4580)),
                book("LHR_COUNT", dec!(1230), dec!(1270)),
                book("LON_ETF", dec!(8100), dec!(8200)),
            ],
        )
        .await;

        let mut strategy = CombinedStrategy::from_config(&config);
        strategy.tick(&mut ctx, &venue, t0()).await.unwrap();
        assert_eq!(venue.resting_orders().await.len(), 8);

        // Synthetic turns rich; the venue's own synthetic book is left as is
        // so the sell leg rests and is cancelled as a remnant.
        ctx.market.update("LON_ETF", Some(dec!(8400)), Some(dec!(8410)));
        let (outcome, refreshed) = strategy
            .tick(&mut ctx, &venue, t0() + Duration::seconds(1))
            .await
            .unwrap();

        assert!(outcome.fired());
        assert!(!refreshed);
        assert!(venue.resting_orders().await.is_empty());
        let (_, fills, cancels) = venue.activity().await;
        assert_eq!(fills, 3);
        // Eight quotes pulled plus the synthetic leg's remnant.
        assert_eq!(cancels, 9);
    }
}
