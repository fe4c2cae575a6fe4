//! Paper trading sessions: an [`Engine`] wired to a [`PaperVenue`].
//!
//! Two ways to drive it:
//! - [`PaperRunner::run`] streams a recording in real time and selects over
//!   market events, own fills, the polling timer and a shutdown signal.
//! - [`PaperRunner::replay`] runs a recording on a simulated clock taken from
//!   event timestamps; timers fire whenever simulated time crosses them.
//!
//! Both run on a single task, so handlers and the polling loop never overlap.

use super::{Engine, EngineStats};
use crate::config::Config;
use crate::exchange::{PaperVenue, ReplayFeed, TimedEvent, VenueEvent};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// An engine trading against an in-memory venue.
pub struct PaperRunner {
    engine: Engine,
    venue: Arc<PaperVenue>,
    fills: mpsc::UnboundedReceiver<TimedEvent>,
    timer_interval: Duration,
}

impl PaperRunner {
    pub fn new(config: &Config) -> Self {
        let (tx, fills) = mpsc::unbounded_channel();
        let venue = Arc::new(PaperVenue::new(config.venue.username.clone(), tx));
        let engine = Engine::from_config(config, venue.clone());

        Self {
            engine,
            venue,
            fills,
            timer_interval: config.engine.timer_interval(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn venue(&self) -> &PaperVenue {
        &self.venue
    }

    /// Run a recording on a simulated clock.
    ///
    /// Events without a timestamp take the current simulated time.
    pub async fn replay(&mut self, events: Vec<TimedEvent>) -> Result<EngineStats> {
        self.engine.bootstrap().await?;

        let total = events.len();
        let mut clock: Option<DateTime<Utc>> = None;
        let mut next_timer: Option<DateTime<Utc>> = None;

        for timed in events {
            let now = match (timed.at, clock) {
                (Some(at), Some(c)) => at.max(c),
                (Some(at), None) => at,
                (None, Some(c)) => c,
                (None, None) => Utc::now(),
            };
            clock = Some(now);

            let mut due = *next_timer.get_or_insert(now);
            while due <= now {
                self.tick(due).await;
                due += self.timer_interval.max(Duration::milliseconds(1));
            }
            next_timer = Some(due);

            self.dispatch(&timed.event, now).await;
        }

        self.engine.shutdown().await;
        let stats = self.engine.stats().clone();
        info!(events = total, stats = ?stats, "Replay finished");
        Ok(stats)
    }

    /// Stream `feed` in real time at `speed`x until it is exhausted or
    /// `shutdown` resolves, then cancel everything resting.
    pub async fn run<F>(mut self, feed: ReplayFeed, speed: f64, shutdown: F) -> Result<EngineStats>
    where
        F: Future<Output = ()>,
    {
        self.engine.bootstrap().await?;

        let (tx, mut market) = mpsc::unbounded_channel();
        let streamer = tokio::spawn(feed.stream(tx, speed));

        let period = self
            .timer_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(1));
        let mut timer = tokio::time::interval(period);
        tokio::pin!(shutdown);

        info!(strategy = self.engine.strategy_name(), "Paper session started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = market.recv() => match event {
                    Some(timed) => self.dispatch(&timed.event, Utc::now()).await,
                    None => {
                        info!("Market feed ended");
                        break;
                    }
                },
                Some(fill) = self.fills.recv() => {
                    self.handle(&fill.event, Utc::now()).await;
                }
                _ = timer.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }

        streamer.abort();
        self.engine.shutdown().await;

        let (orders, fills, cancels) = self.venue.activity().await;
        let stats = self.engine.stats().clone();
        info!(orders, fills, cancels, stats = ?stats, "Paper session finished");
        Ok(stats)
    }

    /// Market event: update the paper book first so resting orders can
    /// trade and settle those fills, then let the engine see the book, then
    /// settle any fills its reaction caused.
    async fn dispatch(&mut self, event: &VenueEvent, now: DateTime<Utc>) {
        if let VenueEvent::Book(book) = event {
            self.venue.apply_book(book).await;
            self.drain_fills(now).await;
        }
        self.handle(event, now).await;
        self.drain_fills(now).await;
    }

    async fn tick(&mut self, now: DateTime<Utc>) {
        if let Err(e) = self.engine.on_timer(now).await {
            error!(error = %e, "Timer handling failed");
        }
        self.drain_fills(now).await;
    }

    async fn handle(&mut self, event: &VenueEvent, now: DateTime<Utc>) {
        if let Err(e) = self.engine.handle_event(event, now).await {
            error!(instrument = %event.instrument(), error = %e, "Event handling failed");
        }
    }

    async fn drain_fills(&mut self, now: DateTime<Utc>) {
        while let Ok(fill) = self.fills.try_recv() {
            self.handle(&fill.event, now).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;
    use crate::exchange::{BookUpdate, PriceLevel};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn book_at(ms: i64, instrument: &str, bid: Decimal, ask: Decimal) -> TimedEvent {
        TimedEvent::at(
            t0() + Duration::milliseconds(ms),
            VenueEvent::Book(BookUpdate {
                instrument: instrument.to_string(),
                buy_levels: vec![PriceLevel::new(bid, 5)],
                sell_levels: vec![PriceLevel::new(ask, 5)],
            }),
        )
    }

    fn depth_at(ms: i64, instrument: &str, bid: (Decimal, i64), ask: (Decimal, i64)) -> TimedEvent {
        TimedEvent::at(
            t0() + Duration::milliseconds(ms),
            VenueEvent::Book(BookUpdate {
                instrument: instrument.to_string(),
                buy_levels: vec![PriceLevel::new(bid.0, bid.1)],
                sell_levels: vec![PriceLevel::new(ask.0, ask.1)],
            }),
        )
    }

    fn basket(ms: i64, etf_bid: Decimal) -> Vec<TimedEvent> {
        vec![
            book_at(ms, "TIDE_SPOT", dec!(2300), dec!(2310)),
            book_at(ms, "WX_SPOT", dec!(4500), dec!(4510)),
            book_at(ms, "LHR_COUNT", dec!(1200), dec!(1210)),
            book_at(ms, "LON_ETF", etf_bid, etf_bid + dec!(10)),
        ]
    }

    fn config(strategy: StrategyKind) -> Config {
        let mut config = Config::default();
        config.engine.strategy = strategy;
        config
    }

    #[tokio::test]
    async fn test_replay_arbitrage_updates_ledger_from_paper_fills() {
        let mut runner = PaperRunner::new(&config(StrategyKind::Arbitrage));
        let stats = runner.replay(basket(0, dec!(8200))).await.unwrap();

        assert_eq!(stats.arbitrage_fired, 1);
        assert_eq!(stats.own_fills, 4);

        let positions = &runner.engine().context().positions;
        assert_eq!(positions.get("LON_ETF"), -1);
        assert_eq!(positions.get("WX_SPOT"), 1);
        assert_eq!(positions.get("TIDE_SPOT"), 1);
    }

    #[tokio::test]
    async fn test_replay_respects_arbitrage_cooldown() {
        let mut events = basket(0, dec!(8200));
        // Still mispriced 1s later (inside the 1.5s cooldown) and 2s later.
        events.push(book_at(1000, "LON_ETF", dec!(8200), dec!(8210)));
        events.push(book_at(2000, "LON_ETF", dec!(8200), dec!(8210)));

        let mut runner = PaperRunner::new(&config(StrategyKind::Arbitrage));
        let stats = runner.replay(events).await.unwrap();

        assert_eq!(stats.arbitrage_fired, 2);
        assert_eq!(runner.engine().context().positions.get("LON_ETF"), -2);
    }

    #[tokio::test]
    async fn test_replay_never_breaches_limit() {
        let mut config = config(StrategyKind::Arbitrage);
        config.risk.position_limit = 3;
        config.risk.position_buffer = 1;
        config.market_making.quote_volume = 1;
        config.arbitrage.cooldown_ms = 0;

        let mut events = Vec::new();
        for i in 0..10 {
            events.extend(basket(i * 100, dec!(8200)));
        }

        let mut runner = PaperRunner::new(&config);
        let stats = runner.replay(events).await.unwrap();

        assert!(stats.limit_aborts > 0);
        for (instrument, position) in runner.engine().context().positions.snapshot() {
            assert!(position.abs() <= 3, "{} at {}", instrument, position);
        }
    }

    #[tokio::test]
    async fn test_replay_timer_drives_replenishment() {
        let mut config = config(StrategyKind::DeltaHedge);
        config.hedge.target_inventory = Some(2);

        let events = vec![
            book_at(0, "LON_FLY", dec!(100), dec!(105)),
            book_at(6000, "LON_FLY", dec!(100), dec!(105)),
        ];

        let mut runner = PaperRunner::new(&config);
        let stats = runner.replay(events).await.unwrap();

        // Timer at t=0 finds no book yet; the next tick buys 2 at the ask.
        assert_eq!(stats.replenish_orders, 1);
        assert_eq!(runner.engine().context().positions.get("LON_FLY"), 2);
    }

    #[tokio::test]
    async fn test_replay_shutdown_clears_resting_quotes() {
        let mut runner = PaperRunner::new(&config(StrategyKind::MarketMaker));
        let events = vec![book_at(0, "WX_SPOT", dec!(4400), dec!(4700))];

        let stats = runner.replay(events).await.unwrap();

        assert_eq!(stats.quote_refreshes, 1);
        assert!(runner.venue().resting_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_replay_thin_hedge_book_does_not_stack_orders() {
        let config = config(StrategyKind::DeltaHedge);
        let mut runner = PaperRunner::new(&config);
        runner.venue().set_position("LON_FLY", 80).await;

        // Delta 2 above 7000: the hedge wants -160, clamped to -100.
        let events = vec![
            depth_at(0, "LON_ETF", (dec!(7500), 20), (dec!(7510), 20)),
            depth_at(1000, "LON_ETF", (dec!(7490), 5), (dec!(7510), 20)),
            depth_at(2000, "LON_ETF", (dec!(7600), 1000), (dec!(7610), 1000)),
        ];

        let stats = runner.replay(events).await.unwrap();

        assert_eq!(stats.hedge_orders, 3);
        assert_eq!(stats.remnants_cancelled, 2);
        assert_eq!(runner.engine().context().positions.get("LON_ETF"), -100);
        assert!(runner.venue().resting_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_replay_combined_pulls_quotes_before_arbitrage() {
        let mut config = config(StrategyKind::Combined);
        config.market_making.fair_values.retain(|fv| fv.instrument == "WX_SPOT");

        let mut runner = PaperRunner::new(&config);
        runner.venue().set_position("WX_SPOT", 89).await;

        let mut events = vec![
            book_at(0, "TIDE_SPOT", dec!(2320), dec!(2360)),
            book_at(0, "WX_SPOT", dec!(4530), dec!(4580)),
            book_at(0, "LHR_COUNT", dec!(1230), dec!(1270)),
            book_at(0, "LON_ETF", dec!(8100), dec!(8200)),
        ];
        // WX bid of 10 rests at 4532; the synthetic then turns rich twice.
        events.push(book_at(100, "LON_ETF", dec!(8400), dec!(8410)));
        events.push(book_at(1700, "LON_ETF", dec!(8400), dec!(8410)));
        // A WX sell-off that would have hit the bid.
        events.push(book_at(2000, "WX_SPOT", dec!(4400), dec!(4420)));

        let stats = runner.replay(events).await.unwrap();

        assert_eq!(stats.quote_refreshes, 1);
        assert_eq!(stats.arbitrage_fired, 2);
        assert_eq!(runner.engine().context().positions.get("WX_SPOT"), 91);
    }
}
