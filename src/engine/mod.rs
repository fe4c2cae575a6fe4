//! Engine state and the event-driven core.
//!
//! The [`Engine`] owns every piece of per-run state through an
//! [`EngineContext`] and feeds venue events and timer ticks into a single
//! [`Strategy`]. All calls take `&mut self`, so book handlers, fill handlers
//! and the polling loop can never interleave.

mod context;
mod gate;
mod market_state;
mod positions;
mod runner;

pub use context::{EngineContext, EngineStats, FillAttribution};
pub use gate::{ActionClass, ActionGate};
pub use market_state::{MarketState, Quote};
pub use positions::{LimitBreach, PositionLedger};
pub use runner::PaperRunner;

use crate::config::Config;
use crate::exchange::{VenueConnector, VenueEvent};
use crate::strategy::{build_strategy, Strategy};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one strategy against one venue.
pub struct Engine {
    ctx: EngineContext,
    strategy: Box<dyn Strategy>,
    venue: Arc<dyn VenueConnector>,
    status_interval: Duration,
    last_status: Option<DateTime<Utc>>,
}

impl Engine {
    pub fn new(
        ctx: EngineContext,
        strategy: Box<dyn Strategy>,
        venue: Arc<dyn VenueConnector>,
        status_interval: Duration,
    ) -> Self {
        Self {
            ctx,
            strategy,
            venue,
            status_interval,
            last_status: None,
        }
    }

    /// Engine running the configured strategy.
    pub fn from_config(config: &Config, venue: Arc<dyn VenueConnector>) -> Self {
        Self::new(
            EngineContext::from_config(config),
            build_strategy(config),
            venue,
            config.engine.status_interval(),
        )
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.ctx
    }

    pub fn stats(&self) -> &EngineStats {
        &self.ctx.stats
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Seed the ledger from the venue's positions, once, before any event.
    pub async fn bootstrap(&mut self) -> Result<()> {
        let positions = self
            .venue
            .get_positions()
            .await
            .context("Failed to fetch starting positions")?;

        for (instrument, position) in positions {
            if self.ctx.market.watches(&instrument) {
                self.ctx.positions.set(&instrument, position);
            }
        }

        info!(
            strategy = self.strategy.name(),
            positions = ?self.ctx.positions.snapshot(),
            "Synced starting inventory"
        );
        Ok(())
    }

    /// Process one venue event.
    pub async fn handle_event(&mut self, event: &VenueEvent, now: DateTime<Utc>) -> Result<()> {
        match event {
            VenueEvent::Book(book) => {
                if !self
                    .ctx
                    .market
                    .update(&book.instrument, book.best_bid(), book.best_ask())
                {
                    return Ok(());
                }
                self.ctx.stats.book_updates += 1;

                self.strategy
                    .on_book_update(&mut self.ctx, self.venue.as_ref(), book, now)
                    .await
            }
            VenueEvent::Fill(fill) => {
                let Some(delta) = self.ctx.attribute(fill).delta() else {
                    return Ok(());
                };

                if !self.ctx.market.watches(&fill.instrument) {
                    debug!(instrument = %fill.instrument, delta, "Ignoring fill on unwatched instrument");
                    return Ok(());
                }

                self.ctx.positions.apply_fill(&fill.instrument, delta);
                self.ctx.stats.own_fills += 1;

                self.strategy
                    .on_fill(&mut self.ctx, self.venue.as_ref(), fill, now)
                    .await
            }
        }
    }

    /// Polling tick: the strategy's timer work, then the periodic position
    /// status line when it is due.
    pub async fn on_timer(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.strategy
            .on_timer(&mut self.ctx, self.venue.as_ref(), now)
            .await?;

        let due = match self.last_status {
            None => true,
            Some(last) => now - last >= self.status_interval,
        };
        if due {
            self.last_status = Some(now);
            self.log_status().await?;
        }

        Ok(())
    }

    /// Compare the local ledger with the venue's view. Display only: the
    /// ledger is never overwritten here.
    pub async fn log_status(&self) -> Result<usize> {
        let venue_positions = self
            .venue
            .get_positions()
            .await
            .context("Failed to fetch positions for status")?;

        let mut mismatches = 0;
        for (instrument, local) in self.ctx.positions.snapshot() {
            let remote = venue_positions.get(&instrument).copied().unwrap_or(0);
            if remote != local {
                mismatches += 1;
                warn!(%instrument, local, remote, "Position mismatch with venue");
            }
        }

        info!(
            positions = ?self.ctx.positions.snapshot(),
            mismatches,
            "Position status"
        );
        Ok(mismatches)
    }

    /// Best-effort cancellation of everything we have resting.
    pub async fn shutdown(&self) {
        info!("Cancelling all resting orders");
        if let Err(e) = self.venue.cancel_all_orders().await {
            warn!(error = %e, "Failed to cancel orders on shutdown");
        }
    }
}
