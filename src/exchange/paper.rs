//! Paper trading venue.
//!
//! Matches limit orders against the last book pushed for each instrument,
//! rests the unfilled remainder, and re-checks resting orders whenever a new
//! book arrives. Every execution is published as a [`Fill`] event naming this
//! account as buyer or seller, exactly like a real venue's trade stream.

use super::traits::{VenueConnector, VenueError};
use super::types::*;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Name used as the other side of every paper execution.
pub const PAPER_COUNTERPARTY: &str = "paper-market";

/// An order of ours still on the paper book.
#[derive(Debug, Clone, PartialEq)]
pub struct RestingOrder {
    pub id: OrderId,
    pub request: OrderRequest,
    pub remaining: i64,
}

/// Simulated venue state.
#[derive(Debug, Default)]
pub struct PaperState {
    pub books: HashMap<String, BookUpdate>,
    /// Resting orders in arrival order
    pub resting: Vec<RestingOrder>,
    pub positions: HashMap<String, i64>,
    pub order_count: u64,
    pub fill_count: u64,
    pub cancel_count: u64,
}

/// In-memory venue used for paper trading and replays.
pub struct PaperVenue {
    identity: String,
    state: Arc<RwLock<PaperState>>,
    order_id_counter: AtomicU64,
    fills: mpsc::UnboundedSender<TimedEvent>,
}

/// One execution against a book level.
#[derive(Debug, Clone, Copy)]
struct Execution {
    price: Decimal,
    volume: i64,
}

impl PaperVenue {
    /// Create a paper venue trading as `identity`; own fills are sent to `fills`.
    pub fn new(identity: impl Into<String>, fills: mpsc::UnboundedSender<TimedEvent>) -> Self {
        Self {
            identity: identity.into(),
            state: Arc::new(RwLock::new(PaperState::default())),
            order_id_counter: AtomicU64::new(1),
            fills,
        }
    }

    /// Seed a starting position (e.g. inventory carried from a previous session).
    pub async fn set_position(&self, instrument: &str, position: i64) {
        self.state
            .write()
            .await
            .positions
            .insert(instrument.to_string(), position);
    }

    /// Replace the book for an instrument and match resting orders against it.
    ///
    /// Returns the number of resting-order executions triggered.
    pub async fn apply_book(&self, book: &BookUpdate) -> usize {
        let mut state = self.state.write().await;
        state.books.insert(book.instrument.clone(), book.clone());

        let mut executions = Vec::new();
        let mut resting = std::mem::take(&mut state.resting);

        for order in resting
            .iter_mut()
            .filter(|o| o.request.instrument == book.instrument)
        {
            let Some(stored) = state.books.get_mut(&book.instrument) else {
                break;
            };
            let fills = consume(stored, order.request.side, order.request.price, order.remaining);
            for fill in fills {
                order.remaining -= fill.volume;
                // Resting orders trade at their own limit price.
                executions.push((order.request.clone(), order.id, fill.volume));
            }
        }

        resting.retain(|o| o.remaining > 0);
        state.resting = resting;

        let count = executions.len();
        for (request, id, volume) in executions {
            self.record_execution(&mut state, &request, request.price, volume);
            debug!(order_id = id, instrument = %request.instrument, volume, "Paper resting order filled");
        }

        count
    }

    /// Snapshot of resting orders.
    pub async fn resting_orders(&self) -> Vec<RestingOrder> {
        self.state.read().await.resting.clone()
    }

    /// Counters for logging: (orders, fills, cancels).
    pub async fn activity(&self) -> (u64, u64, u64) {
        let state = self.state.read().await;
        (state.order_count, state.fill_count, state.cancel_count)
    }

    fn next_order_id(&self) -> OrderId {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn record_execution(
        &self,
        state: &mut PaperState,
        request: &OrderRequest,
        price: Decimal,
        volume: i64,
    ) {
        *state
            .positions
            .entry(request.instrument.clone())
            .or_insert(0) += request.side.sign() * volume;
        state.fill_count += 1;

        let (buyer, seller) = match request.side {
            Side::Buy => (self.identity.clone(), PAPER_COUNTERPARTY.to_string()),
            Side::Sell => (PAPER_COUNTERPARTY.to_string(), self.identity.clone()),
        };

        let fill = Fill {
            instrument: request.instrument.clone(),
            price,
            volume,
            buyer,
            seller,
        };

        if self.fills.send(TimedEvent::now(VenueEvent::Fill(fill))).is_err() {
            debug!("Fill receiver dropped");
        }
    }
}

/// Take liquidity from the side of `book` opposite to `side`, up to `volume`,
/// for levels at or better than `limit`. Depleted levels are removed.
fn consume(book: &mut BookUpdate, side: Side, limit: Decimal, volume: i64) -> Vec<Execution> {
    let levels = match side {
        Side::Buy => &mut book.sell_levels,
        Side::Sell => &mut book.buy_levels,
    };

    let mut remaining = volume;
    let mut executions = Vec::new();

    while remaining > 0 {
        let Some(level) = levels.first_mut() else {
            break;
        };
        let crosses = match side {
            Side::Buy => level.price <= limit,
            Side::Sell => level.price >= limit,
        };
        if !crosses {
            break;
        }

        let take = remaining.min(level.volume);
        if take > 0 {
            executions.push(Execution {
                price: level.price,
                volume: take,
            });
            remaining -= take;
            level.volume -= take;
        }
        if level.volume <= 0 {
            levels.remove(0);
        }
    }

    executions
}

#[async_trait]
impl VenueConnector for PaperVenue {
    async fn submit_orders(
        &self,
        batch: Vec<OrderRequest>,
    ) -> Result<Vec<OrderResponse>, VenueError> {
        if let Some(bad) = batch.iter().find(|o| o.volume <= 0 || o.price <= Decimal::ZERO) {
            return Err(VenueError::Rejected(format!(
                "{} {} {} @ {}",
                bad.side, bad.volume, bad.instrument, bad.price
            )));
        }

        let mut state = self.state.write().await;
        let mut responses = Vec::with_capacity(batch.len());

        for request in batch {
            let id = self.next_order_id();
            state.order_count += 1;

            let executions = match state.books.get_mut(&request.instrument) {
                Some(book) => consume(book, request.side, request.price, request.volume),
                None => Vec::new(),
            };

            let mut filled = 0;
            for execution in executions {
                filled += execution.volume;
                self.record_execution(&mut state, &request, execution.price, execution.volume);
            }

            let remaining = request.volume - filled;
            info!(
                order_id = id,
                instrument = %request.instrument,
                side = %request.side,
                price = %request.price,
                volume = request.volume,
                filled,
                "Paper order accepted"
            );

            if remaining > 0 {
                state.resting.push(RestingOrder {
                    id,
                    request: request.clone(),
                    remaining,
                });
            }

            responses.push(OrderResponse {
                id,
                requested_volume: request.volume,
                filled_volume: filled,
            });
        }

        Ok(responses)
    }

    async fn cancel_order(&self, id: OrderId) -> Result<(), VenueError> {
        let mut state = self.state.write().await;
        let before = state.resting.len();
        state.resting.retain(|o| o.id != id);

        if state.resting.len() == before {
            return Err(VenueError::UnknownOrder(id));
        }

        state.cancel_count += 1;
        debug!(order_id = id, "Paper order cancelled");
        Ok(())
    }

    async fn cancel_all_orders(&self) -> Result<(), VenueError> {
        let mut state = self.state.write().await;
        let cancelled = state.resting.len() as u64;
        state.resting.clear();
        state.cancel_count += cancelled;
        debug!(cancelled, "Paper orders cancelled");
        Ok(())
    }

    async fn get_positions(&self) -> Result<HashMap<String, i64>, VenueError> {
        Ok(self.state.read().await.positions.clone())
    }

    async fn get_orderbook(&self, instrument: &str) -> Result<BookSnapshot, VenueError> {
        self.state
            .read()
            .await
            .books
            .get(instrument)
            .cloned()
            .ok_or_else(|| VenueError::NoBook(instrument.to_string()))
    }
}
