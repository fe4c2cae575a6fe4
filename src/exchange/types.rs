//! Venue-facing types: market data pushes, own fills and order traffic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue-assigned order identifier.
pub type OrderId = u64;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Sign of the position change caused by a fill on this side.
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// One price level of a book side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub volume: i64,
}

impl PriceLevel {
    pub fn new(price: Decimal, volume: i64) -> Self {
        Self { price, volume }
    }
}

/// Book push for one instrument.
///
/// `buy_levels` are sorted best (highest) first and `sell_levels` best
/// (lowest) first; the engine only ever reads the head of each side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub instrument: String,
    #[serde(default)]
    pub buy_levels: Vec<PriceLevel>,
    #[serde(default)]
    pub sell_levels: Vec<PriceLevel>,
}

impl BookUpdate {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.buy_levels.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.sell_levels.first().map(|l| l.price)
    }
}

/// On-demand order book read, same layout as a push.
pub type BookSnapshot = BookUpdate;

/// Public trade print. Ours when `buyer` or `seller` is our identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub instrument: String,
    pub price: Decimal,
    pub volume: i64,
    pub buyer: String,
    pub seller: String,
}

/// Everything the venue pushes to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VenueEvent {
    Book(BookUpdate),
    Fill(Fill),
}

impl VenueEvent {
    pub fn instrument(&self) -> &str {
        match self {
            VenueEvent::Book(book) => &book.instrument,
            VenueEvent::Fill(fill) => &fill.instrument,
        }
    }
}

/// A venue event with the time it was observed, when known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub event: VenueEvent,
}

impl TimedEvent {
    pub fn now(event: VenueEvent) -> Self {
        Self { at: None, event }
    }

    pub fn at(at: DateTime<Utc>, event: VenueEvent) -> Self {
        Self { at: Some(at), event }
    }
}

/// Limit order request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub price: Decimal,
    pub side: Side,
    pub volume: i64,
}

impl OrderRequest {
    pub fn new(instrument: impl Into<String>, price: Decimal, side: Side, volume: i64) -> Self {
        Self {
            instrument: instrument.into(),
            price,
            side,
            volume,
        }
    }

    /// Signed position change if this order fills completely.
    pub fn position_delta(&self) -> i64 {
        self.side.sign() * self.volume
    }
}

/// Venue answer to one order request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub requested_volume: i64,
    pub filled_volume: i64,
}

impl OrderResponse {
    /// Volume still resting on the book.
    pub fn remaining(&self) -> i64 {
        (self.requested_volume - self.filled_volume).max(0)
    }

    pub fn is_fully_filled(&self) -> bool {
        self.remaining() == 0
    }
}
