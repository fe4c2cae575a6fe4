//! The venue seam.
//!
//! The engine never talks to a transport directly: everything outbound goes
//! through [`VenueConnector`]. Submission calls are request/response from the
//! engine's point of view; a call returns only once the venue has answered
//! every order in the batch.

use super::types::{BookSnapshot, OrderId, OrderRequest, OrderResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Failures surfaced by a venue connector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VenueError {
    #[error("unknown order {0}")]
    UnknownOrder(OrderId),

    #[error("no order book for {0}")]
    NoBook(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("venue unavailable: {0}")]
    Unavailable(String),
}

/// Outbound calls the engine makes into the venue.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VenueConnector: Send + Sync {
    /// Submit a batch of limit orders together.
    ///
    /// Returns one response per request in request order. Legs settle
    /// independently; there is no atomicity across the batch.
    async fn submit_orders(
        &self,
        batch: Vec<OrderRequest>,
    ) -> Result<Vec<OrderResponse>, VenueError>;

    /// Cancel the unfilled remainder of one order.
    async fn cancel_order(&self, id: OrderId) -> Result<(), VenueError>;

    /// Cancel every resting order this account owns.
    async fn cancel_all_orders(&self) -> Result<(), VenueError>;

    /// Net position per instrument as the venue sees it.
    async fn get_positions(&self) -> Result<HashMap<String, i64>, VenueError>;

    /// Current book for one instrument.
    async fn get_orderbook(&self, instrument: &str) -> Result<BookSnapshot, VenueError>;
}
