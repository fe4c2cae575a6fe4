//! Venue integration for the engine.
//!
//! ## Connector seam
//! `VenueConnector` is everything the engine calls outbound: batch order
//! submission, cancellation, position and order book queries.
//!
//! ## Paper venue
//! `PaperVenue` matches orders against pushed books in memory and reports
//! own fills back as trade events.
//!
//! ## Replay
//! `ReplayFeed` loads recorded book and trade streams (JSON lines).

pub mod paper;
pub mod replay;
mod traits;
mod types;

pub use paper::PaperVenue;
pub use replay::ReplayFeed;
pub use traits::*;
pub use types::*;
