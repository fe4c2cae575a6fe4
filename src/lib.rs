//! # Synthetic Arb Engine
//!
//! A reactive trading engine for a basket of correlated instruments: an
//! exchange-traded synthetic product and the components whose prices sum to
//! its value.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Venue types, the venue connector seam, paper venue and replay feed
//! - `engine`: Market state, position ledger, action gate and the event loop
//! - `strategy`: Arbitrage, market making, combined and delta-hedge strategies

pub mod config;
pub mod engine;
pub mod exchange;
pub mod strategy;

pub use config::Config;
