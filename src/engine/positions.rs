//! Signed net position per instrument, driven by own fills.
//!
//! The ledger also owns the symmetric position limit so that every order the
//! engine sends can be checked against it before submission.

use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

/// A candidate order would carry a position past the limit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{instrument}: position {position} {delta:+} would breach limit ±{limit}")]
pub struct LimitBreach {
    pub instrument: String,
    pub position: i64,
    pub delta: i64,
    pub limit: i64,
}

/// Local position book with a symmetric per-instrument limit.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    positions: HashMap<String, i64>,
    limit: i64,
}

impl PositionLedger {
    pub fn new(limit: i64) -> Self {
        Self {
            positions: HashMap::new(),
            limit,
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Position for `instrument`, 0 if never seen.
    pub fn get(&self, instrument: &str) -> i64 {
        self.positions.get(instrument).copied().unwrap_or(0)
    }

    /// Overwrite a position from an external source of truth (startup sync).
    pub fn set(&mut self, instrument: &str, position: i64) {
        self.positions.insert(instrument.to_string(), position);
    }

    /// Apply one own fill: positive delta for a buy, negative for a sell.
    ///
    /// Callers must apply each fill notification exactly once.
    pub fn apply_fill(&mut self, instrument: &str, delta: i64) -> i64 {
        let position = self.positions.entry(instrument.to_string()).or_insert(0);
        *position += delta;

        info!(
            %instrument,
            delta,
            position = *position,
            limit = self.limit,
            "Position updated"
        );

        *position
    }

    /// Whether `position + delta` stays within ±limit.
    pub fn check(&self, instrument: &str, delta: i64) -> Result<(), LimitBreach> {
        let position = self.get(instrument);
        let after = position + delta;

        if after.abs() > self.limit {
            return Err(LimitBreach {
                instrument: instrument.to_string(),
                position,
                delta,
                limit: self.limit,
            });
        }

        Ok(())
    }

    /// All tracked positions.
    pub fn snapshot(&self) -> HashMap<String, i64> {
        self.positions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_instrument_is_flat() {
        let ledger = PositionLedger::new(100);
        assert_eq!(ledger.get("WX_SPOT"), 0);
    }

    #[test]
    fn test_apply_fill_signed() {
        let mut ledger = PositionLedger::new(100);
        assert_eq!(ledger.apply_fill("WX_SPOT", 10), 10);
        assert_eq!(ledger.apply_fill("WX_SPOT", -25), -15);
        assert_eq!(ledger.get("WX_SPOT"), -15);
    }

    #[test]
    fn test_check_is_symmetric_and_inclusive() {
        let mut ledger = PositionLedger::new(100);
        ledger.set("LON_ETF", 99);
        assert!(ledger.check("LON_ETF", 1).is_ok());
        assert!(ledger.check("LON_ETF", 2).is_err());

        ledger.set("LON_ETF", -99);
        assert!(ledger.check("LON_ETF", -1).is_ok());
        let breach = ledger.check("LON_ETF", -2).unwrap_err();
        assert_eq!(breach.position, -99);
        assert_eq!(breach.delta, -2);
        assert_eq!(breach.to_string(), "LON_ETF: position -99 -2 would breach limit ±100");
    }

    #[test]
    fn test_check_uses_resulting_position() {
        // Synced positions may already sit outside the limit.
        let mut ledger = PositionLedger::new(100);
        ledger.set("LON_ETF", 120);
        assert!(ledger.check("LON_ETF", -30).is_ok());
        assert!(ledger.check("LON_ETF", -10).is_err());
    }
}
