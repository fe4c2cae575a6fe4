//! Latest best bid/ask per watched instrument.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

/// Best-of-book for one instrument. `None` means no resting interest on that
/// side, which is distinct from a price of zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quote {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

impl Quote {
    pub fn new(bid: Option<Decimal>, ask: Option<Decimal>) -> Self {
        Self { bid, ask }
    }

    /// Both sides, or nothing.
    pub fn two_sided(&self) -> Option<(Decimal, Decimal)> {
        Some((self.bid?, self.ask?))
    }

    pub fn mid(&self) -> Option<Decimal> {
        let (bid, ask) = self.two_sided()?;
        Some((bid + ask) / Decimal::TWO)
    }
}

/// Last-write-wins quote store.
#[derive(Debug, Clone, Default)]
pub struct MarketState {
    watched: HashSet<String>,
    quotes: HashMap<String, Quote>,
}

impl MarketState {
    pub fn new<I, S>(watched: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            watched: watched.into_iter().map(Into::into).collect(),
            quotes: HashMap::new(),
        }
    }

    pub fn watches(&self, instrument: &str) -> bool {
        self.watched.contains(instrument)
    }

    /// Overwrite the stored quote. Instruments that are not watched are not
    /// stored; returns whether the update was kept.
    pub fn update(&mut self, instrument: &str, bid: Option<Decimal>, ask: Option<Decimal>) -> bool {
        if !self.watches(instrument) {
            return false;
        }
        self.quotes
            .insert(instrument.to_string(), Quote::new(bid, ask));
        true
    }

    /// Stored quote, both sides absent if nothing was seen yet.
    pub fn get(&self, instrument: &str) -> Quote {
        self.quotes.get(instrument).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_unknown_instrument_not_stored() {
        let mut market = MarketState::new(["LON_ETF"]);
        assert!(!market.update("OTHER", Some(dec!(1)), Some(dec!(2))));
        assert_eq!(market.get("OTHER"), Quote::default());
    }

    #[test]
    fn test_last_write_wins_including_absent_sides() {
        let mut market = MarketState::new(["LON_ETF"]);
        market.update("LON_ETF", Some(dec!(7000)), Some(dec!(7010)));
        market.update("LON_ETF", None, Some(dec!(7005)));

        let quote = market.get("LON_ETF");
        assert_eq!(quote.bid, None);
        assert_eq!(quote.ask, Some(dec!(7005)));
        assert_eq!(quote.two_sided(), None);
    }

    #[test]
    fn test_absent_is_distinct_from_zero() {
        let mut market = MarketState::new(["WX_SPOT"]);
        market.update("WX_SPOT", Some(Decimal::ZERO), None);
        assert_eq!(market.get("WX_SPOT").bid, Some(Decimal::ZERO));
        assert_eq!(market.get("WX_SPOT").ask, None);
    }

    #[test]
    fn test_mid() {
        let quote = Quote::new(Some(dec!(6599)), Some(dec!(6602)));
        assert_eq!(quote.mid(), Some(dec!(6600.5)));
    }
}
