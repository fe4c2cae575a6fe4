//! Minimum-interval spacing between outbound actions, per action class.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;

/// Independent throttling classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// Firing an arbitrage batch
    Arbitrage,
    /// Cancel-and-repost of maker quotes
    QuoteRefresh,
    /// Delta hedge order
    Hedge,
    /// Derivative inventory top-up
    Replenish,
    /// Any outbound venue action (shared request budget)
    VenueRequest,
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionClass::Arbitrage => "arbitrage",
            ActionClass::QuoteRefresh => "quote_refresh",
            ActionClass::Hedge => "hedge",
            ActionClass::Replenish => "replenish",
            ActionClass::VenueRequest => "venue_request",
        };
        f.write_str(name)
    }
}

/// Tracks when each class last fired.
///
/// `allowed` is a pure check; only `record_fired` mutates. Classes without a
/// configured interval are never throttled.
#[derive(Debug, Clone, Default)]
pub struct ActionGate {
    min_interval: HashMap<ActionClass, Duration>,
    last_fired: HashMap<ActionClass, DateTime<Utc>>,
}

impl ActionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style interval setup.
    pub fn with_interval(mut self, class: ActionClass, interval: Duration) -> Self {
        self.min_interval.insert(class, interval);
        self
    }

    pub fn interval(&self, class: ActionClass) -> Duration {
        self.min_interval
            .get(&class)
            .copied()
            .unwrap_or_else(Duration::zero)
    }

    pub fn last_fired(&self, class: ActionClass) -> Option<DateTime<Utc>> {
        self.last_fired.get(&class).copied()
    }

    /// `now - last_fired >= min_interval`, or never fired.
    pub fn allowed(&self, class: ActionClass, now: DateTime<Utc>) -> bool {
        match self.last_fired.get(&class) {
            None => true,
            Some(&last) => now - last >= self.interval(class),
        }
    }

    /// All of `classes` are allowed.
    pub fn allowed_all(&self, classes: &[ActionClass], now: DateTime<Utc>) -> bool {
        classes.iter().all(|&class| self.allowed(class, now))
    }

    pub fn record_fired(&mut self, class: ActionClass, now: DateTime<Utc>) {
        self.last_fired.insert(class, now);
    }

    pub fn record_all(&mut self, classes: &[ActionClass], now: DateTime<Utc>) {
        for &class in classes {
            self.record_fired(class, now);
        }
    }

    /// Time left before `class` may fire again.
    pub fn remaining(&self, class: ActionClass, now: DateTime<Utc>) -> Duration {
        match self.last_fired.get(&class) {
            None => Duration::zero(),
            Some(&last) => (self.interval(class) - (now - last)).max(Duration::zero()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn gate() -> ActionGate {
        ActionGate::new()
            .with_interval(ActionClass::Arbitrage, Duration::milliseconds(1500))
            .with_interval(ActionClass::QuoteRefresh, Duration::seconds(4))
    }

    #[test]
    fn test_never_fired_is_allowed() {
        assert!(gate().allowed(ActionClass::Arbitrage, t0()));
    }

    #[test]
    fn test_interval_boundary_is_inclusive() {
        let mut gate = gate();
        gate.record_fired(ActionClass::Arbitrage, t0());

        assert!(!gate.allowed(ActionClass::Arbitrage, t0() + Duration::milliseconds(1499)));
        assert!(gate.allowed(ActionClass::Arbitrage, t0() + Duration::milliseconds(1500)));
    }

    #[test]
    fn test_denied_check_has_no_side_effects() {
        let mut gate = gate();
        gate.record_fired(ActionClass::Arbitrage, t0());

        for ms in [100, 500, 1000] {
            assert!(!gate.allowed(ActionClass::Arbitrage, t0() + Duration::milliseconds(ms)));
        }
        assert_eq!(gate.last_fired(ActionClass::Arbitrage), Some(t0()));
        assert!(gate.allowed(ActionClass::Arbitrage, t0() + Duration::milliseconds(1500)));
    }

    #[test]
    fn test_classes_are_independent() {
        let mut gate = gate();
        gate.record_fired(ActionClass::QuoteRefresh, t0());

        assert!(gate.allowed(ActionClass::Arbitrage, t0()));
        assert!(!gate.allowed(ActionClass::QuoteRefresh, t0() + Duration::seconds(1)));
        assert_eq!(gate.last_fired(ActionClass::Arbitrage), None);
    }

    #[test]
    fn test_unconfigured_class_never_throttles() {
        let mut gate = gate();
        gate.record_fired(ActionClass::VenueRequest, t0());
        assert!(gate.allowed(ActionClass::VenueRequest, t0()));
    }

    #[test]
    fn test_allowed_all_and_remaining() {
        let mut gate = gate().with_interval(ActionClass::VenueRequest, Duration::milliseconds(1100));
        gate.record_all(&[ActionClass::Arbitrage, ActionClass::VenueRequest], t0());

        let later = t0() + Duration::milliseconds(1200);
        assert!(gate.allowed(ActionClass::VenueRequest, later));
        assert!(!gate.allowed_all(&[ActionClass::Arbitrage, ActionClass::VenueRequest], later));
        assert_eq!(
            gate.remaining(ActionClass::Arbitrage, later),
            Duration::milliseconds(300)
        );
        assert_eq!(
            gate.remaining(ActionClass::Arbitrage, t0() + Duration::seconds(10)),
            Duration::zero()
        );
    }
}
