//! Recorded venue streams.
//!
//! Expected JSON-lines format, one event per line:
//! ```text
//! {"at":"2024-03-01T10:00:00Z","type":"book","instrument":"LON_ETF","buy_levels":[{"price":"7000","volume":3}],"sell_levels":[{"price":"7010","volume":2}]}
//! {"at":"2024-03-01T10:00:01Z","type":"fill","instrument":"LON_ETF","price":"7000","volume":1,"buyer":"someone","seller":"other"}
//! ```
//! Blank lines and lines starting with `#` are skipped.

use super::types::TimedEvent;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A loaded recording of venue events, in file order.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    events: Vec<TimedEvent>,
}

impl ReplayFeed {
    /// Load a recording from a JSON-lines file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file: {}", path.display()))?;

        let feed = Self::from_content(&content)?;
        info!(
            path = %path.display(),
            events = feed.len(),
            instruments = feed.instruments().len(),
            "Loaded replay feed"
        );
        Ok(feed)
    }

    /// Parse a recording from JSON-lines content.
    pub fn from_content(content: &str) -> Result<Self> {
        let mut events = Vec::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let event: TimedEvent = serde_json::from_str(line)
                .with_context(|| format!("Invalid event on line {}", line_num + 1))?;
            events.push(event);
        }

        Ok(Self { events })
    }

    pub fn from_events(events: Vec<TimedEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TimedEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// First and last timestamp, when the recording carries any.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut stamps = self.events.iter().filter_map(|e| e.at);
        let first = stamps.next()?;
        let (min, max) = stamps.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
        Some((min, max))
    }

    /// All instruments mentioned in the recording.
    pub fn instruments(&self) -> BTreeSet<String> {
        self.events
            .iter()
            .map(|e| e.event.instrument().to_string())
            .collect()
    }

    /// Push events into `tx`, sleeping between them so that recorded gaps are
    /// reproduced at `speed`x. Events are re-stamped with wall-clock time.
    ///
    /// Returns when the recording is exhausted or the receiver is dropped.
    pub async fn stream(self, tx: mpsc::UnboundedSender<TimedEvent>, speed: f64) {
        let speed = if speed > 0.0 { speed } else { 1.0 };
        let mut previous: Option<DateTime<Utc>> = None;
        let total = self.events.len();

        for (sent, event) in self.events.into_iter().enumerate() {
            if let (Some(prev), Some(at)) = (previous, event.at) {
                let gap_ms = (at - prev).num_milliseconds().max(0) as f64 / speed;
                if gap_ms > 0.0 {
                    tokio::time::sleep(Duration::from_millis(gap_ms as u64)).await;
                }
            }
            previous = event.at.or(previous);

            if tx.send(TimedEvent::now(event.event)).is_err() {
                debug!(sent, total, "Replay receiver dropped");
                return;
            }
        }

        info!(total, "Replay stream exhausted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::VenueEvent;

    const SAMPLE: &str = r#"
# two books and a trade print
{"at":"2024-03-01T10:00:00Z","type":"book","instrument":"LON_ETF","buy_levels":[{"price":"7000","volume":3}],"sell_levels":[{"price":"7010","volume":2}]}

{"at":"2024-03-01T10:00:02Z","type":"book","instrument":"WX_SPOT","buy_levels":[],"sell_levels":[{"price":"4560","volume":1}]}
{"at":"2024-03-01T10:00:01Z","type":"fill","instrument":"LON_ETF","price":"7000","volume":1,"buyer":"a","seller":"b"}
"#;

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let feed = ReplayFeed::from_content(SAMPLE).unwrap();
        assert_eq!(feed.len(), 3);
        assert!(matches!(feed.events()[2].event, VenueEvent::Fill(_)));
    }

    #[test]
    fn test_time_range_and_instruments() {
        let feed = ReplayFeed::from_content(SAMPLE).unwrap();
        let (start, end) = feed.time_range().unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-03-01T10:00:02+00:00");

        let instruments = feed.instruments();
        assert_eq!(instruments.len(), 2);
        assert!(instruments.contains("WX_SPOT"));
    }

    #[test]
    fn test_invalid_line_reports_line_number() {
        let err = ReplayFeed::from_content("{\"type\":\"book\"}\nnot json").unwrap_err();
        assert!(format!("{:#}", err).contains("line 1"));
    }

    #[tokio::test]
    async fn test_stream_delivers_all_events() {
        let feed = ReplayFeed::from_content(SAMPLE).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Very high speed so the recorded two seconds collapse.
        feed.stream(tx, 1_000_000.0).await;

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 3);
        assert!(received.iter().all(|e| e.at.is_none()));
    }
}
