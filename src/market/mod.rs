//! Market data consumed by the strategy core
//!
//! The core only sees an ordered stream of [`Snapshot`]s. Where they come
//! from (exchange websocket, a recorded file, a test) is the feed's business.

pub mod feed;
pub mod history;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::DataError;

pub use feed::{ChannelFeed, SnapshotFeed, StreamFeed};
pub use history::{load_history, load_history_file, stream_history_file};

/// One price/volume tick for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    /// Base-asset volume traded during the tick
    #[serde(default)]
    pub volume: f64,
}

impl Snapshot {
    pub fn new(symbol: impl Into<String>, timestamp: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            price,
            volume,
        }
    }

    /// Quote-currency turnover of this tick
    pub fn turnover(&self) -> f64 {
        self.price * self.volume
    }

    /// Check the fields that do not depend on history
    pub fn check_fields(&self) -> Result<(), DataError> {
        if self.symbol.trim().is_empty() {
            return Err(DataError::EmptySymbol);
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(DataError::InvalidPrice {
                symbol: self.symbol.clone(),
                price: self.price,
            });
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(DataError::InvalidVolume {
                symbol: self.symbol.clone(),
                volume: self.volume,
            });
        }
        Ok(())
    }
}

/// Per-symbol ordering guard
///
/// Timestamps must strictly increase per symbol. Rejected snapshots leave the
/// guard untouched.
#[derive(Debug, Default, Clone)]
pub struct SequenceGuard {
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a snapshot without recording it
    pub fn check(&self, snapshot: &Snapshot) -> Result<(), DataError> {
        snapshot.check_fields()?;

        if let Some(last) = self.last_seen.get(&snapshot.symbol) {
            if snapshot.timestamp == *last {
                return Err(DataError::DuplicateTimestamp {
                    symbol: snapshot.symbol.clone(),
                    timestamp: snapshot.timestamp,
                });
            }
            if snapshot.timestamp < *last {
                return Err(DataError::OutOfOrder {
                    symbol: snapshot.symbol.clone(),
                    timestamp: snapshot.timestamp,
                    last: *last,
                });
            }
        }
        Ok(())
    }

    /// Record an accepted snapshot
    pub fn accept(&mut self, snapshot: &Snapshot) {
        self.last_seen
            .insert(snapshot.symbol.clone(), snapshot.timestamp);
    }

    /// Last accepted timestamp for a symbol
    pub fn last_seen(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.last_seen.get(symbol).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, minute, 0).unwrap()
    }

    #[test]
    fn test_field_checks() {
        assert!(Snapshot::new("ABCUSDT", ts(0), 1.0, 0.0).check_fields().is_ok());
        assert_eq!(
            Snapshot::new(" ", ts(0), 1.0, 0.0).check_fields(),
            Err(DataError::EmptySymbol)
        );
        assert!(matches!(
            Snapshot::new("ABCUSDT", ts(0), 0.0, 1.0).check_fields(),
            Err(DataError::InvalidPrice { .. })
        ));
        assert!(matches!(
            Snapshot::new("ABCUSDT", ts(0), f64::INFINITY, 1.0).check_fields(),
            Err(DataError::InvalidPrice { .. })
        ));
        assert!(matches!(
            Snapshot::new("ABCUSDT", ts(0), 1.0, -3.0).check_fields(),
            Err(DataError::InvalidVolume { .. })
        ));
    }

    #[test]
    fn test_sequence_guard_per_symbol() {
        let mut guard = SequenceGuard::new();
        let a0 = Snapshot::new("A", ts(5), 1.0, 1.0);
        assert!(guard.check(&a0).is_ok());
        guard.accept(&a0);

        // Another symbol has its own clock
        let b = Snapshot::new("B", ts(1), 1.0, 1.0);
        assert!(guard.check(&b).is_ok());

        let dup = Snapshot::new("A", ts(5), 1.1, 1.0);
        assert!(matches!(guard.check(&dup), Err(DataError::DuplicateTimestamp { .. })));

        let old = Snapshot::new("A", ts(4), 1.1, 1.0);
        assert!(matches!(guard.check(&old), Err(DataError::OutOfOrder { .. })));

        // Rejections do not move the clock
        assert_eq!(guard.last_seen("A"), Some(ts(5)));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = r#"{"symbol":"PEPEUSDT","timestamp":"2024-03-01T00:15:00Z","price":0.5,"volume":1200.0}"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.symbol, "PEPEUSDT");
        assert_eq!(snapshot.timestamp, ts(15));
        assert_eq!(snapshot.turnover(), 600.0);
    }
}
