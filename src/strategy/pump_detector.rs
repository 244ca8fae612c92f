//! Pump detection over a rolling data-time window
//!
//! A symbol is pumped while its latest price is at least `threshold_pct`
//! above the lowest price in the trailing window. The flag resets as soon as
//! the gain drops below the threshold.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info};

use super::types::{Episode, PumpStatus};
use super::window::PriceWindow;
use crate::config::PumpConfig;
use crate::market::Snapshot;

/// Per-symbol detector state
#[derive(Debug, Clone)]
pub struct PumpState {
    pub symbol: String,
    pub window: PriceWindow,
    /// Onset of the running episode, if flagged
    pub pumped_since: Option<DateTime<Utc>>,
    /// Highest price since onset; meaningless while not flagged
    pub peak_price: f64,
}

impl PumpState {
    fn new(symbol: &str, span: Duration) -> Self {
        Self {
            symbol: symbol.to_string(),
            window: PriceWindow::new(span),
            pumped_since: None,
            peak_price: 0.0,
        }
    }

    /// Running episode, if any
    pub fn episode(&self) -> Option<Episode> {
        self.pumped_since.map(|since| Episode {
            since,
            peak_price: self.peak_price,
        })
    }

    /// Gain of the latest price over the window low, in percent
    pub fn pct_change(&self) -> Option<f64> {
        if self.window.len() < 2 {
            return None;
        }
        let low = self.window.min_price()?;
        let last = self.window.latest()?.price;
        Some((last - low) / low * 100.0)
    }

    fn end_episode(&mut self) -> Option<Episode> {
        let episode = self.episode();
        self.pumped_since = None;
        self.peak_price = 0.0;
        episode
    }
}

/// Tracks every symbol's window and pump flag
pub struct PumpDetector {
    threshold_pct: f64,
    span: Duration,
    states: HashMap<String, PumpState>,
}

impl PumpDetector {
    pub fn new(config: &PumpConfig) -> Self {
        Self {
            threshold_pct: config.threshold_pct,
            span: config.window(),
            states: HashMap::new(),
        }
    }

    /// Feed one validated snapshot and report the symbol's pump status
    pub fn update(&mut self, snapshot: &Snapshot) -> PumpStatus {
        let span = self.span;
        let state = self
            .states
            .entry(snapshot.symbol.clone())
            .or_insert_with(|| PumpState::new(&snapshot.symbol, span));

        state
            .window
            .push(snapshot.timestamp, snapshot.price, snapshot.turnover());

        let Some(pct_change) = state.pct_change() else {
            // A gap longer than the window leaves one sample behind
            if let Some(episode) = state.end_episode() {
                info!(
                    "{} pump flag reset: window collapsed after data gap",
                    snapshot.symbol
                );
                return PumpStatus::EpisodeEnded {
                    episode,
                    pct_change: 0.0,
                };
            }
            return PumpStatus::Insufficient;
        };

        if pct_change >= self.threshold_pct {
            let onset = state.pumped_since.is_none();
            if onset {
                state.pumped_since = Some(snapshot.timestamp);
                state.peak_price = snapshot.price;
                info!(
                    "{} pumped: +{:.1}% over window low at {}",
                    snapshot.symbol, pct_change, snapshot.price
                );
            } else if snapshot.price > state.peak_price {
                state.peak_price = snapshot.price;
                debug!("{} new episode peak {}", snapshot.symbol, snapshot.price);
            }

            return PumpStatus::Pumped {
                episode: Episode {
                    since: state.pumped_since.unwrap_or(snapshot.timestamp),
                    peak_price: state.peak_price,
                },
                pct_change,
                onset,
            };
        }

        match state.end_episode() {
            Some(episode) => {
                info!(
                    "{} pump flag reset: +{:.1}% is below {:.1}%",
                    snapshot.symbol, pct_change, self.threshold_pct
                );
                PumpStatus::EpisodeEnded {
                    episode,
                    pct_change,
                }
            }
            None => PumpStatus::NotPumped { pct_change },
        }
    }

    /// Detector state for a symbol
    pub fn state(&self, symbol: &str) -> Option<&PumpState> {
        self.states.get(symbol)
    }

    /// Symbols currently flagged, sorted
    pub fn pumped_symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self
            .states
            .values()
            .filter(|s| s.pumped_since.is_some())
            .map(|s| s.symbol.as_str())
            .collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn tracked_count(&self) -> usize {
        self.states.len()
    }

    pub fn threshold_pct(&self) -> f64 {
        self.threshold_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn detector() -> PumpDetector {
        PumpDetector::new(&PumpConfig::default())
    }

    fn snap(symbol: &str, minutes: i64, price: f64) -> Snapshot {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        Snapshot::new(symbol, base + Duration::minutes(minutes), price, 1.0)
    }

    #[test]
    fn test_single_point_is_insufficient() {
        let mut d = detector();
        assert_eq!(d.update(&snap("A", 0, 100.0)), PumpStatus::Insufficient);
        assert!(d.state("A").unwrap().pumped_since.is_none());
    }

    #[test]
    fn test_flag_and_reset() {
        let mut d = detector();
        let prices = [100.0, 100.0, 126.0, 130.0, 128.0, 120.0];
        let statuses: Vec<PumpStatus> = prices
            .iter()
            .enumerate()
            .map(|(i, p)| d.update(&snap("A", i as i64 * 15, *p)))
            .collect();

        assert!(matches!(statuses[1], PumpStatus::NotPumped { .. }));
        match &statuses[2] {
            PumpStatus::Pumped { onset, episode, .. } => {
                assert!(*onset);
                assert_eq!(episode.peak_price, 126.0);
            }
            other => panic!("expected onset, got {other:?}"),
        }
        match &statuses[3] {
            PumpStatus::Pumped { onset, episode, .. } => {
                assert!(!*onset);
                assert_eq!(episode.peak_price, 130.0);
            }
            other => panic!("expected pumped, got {other:?}"),
        }
        assert!(statuses[4].is_pumped());
        match &statuses[5] {
            PumpStatus::EpisodeEnded { episode, pct_change } => {
                assert_eq!(episode.peak_price, 130.0);
                assert!((pct_change - 20.0).abs() < 1e-9);
            }
            other => panic!("expected reset, got {other:?}"),
        }
        assert!(d.state("A").unwrap().episode().is_none());
    }

    #[test]
    fn test_exact_threshold_counts_as_pumped() {
        let mut d = detector();
        d.update(&snap("A", 0, 100.0));
        assert!(d.update(&snap("A", 1, 125.0)).is_pumped());
    }

    #[test]
    fn test_old_low_leaves_window() {
        let mut d = detector();
        d.update(&snap("A", 0, 50.0));
        d.update(&snap("A", 60, 100.0));
        // 50 is still in the window: +100%
        assert!(d.update(&snap("A", 23 * 60, 100.0)).is_pumped());
        // After 24h the low is 100 and the gain is gone
        let status = d.update(&snap("A", 24 * 60 + 1, 101.0));
        assert!(matches!(status, PumpStatus::EpisodeEnded { .. }));
    }

    #[test]
    fn test_window_never_exceeds_span() {
        let mut d = detector();
        let mut price = 1.0;
        for i in 0..500 {
            price *= if i % 7 == 0 { 0.97 } else { 1.01 };
            d.update(&snap("A", i * 10, price));
            let state = d.state("A").unwrap();
            assert!(state.window.covered() <= Duration::hours(24));
            assert!(state.window.len() >= 1);
        }
    }

    #[test]
    fn test_data_gap_ends_episode() {
        let mut d = detector();
        d.update(&snap("A", 0, 100.0));
        assert!(d.update(&snap("A", 15, 140.0)).is_pumped());
        let status = d.update(&snap("A", 3 * 24 * 60, 150.0));
        assert!(matches!(
            status,
            PumpStatus::EpisodeEnded { pct_change, .. } if pct_change == 0.0
        ));
    }

    #[test]
    fn test_symbols_are_independent() {
        let mut d = detector();
        d.update(&snap("A", 0, 100.0));
        d.update(&snap("B", 0, 100.0));
        assert!(d.update(&snap("A", 1, 130.0)).is_pumped());
        assert!(!d.update(&snap("B", 1, 101.0)).is_pumped());
        assert_eq!(d.pumped_symbols(), vec!["A"]);
        assert_eq!(d.tracked_count(), 2);
    }
}
