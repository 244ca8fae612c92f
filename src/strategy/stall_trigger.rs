//! Stall detection after a pump
//!
//! Two rules, both switchable:
//! - retrace: price pulled back at least `retrace_pct` from the episode peak
//!   and no new peak was printed for `stall_ticks` ticks
//! - momentum flip: the price delta over the last `momentum_lookback_ticks`
//!   samples turned non-positive after having been positive this episode
//!
//! Retrace is checked first. Entry gates (near-high ratio, turnover, blocked
//! patterns) can veto a stall without consuming the episode.

use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info};

use super::pump_detector::PumpState;
use super::types::{Episode, Signal, SignalKind, StallReason};
use crate::config::StallConfig;
use crate::error::{Error, Result};
use crate::market::Snapshot;

/// Per-symbol stall bookkeeping for the running episode
#[derive(Debug, Clone)]
struct StallTracker {
    peak_seen: f64,
    ticks_since_peak: u32,
    momentum_was_positive: bool,
}

/// Decides when a pumped symbol has stalled
pub struct StallTrigger {
    config: StallConfig,
    blocked: Vec<Regex>,
    trackers: HashMap<String, StallTracker>,
}

impl StallTrigger {
    /// Build a trigger; fails on an invalid blocked pattern
    pub fn new(config: StallConfig, blocked_patterns: &[String]) -> Result<Self> {
        let blocked = blocked_patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| Error::Config(format!("Invalid blocked pattern '{}': {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            blocked,
            trackers: HashMap::new(),
        })
    }

    /// Whether a symbol matches any blocked pattern
    pub fn is_blocked(&self, symbol: &str) -> bool {
        self.blocked.iter().any(|re| re.is_match(symbol))
    }

    /// Evaluate the current tick of a live episode
    ///
    /// Returns at most one signal. Once a signal is returned the caller owns
    /// the episode's fate; the tracker is dropped.
    pub fn evaluate(
        &mut self,
        state: &PumpState,
        episode: &Episode,
        snapshot: &Snapshot,
    ) -> Option<Signal> {
        if self.is_blocked(&snapshot.symbol) {
            debug!("{} matches a blocked pattern, no entry", snapshot.symbol);
            return None;
        }

        let lookback = self.config.momentum_lookback_ticks;
        let delta = state
            .window
            .price_back(lookback)
            .map(|past| snapshot.price - past);

        let first_look = !self.trackers.contains_key(&snapshot.symbol);
        let tracker = self
            .trackers
            .entry(snapshot.symbol.clone())
            .or_insert_with(|| StallTracker {
                peak_seen: episode.peak_price.max(snapshot.price),
                ticks_since_peak: 0,
                momentum_was_positive: false,
            });

        if !first_look {
            if snapshot.price > tracker.peak_seen {
                tracker.peak_seen = snapshot.price;
                tracker.ticks_since_peak = 0;
            } else {
                tracker.ticks_since_peak += 1;
            }
        }

        // Flip needs a positive delta seen on an earlier tick
        let flipped = matches!(delta, Some(d) if d <= 0.0) && tracker.momentum_was_positive;
        if matches!(delta, Some(d) if d > 0.0) {
            tracker.momentum_was_positive = true;
        }

        let pullback_pct = (episode.peak_price - snapshot.price) / episode.peak_price * 100.0;

        let reason = if self.config.retrace_enabled
            && tracker.ticks_since_peak >= self.config.stall_ticks
            && pullback_pct >= self.config.retrace_pct
        {
            StallReason::Retrace {
                pullback_pct,
                ticks_since_peak: tracker.ticks_since_peak,
            }
        } else if self.config.momentum_enabled && flipped {
            StallReason::MomentumFlip {
                delta: delta.unwrap_or_default(),
                lookback,
            }
        } else {
            return None;
        };

        if let Some(veto) = self.gate(state, snapshot) {
            debug!("{} stall ({}) vetoed: {}", snapshot.symbol, reason, veto);
            return None;
        }

        self.trackers.remove(&snapshot.symbol);

        info!(
            "{} stalled at {} (peak {}): {}",
            snapshot.symbol, snapshot.price, episode.peak_price, reason
        );

        Some(Signal {
            symbol: snapshot.symbol.clone(),
            timestamp: snapshot.timestamp,
            trigger_price: snapshot.price,
            kind: SignalKind::EntryShort,
            reason,
            episode: *episode,
        })
    }

    /// Entry gates; returns the veto reason if any
    fn gate(&self, state: &PumpState, snapshot: &Snapshot) -> Option<String> {
        if self.config.near_high_ratio > 0.0 {
            if let Some(high) = state.window.max_price() {
                let ratio = snapshot.price / high;
                if ratio < self.config.near_high_ratio {
                    return Some(format!(
                        "price {:.3} of window high, need {:.3}",
                        ratio, self.config.near_high_ratio
                    ));
                }
            }
        }

        if self.config.min_turnover_24h > 0.0 {
            let turnover = state.window.turnover();
            if turnover < self.config.min_turnover_24h {
                return Some(format!(
                    "window turnover {:.0} below {:.0}",
                    turnover, self.config.min_turnover_24h
                ));
            }
        }

        None
    }

    /// Forget stall bookkeeping for a symbol
    pub fn reset(&mut self, symbol: &str) {
        self.trackers.remove(symbol);
    }

    /// Number of symbols with stall bookkeeping
    pub fn watching(&self) -> usize {
        self.trackers.len()
    }
}
