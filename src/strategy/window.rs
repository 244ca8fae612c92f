//! Rolling price window keyed on data time
//!
//! Samples are evicted relative to the newest sample's timestamp, never the
//! wall clock, so replays behave exactly like live runs.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// One sample in the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowEntry {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    /// Quote turnover of the tick
    pub turnover: f64,
}

/// Rolling window with O(1) min/max
#[derive(Debug, Clone)]
pub struct PriceWindow {
    samples: VecDeque<WindowEntry>,
    span: Duration,
    // Monotonic deques of candidates for min and max
    mins: VecDeque<WindowEntry>,
    maxs: VecDeque<WindowEntry>,
    turnover: f64,
}

impl PriceWindow {
    /// Create a window covering `span` of data time
    pub fn new(span: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            span,
            mins: VecDeque::new(),
            maxs: VecDeque::new(),
            turnover: 0.0,
        }
    }

    /// Add a sample and evict everything older than `timestamp - span`
    pub fn push(&mut self, timestamp: DateTime<Utc>, price: f64, turnover: f64) {
        let entry = WindowEntry {
            timestamp,
            price,
            turnover,
        };

        self.samples.push_back(entry);
        self.turnover += turnover;

        while self.mins.back().is_some_and(|e| e.price >= price) {
            self.mins.pop_back();
        }
        self.mins.push_back(entry);

        while self.maxs.back().is_some_and(|e| e.price <= price) {
            self.maxs.pop_back();
        }
        self.maxs.push_back(entry);

        self.evict(timestamp - self.span);
    }

    fn evict(&mut self, cutoff: DateTime<Utc>) {
        while let Some(front) = self.samples.front() {
            if front.timestamp >= cutoff {
                break;
            }
            self.turnover -= front.turnover;
            self.samples.pop_front();
        }
        while self.mins.front().is_some_and(|e| e.timestamp < cutoff) {
            self.mins.pop_front();
        }
        while self.maxs.front().is_some_and(|e| e.timestamp < cutoff) {
            self.maxs.pop_front();
        }
        if self.samples.is_empty() {
            self.turnover = 0.0;
        }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Lowest price in window
    pub fn min_price(&self) -> Option<f64> {
        self.mins.front().map(|e| e.price)
    }

    /// Highest price in window
    pub fn max_price(&self) -> Option<f64> {
        self.maxs.front().map(|e| e.price)
    }

    pub fn latest(&self) -> Option<&WindowEntry> {
        self.samples.back()
    }

    pub fn oldest(&self) -> Option<&WindowEntry> {
        self.samples.front()
    }

    /// Price `ticks` samples before the latest one
    pub fn price_back(&self, ticks: usize) -> Option<f64> {
        let len = self.samples.len();
        if ticks >= len {
            return None;
        }
        self.samples.get(len - 1 - ticks).map(|e| e.price)
    }

    /// Sum of quote turnover in window
    pub fn turnover(&self) -> f64 {
        self.turnover.max(0.0)
    }

    /// Time between oldest and newest sample
    pub fn covered(&self) -> Duration {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => Duration::zero(),
        }
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowEntry> {
        self.samples.iter()
    }
}
