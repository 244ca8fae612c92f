//! Shared types for the pump/stall strategy
//!
//! Per-symbol strategy state is an explicit tagged enum ([`SymbolPhase`])
//! instead of a set of flags, so every transition is visible in one match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One pump episode, from flag onset until the flag resets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Timestamp of the tick that flagged the pump
    pub since: DateTime<Utc>,
    /// Highest price seen since onset
    pub peak_price: f64,
}

/// Result of feeding one snapshot to the pump detector
#[derive(Debug, Clone, PartialEq)]
pub enum PumpStatus {
    /// Fewer than two points in the window
    Insufficient,
    /// Window gain below threshold, no episode running
    NotPumped { pct_change: f64 },
    /// Window gain at or above threshold
    Pumped {
        episode: Episode,
        pct_change: f64,
        /// True on the tick that started the episode
        onset: bool,
    },
    /// The flag reset on this tick; carries the finished episode
    EpisodeEnded { episode: Episode, pct_change: f64 },
}

impl PumpStatus {
    /// Whether the symbol is flagged after this tick
    pub fn is_pumped(&self) -> bool {
        matches!(self, PumpStatus::Pumped { .. })
    }

    /// Episode in effect during this tick (running or just ended)
    pub fn episode(&self) -> Option<&Episode> {
        match self {
            PumpStatus::Pumped { episode, .. } | PumpStatus::EpisodeEnded { episode, .. } => {
                Some(episode)
            }
            _ => None,
        }
    }

    /// Gain from the window low, when there was enough data
    pub fn pct_change(&self) -> Option<f64> {
        match self {
            PumpStatus::Insufficient => None,
            PumpStatus::NotPumped { pct_change }
            | PumpStatus::Pumped { pct_change, .. }
            | PumpStatus::EpisodeEnded { pct_change, .. } => Some(*pct_change),
        }
    }
}

/// Per-symbol strategy phase
///
/// `NotPumped -> Pumped -> SignalConsumed -> NotPumped`, with `Expired` as
/// the dead end of an episode that never stalled in time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum SymbolPhase {
    #[default]
    NotPumped,
    /// Watching for a stall
    Pumped { episode: Episode },
    /// This episode already produced its one signal
    SignalConsumed {
        episode: Episode,
        signalled_at: DateTime<Utc>,
    },
    /// Episode outlived its stall-watch TTL without a signal
    Expired { episode: Episode },
}

impl SymbolPhase {
    /// Whether a stall may still fire for the current episode
    pub fn accepts_signal(&self) -> bool {
        matches!(self, SymbolPhase::Pumped { .. })
    }

    pub fn episode(&self) -> Option<&Episode> {
        match self {
            SymbolPhase::NotPumped => None,
            SymbolPhase::Pumped { episode }
            | SymbolPhase::SignalConsumed { episode, .. }
            | SymbolPhase::Expired { episode } => Some(episode),
        }
    }
}

/// Signal kinds; this strategy only ever shorts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    EntryShort,
}

/// Which stall rule fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    /// Pullback from the episode peak with no new peak for a while
    Retrace {
        pullback_pct: f64,
        ticks_since_peak: u32,
    },
    /// Price delta over the lookback turned non-positive after being positive
    MomentumFlip { delta: f64, lookback: usize },
}

impl std::fmt::Display for StallReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StallReason::Retrace {
                pullback_pct,
                ticks_since_peak,
            } => write!(
                f,
                "retrace {:.2}% after {} ticks without a new peak",
                pullback_pct, ticks_since_peak
            ),
            StallReason::MomentumFlip { delta, lookback } => {
                write!(f, "momentum flip ({:+.6} over {} ticks)", delta, lookback)
            }
        }
    }
}

/// Entry signal produced by the stall trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub trigger_price: f64,
    pub kind: SignalKind,
    pub reason: StallReason,
    pub episode: Episode,
}
