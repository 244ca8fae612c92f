//! Strategy Engine
//!
//! Per-tick coordinator shared by backtest and live runs. One call to
//! [`StrategyEngine::on_tick`] runs to completion before the next starts:
//!
//! 1. validate ordering and fields (bad ticks are dropped, not fatal)
//! 2. update the pump detector and the symbol's phase
//! 3. if the symbol holds a position, check its exits and stop there
//! 4. otherwise, while the episode is live, ask the stall trigger and open
//!    a short on a signal
//!
//! A pump episode produces at most one signal. A signal refused by risk,
//! or whose order the exchange failed to confirm, still consumes the episode:
//! an unconfirmed submit may have filled, so it is never sent twice.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::pump_detector::{PumpDetector, PumpState};
use super::stall_trigger::StallTrigger;
use super::types::{Episode, PumpStatus, Signal, SymbolPhase};
use crate::config::Config;
use crate::error::{DataError, Error, Result};
use crate::market::{SequenceGuard, Snapshot};
use crate::position::{
    AccountState, ExitReason, Position, PositionManager, PositionUpdate, RiskBlock, Trade,
};
use crate::trading::OrderGateway;

/// What a tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Snapshot failed validation and was ignored
    Dropped(DataError),
    /// Nothing to do
    Idle,
    /// Open position marked, no exit
    Holding(Position),
    /// Open position closed
    Exited(Trade),
    /// New short opened
    Opened(Position),
    /// Stall signal refused by risk; the episode is consumed
    Rejected { signal: Signal, block: RiskBlock },
}

/// Engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineStats {
    pub ticks_processed: u64,
    pub ticks_dropped: u64,
    pub signals: u64,
    pub signals_rejected: u64,
    pub episodes_expired: u64,
}

/// Main strategy engine
pub struct StrategyEngine<G> {
    guard: SequenceGuard,
    detector: PumpDetector,
    trigger: StallTrigger,
    positions: PositionManager<G>,
    phases: HashMap<String, SymbolPhase>,
    episode_ttl: Duration,
    stats: EngineStats,
}

impl<G: OrderGateway> StrategyEngine<G> {
    /// Build an engine; fails on invalid configuration
    pub fn new(config: &Config, account: AccountState, gateway: G) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            guard: SequenceGuard::new(),
            detector: PumpDetector::new(&config.pump),
            trigger: StallTrigger::new(config.stall.clone(), &config.filters.blocked_patterns)?,
            positions: PositionManager::new(config.risk.clone(), account, gateway),
            phases: HashMap::new(),
            episode_ttl: config.stall.episode_ttl(),
            stats: EngineStats::default(),
        })
    }

    /// Process one snapshot
    ///
    /// Only gateway failures are errors; they leave position state as it
    /// was before the failed call. A failed submit still uses up the episode.
    pub fn on_tick(&mut self, snapshot: &Snapshot) -> Result<TickOutcome> {
        if let Err(e) = self.guard.check(snapshot) {
            self.stats.ticks_dropped += 1;
            warn!("Dropping snapshot: {}", e);
            return Ok(TickOutcome::Dropped(e));
        }
        self.guard.accept(snapshot);
        self.stats.ticks_processed += 1;

        let status = self.detector.update(snapshot);
        let live_episode = self.advance_phase(snapshot, &status);

        if self.positions.has_open(&snapshot.symbol) {
            return match self.positions.update(snapshot)? {
                Some(PositionUpdate::Closed(trade)) => Ok(TickOutcome::Exited(trade)),
                Some(PositionUpdate::Holding(position)) => Ok(TickOutcome::Holding(position)),
                None => Ok(TickOutcome::Idle),
            };
        }

        let Some(episode) = live_episode else {
            return Ok(TickOutcome::Idle);
        };

        let signal = match self.detector.state(&snapshot.symbol) {
            Some(state) => self.trigger.evaluate(state, &episode, snapshot),
            None => None,
        };
        if !status.is_pumped() {
            // Closing tick of the episode had its last look
            self.trigger.reset(&snapshot.symbol);
        }

        match signal {
            Some(signal) => self.enter(signal, status.is_pumped()),
            None => Ok(TickOutcome::Idle),
        }
    }

    /// Move the symbol's phase forward; returns the episode if a stall may
    /// still fire on this tick
    fn advance_phase(&mut self, snapshot: &Snapshot, status: &PumpStatus) -> Option<Episode> {
        let phase = self.phases.entry(snapshot.symbol.clone()).or_default();

        match *status {
            PumpStatus::Insufficient | PumpStatus::NotPumped { .. } => {
                *phase = SymbolPhase::NotPumped;
                None
            }
            PumpStatus::Pumped { episode, .. } => match *phase {
                SymbolPhase::NotPumped => {
                    *phase = SymbolPhase::Pumped { episode };
                    Some(episode)
                }
                SymbolPhase::Pumped { episode: ref mut current } => {
                    current.peak_price = episode.peak_price;
                    if snapshot.timestamp - episode.since > self.episode_ttl {
                        info!(
                            "{} pump episode since {} expired without a stall",
                            snapshot.symbol, episode.since
                        );
                        *phase = SymbolPhase::Expired { episode };
                        self.stats.episodes_expired += 1;
                        self.trigger.reset(&snapshot.symbol);
                        None
                    } else {
                        Some(episode)
                    }
                }
                SymbolPhase::SignalConsumed { signalled_at, .. } => {
                    *phase = SymbolPhase::SignalConsumed {
                        episode,
                        signalled_at,
                    };
                    None
                }
                SymbolPhase::Expired { .. } => {
                    *phase = SymbolPhase::Expired { episode };
                    None
                }
            },
            PumpStatus::EpisodeEnded { episode, .. } => {
                let was_live = phase.accepts_signal();
                *phase = SymbolPhase::NotPumped;
                if was_live {
                    Some(episode)
                } else {
                    self.trigger.reset(&snapshot.symbol);
                    None
                }
            }
        }
    }

    fn enter(&mut self, signal: Signal, still_pumped: bool) -> Result<TickOutcome> {
        self.stats.signals += 1;

        let result = self.positions.open(&signal);

        // Opened, refused or unconfirmed, the episode has had its signal
        if still_pumped {
            self.phases.insert(
                signal.symbol.clone(),
                SymbolPhase::SignalConsumed {
                    episode: signal.episode,
                    signalled_at: signal.timestamp,
                },
            );
        }

        match result {
            Ok(position) => Ok(TickOutcome::Opened(position)),
            Err(Error::RiskLimitExceeded(block)) => {
                self.stats.signals_rejected += 1;
                info!(
                    "{} signal at {} rejected: {}",
                    signal.symbol,
                    signal.trigger_price,
                    block.description()
                );
                Ok(TickOutcome::Rejected { signal, block })
            }
            Err(e) => Err(e),
        }
    }

    /// Close one position at its last seen price
    pub fn close_position(&mut self, symbol: &str, reason: ExitReason) -> Result<Trade> {
        self.positions.close(symbol, reason)
    }

    /// Close every open position, in symbol order
    pub fn close_all(&mut self, reason: ExitReason) -> Result<Vec<Trade>> {
        let symbols = self.positions.open_symbols();
        if !symbols.is_empty() {
            debug!("Closing {} open positions ({})", symbols.len(), reason);
        }
        symbols
            .iter()
            .map(|symbol| self.positions.close(symbol, reason))
            .collect()
    }

    pub fn account(&self) -> &AccountState {
        self.positions.account()
    }

    pub fn positions(&self) -> &PositionManager<G> {
        &self.positions
    }

    pub fn trades(&self) -> &[Trade] {
        self.positions.trades()
    }

    pub fn phase(&self, symbol: &str) -> SymbolPhase {
        self.phases.get(symbol).copied().unwrap_or_default()
    }

    pub fn pump_state(&self, symbol: &str) -> Option<&PumpState> {
        self.detector.state(symbol)
    }

    pub fn pumped_symbols(&self) -> Vec<&str> {
        self.detector.pumped_symbols()
    }

    pub fn last_seen(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.guard.last_seen(symbol)
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn gateway(&self) -> &G {
        self.positions.gateway()
    }
}
