//! Live loop
//!
//! Waits on the feed, hands each snapshot to the engine and persists what
//! changed. Cancellation is only observed between ticks.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::market::SnapshotFeed;
use crate::position::{AccountState, StateStore};
use crate::strategy::{StrategyEngine, TickOutcome};
use crate::trading::OrderGateway;

/// Counters for one live session
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LiveStats {
    pub ticks: u64,
    pub dropped: u64,
    pub opened: u64,
    pub closed: u64,
    pub rejected: u64,
    pub snapshots_saved: u64,
}

/// Drives a [`StrategyEngine`] from an async feed
pub struct LiveRunner<G> {
    engine: StrategyEngine<G>,
    store: Option<StateStore>,
    snapshot_every: u64,
    shutdown: CancellationToken,
    stats: LiveStats,
}

impl<G: OrderGateway> LiveRunner<G> {
    pub fn new(engine: StrategyEngine<G>, store: Option<StateStore>, snapshot_every: u64) -> Self {
        Self {
            engine,
            store,
            snapshot_every,
            shutdown: CancellationToken::new(),
            stats: LiveStats::default(),
        }
    }

    /// Build a runner, continuing from the store's account snapshot if any
    ///
    /// `gateway` receives the restored open symbols so it can close them.
    pub async fn restore<F>(config: &Config, store: StateStore, gateway: F) -> Result<Self>
    where
        F: FnOnce(&AccountState) -> G,
    {
        let account = match store.load_account().await? {
            Some(account) => account,
            None => {
                info!(
                    "No saved account in {}, starting with {:.2}",
                    store.dir().display(),
                    config.account.initial_equity
                );
                AccountState::new(config.account.initial_equity)
            }
        };

        let gateway = gateway(&account);
        let engine = StrategyEngine::new(config, account, gateway)?;
        Ok(Self::new(
            engine,
            Some(store),
            config.persistence.snapshot_every_ticks,
        ))
    }

    /// Token that stops the loop after the current tick
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the feed ends or shutdown is requested
    ///
    /// A gateway failure saves the account and stops the loop with the error.
    pub async fn run<F: SnapshotFeed>(&mut self, feed: &mut F) -> Result<LiveStats> {
        info!("Live runner started");

        loop {
            let snapshot = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                next = feed.next_snapshot() => match next {
                    Some(snapshot) => snapshot,
                    None => {
                        info!("Feed ended");
                        break;
                    }
                },
            };

            self.stats.ticks += 1;

            let outcome = match self.engine.on_tick(&snapshot) {
                Ok(outcome) => outcome,
                Err(e) => {
                    if e.needs_intervention() {
                        error!(
                            "Stopping on {}: {} (check the exchange before restarting)",
                            snapshot.symbol, e
                        );
                    } else {
                        error!("Stopping on {}: {}", snapshot.symbol, e);
                    }
                    self.save_account().await?;
                    return Err(e);
                }
            };

            match outcome {
                TickOutcome::Dropped(e) => {
                    self.stats.dropped += 1;
                    debug!("Dropped tick: {}", e);
                }
                TickOutcome::Opened(_) => {
                    self.stats.opened += 1;
                    self.save_account().await?;
                }
                TickOutcome::Exited(trade) => {
                    self.stats.closed += 1;
                    if let Some(store) = &self.store {
                        store.append_trade(&trade).await?;
                    }
                    self.save_account().await?;
                }
                TickOutcome::Rejected { .. } => self.stats.rejected += 1,
                TickOutcome::Holding(_) | TickOutcome::Idle => {}
            }

            if self.snapshot_every > 0 && self.stats.ticks % self.snapshot_every == 0 {
                self.save_account().await?;
            }
        }

        self.save_account().await?;
        info!(
            "Live runner stopped: {} ticks, {} opened, {} closed, {} open positions",
            self.stats.ticks,
            self.stats.opened,
            self.stats.closed,
            self.engine.account().open_count()
        );
        Ok(self.stats)
    }

    async fn save_account(&mut self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Err(e) = store.save_account(self.engine.account()).await {
            warn!("Account snapshot failed: {}", e);
            return Err(e);
        }
        self.stats.snapshots_saved += 1;
        Ok(())
    }

    pub fn engine(&self) -> &StrategyEngine<G> {
        &self.engine
    }

    pub fn stats(&self) -> LiveStats {
        self.stats
    }
}
