//! Historical replay through the live strategy engine

use tracing::{debug, info};

use super::report::{BacktestReport, EquityPoint, RunCounters};
use crate::config::Config;
use crate::error::Result;
use crate::market::Snapshot;
use crate::position::{AccountState, ExitReason};
use crate::strategy::{StrategyEngine, TickOutcome};
use crate::trading::{OrderGateway, SimulatedGateway};

/// Replays snapshots in data time with a simulated gateway
///
/// Runs are independent: each `run` builds a fresh engine, so one runner can
/// be reused and several can run side by side.
pub struct BacktestRunner {
    config: Config,
}

impl BacktestRunner {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replay a history and report
    ///
    /// Input is stable-sorted by timestamp, so per-symbol files may simply
    /// be concatenated.
    pub fn run<I>(&self, history: I) -> Result<BacktestReport>
    where
        I: IntoIterator<Item = Snapshot>,
    {
        let mut snapshots: Vec<Snapshot> = history.into_iter().collect();
        snapshots.sort_by_key(|s| s.timestamp);

        let account = AccountState::new(self.config.account.initial_equity);
        let mut engine = StrategyEngine::new(&self.config, account, SimulatedGateway::new())?;

        let mut curve = Vec::new();
        if let Some(first) = snapshots.first() {
            curve.push(point(&engine, first, false));
        }

        let sample_every = self.config.backtest.equity_sample_every_ticks;
        let mut counters = RunCounters::default();

        info!("Replaying {} snapshots", snapshots.len());

        for (idx, snapshot) in snapshots.iter().enumerate() {
            match engine.on_tick(snapshot)? {
                TickOutcome::Exited(_) => curve.push(point(&engine, snapshot, false)),
                TickOutcome::Opened(_) => counters.positions_opened += 1,
                TickOutcome::Dropped(e) => debug!("Tick {} dropped: {}", idx, e),
                TickOutcome::Rejected { .. } | TickOutcome::Holding(_) | TickOutcome::Idle => {}
            }

            if sample_every > 0 && (idx as u64 + 1) % sample_every == 0 {
                curve.push(point(&engine, snapshot, true));
            }
        }

        if self.config.backtest.close_open_at_end {
            let closed = engine.close_all(ExitReason::Manual)?;
            if let (false, Some(last)) = (closed.is_empty(), snapshots.last()) {
                info!("Closed {} positions at end of data", closed.len());
                curve.push(point(&engine, last, false));
            }
        }

        let stats = engine.stats();
        counters.ticks_processed = stats.ticks_processed;
        counters.ticks_dropped = stats.ticks_dropped;
        counters.signals = stats.signals;
        counters.signals_rejected = stats.signals_rejected;
        counters.episodes_expired = stats.episodes_expired;

        let report = BacktestReport::build(
            engine.account(),
            engine.trades().to_vec(),
            curve,
            counters,
        );

        info!(
            "Backtest done: {} trades, win rate {:.1}%, final equity {:.2}",
            report.total_trades,
            report.win_rate * 100.0,
            report.final_equity
        );

        Ok(report)
    }
}

fn point<G: OrderGateway>(
    engine: &StrategyEngine<G>,
    snapshot: &Snapshot,
    mark_to_market: bool,
) -> EquityPoint {
    let account = engine.account();
    EquityPoint {
        timestamp: snapshot.timestamp,
        equity: if mark_to_market {
            account.marked_equity()
        } else {
            account.equity
        },
        realized_pnl: account.realized_pnl,
        open_positions: account.open_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn ts(step: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(step * 15)
    }

    fn config() -> Config {
        Config {
            risk: RiskConfig {
                stop_loss_pct: 3.0,
                take_profit_pct: 2.0,
                taker_fee_pct: 0.0,
                cooldown_minutes: 0,
                consecutive_loss_limit: 0,
                max_drawdown_pct: 0.0,
                daily_loss_limit_pct: 0.0,
                ..RiskConfig::default()
            },
            ..Config::default()
        }
    }

    fn path(symbol: &str, prices: &[f64]) -> Vec<Snapshot> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| Snapshot::new(symbol, ts(i as i64), *p, 1.0))
            .collect()
    }

    #[test]
    fn test_stop_loss_round_trip() {
        let runner = BacktestRunner::new(config()).unwrap();
        let report = runner
            .run(path("A", &[100.0, 100.0, 126.0, 130.0, 128.0, 120.0, 124.0]))
            .unwrap();

        assert_eq!(report.total_trades, 1);
        assert_eq!(report.trades[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(report.counters.positions_opened, 1);
        assert_eq!(report.win_rate, 0.0);
        // Start plus one close
        assert_eq!(report.equity_curve.len(), 2);
        assert!(report.final_equity < 1000.0);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let runner = BacktestRunner::new(config()).unwrap();
        let mut history = path("A", &[100.0, 100.0, 126.0, 130.0, 128.0, 120.0, 124.0]);
        let sorted = runner.run(history.clone()).unwrap();
        history.reverse();
        let reversed = runner.run(history).unwrap();
        assert_eq!(sorted, reversed);
        assert_eq!(reversed.counters.ticks_dropped, 0);
    }

    #[test]
    fn test_open_positions_closed_at_end() {
        let runner = BacktestRunner::new(config()).unwrap();
        let report = runner
            .run(path("A", &[100.0, 100.0, 126.0, 130.0, 128.0, 120.0]))
            .unwrap();
        assert_eq!(report.total_trades, 1);
        assert_eq!(report.trades[0].exit_reason, ExitReason::Manual);
        assert_eq!(report.trades[0].exit_price, 120.0);

        let mut keep_open = config();
        keep_open.backtest.close_open_at_end = false;
        let report = BacktestRunner::new(keep_open)
            .unwrap()
            .run(path("A", &[100.0, 100.0, 126.0, 130.0, 128.0, 120.0]))
            .unwrap();
        assert_eq!(report.total_trades, 0);
    }

    #[test]
    fn test_periodic_equity_samples() {
        let mut cfg = config();
        cfg.backtest.equity_sample_every_ticks = 2;
        let report = BacktestRunner::new(cfg)
            .unwrap()
            .run(path("A", &[1.0, 1.0, 1.0, 1.0]))
            .unwrap();
        assert_eq!(report.equity_curve.len(), 3);
        assert!(report.equity_curve.iter().all(|p| p.equity == 1000.0));
    }

    #[test]
    fn test_empty_history() {
        let report = BacktestRunner::new(config()).unwrap().run(Vec::new()).unwrap();
        assert_eq!(report.total_trades, 0);
        assert!(report.equity_curve.is_empty());
        assert_eq!(report.final_equity, 1000.0);
    }
}
