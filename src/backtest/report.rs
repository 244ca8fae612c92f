//! Backtest report and metrics

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::position::{AccountState, ExitReason, Trade};

/// One point of the equity curve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    /// Realized equity, plus unrealized P&L for periodic samples
    pub equity: f64,
    pub realized_pnl: f64,
    pub open_positions: usize,
}

/// Counters gathered while replaying
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunCounters {
    pub ticks_processed: u64,
    pub ticks_dropped: u64,
    pub signals: u64,
    pub signals_rejected: u64,
    pub positions_opened: u64,
    pub episodes_expired: u64,
}

/// Outcome of a backtest run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub initial_equity: f64,
    pub final_equity: f64,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Fraction of trades with a positive pnl_pct
    pub win_rate: f64,
    /// Net quote P&L after fees and slippage
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub total_fees: f64,
    pub total_slippage: f64,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    /// Gross quote profit over gross quote loss; `None` without losses
    pub profit_factor: Option<f64>,
    /// Average net quote P&L per trade
    pub expectancy: f64,
    pub max_drawdown_pct: f64,
    pub exits_by_reason: BTreeMap<ExitReason, usize>,
    pub counters: RunCounters,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
}

impl BacktestReport {
    /// Aggregate trades and the equity curve into a report
    pub fn build(
        account: &AccountState,
        trades: Vec<Trade>,
        equity_curve: Vec<EquityPoint>,
        counters: RunCounters,
    ) -> Self {
        let total_trades = trades.len();
        let (winners, losers): (Vec<&Trade>, Vec<&Trade>) =
            trades.iter().partition(|t| t.is_win());

        let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
        let gross_loss: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| -t.pnl).sum();
        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();

        let mut exits_by_reason = BTreeMap::new();
        for trade in &trades {
            *exits_by_reason.entry(trade.exit_reason).or_insert(0) += 1;
        }

        Self {
            initial_equity: account.initial_equity,
            final_equity: account.equity,
            total_trades,
            wins: winners.len(),
            losses: losers.len(),
            win_rate: ratio(winners.len() as f64, total_trades as f64),
            total_pnl,
            total_return_pct: account.return_pct(),
            total_fees: trades.iter().map(|t| t.fees).sum(),
            total_slippage: trades.iter().map(|t| t.slippage).sum(),
            avg_win_pct: mean(winners.iter().map(|t| t.pnl_pct)),
            avg_loss_pct: mean(losers.iter().map(|t| t.pnl_pct)),
            profit_factor: (gross_loss > 0.0).then(|| gross_profit / gross_loss),
            expectancy: ratio(total_pnl, total_trades as f64),
            max_drawdown_pct: max_drawdown_pct(&equity_curve),
            exits_by_reason,
            counters,
            equity_curve,
            trades,
        }
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        let profit_factor = self
            .profit_factor
            .map(|pf| format!("{:.2}", pf))
            .unwrap_or_else(|| "n/a".to_string());
        let exits = self
            .exits_by_reason
            .iter()
            .map(|(reason, count)| format!("{}={}", reason, count))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"Backtest results:
  Equity: {:.2} -> {:.2} ({:+.2}%)
  Trades: {} ({} wins / {} losses, win rate {:.1}%)
  Net P&L: {:+.2} (fees {:.2}, slippage {:.2})
  Avg win: {:+.2}%  Avg loss: {:+.2}%
  Profit factor: {}  Expectancy: {:+.4}/trade
  Max drawdown: {:.2}%
  Exits: {}
  Ticks: {} processed, {} dropped
  Signals: {} ({} rejected, {} opened), {} episodes expired
"#,
            self.initial_equity,
            self.final_equity,
            self.total_return_pct,
            self.total_trades,
            self.wins,
            self.losses,
            self.win_rate * 100.0,
            self.total_pnl,
            self.total_fees,
            self.total_slippage,
            self.avg_win_pct,
            self.avg_loss_pct,
            profit_factor,
            self.expectancy,
            self.max_drawdown_pct,
            if exits.is_empty() { "none".to_string() } else { exits },
            self.counters.ticks_processed,
            self.counters.ticks_dropped,
            self.counters.signals,
            self.counters.signals_rejected,
            self.counters.positions_opened,
            self.counters.episodes_expired,
        )
    }

    /// Write the trade log as JSON Lines
    pub fn write_trades<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .map_err(|e| Error::Io(format!("Cannot create {}: {}", path.display(), e)))?;
        let mut writer = std::io::BufWriter::new(file);
        for trade in &self.trades {
            serde_json::to_writer(&mut writer, trade)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Largest peak-to-trough fall of the curve, in percent
pub fn max_drawdown_pct(curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for point in curve {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            worst = worst.max((peak - point.equity) / peak * 100.0);
        }
    }
    worst
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    ratio(sum, count as f64)
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::OrderId;
    use chrono::{Duration, TimeZone};

    fn ts(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn point(h: i64, equity: f64) -> EquityPoint {
        EquityPoint {
            timestamp: ts(h),
            equity,
            realized_pnl: equity - 1000.0,
            open_positions: 0,
        }
    }

    fn trade(pnl_pct: f64, reason: ExitReason) -> Trade {
        Trade {
            symbol: "A".into(),
            order_id: OrderId("sim-000001".into()),
            entry_price: 100.0,
            exit_price: 100.0 - pnl_pct,
            entry_fill: 100.0,
            exit_fill: 100.0 - pnl_pct,
            entry_time: ts(0),
            exit_time: ts(1),
            size: 0.4,
            notional: 40.0,
            pnl_pct,
            pnl: 40.0 * pnl_pct / 100.0,
            fees: 0.0,
            slippage: 0.0,
            exit_reason: reason,
            ticks_held: 1,
            mfe_pct: 0.0,
            mae_pct: 0.0,
        }
    }

    #[test]
    fn test_max_drawdown() {
        let curve = vec![point(0, 1000.0), point(1, 1200.0), point(2, 900.0), point(3, 1300.0)];
        assert!((max_drawdown_pct(&curve) - 25.0).abs() < 1e-9);
        assert_eq!(max_drawdown_pct(&[]), 0.0);
    }

    #[test]
    fn test_metrics() {
        let trades = vec![
            trade(40.0, ExitReason::TakeProfit),
            trade(40.0, ExitReason::TakeProfit),
            trade(-10.0, ExitReason::StopLoss),
            trade(0.0, ExitReason::Manual),
        ];
        let mut account = AccountState::new(1000.0);
        account.equity = 1028.0;

        let report = BacktestReport::build(&account, trades, vec![], RunCounters::default());
        assert_eq!(report.total_trades, 4);
        assert_eq!(report.wins, 2);
        assert_eq!(report.losses, 2);
        assert_eq!(report.win_rate, 0.5);
        assert!((report.total_pnl - 28.0).abs() < 1e-9);
        assert!((report.avg_win_pct - 40.0).abs() < 1e-9);
        assert!((report.avg_loss_pct + 5.0).abs() < 1e-9);
        assert!((report.profit_factor.unwrap() - 8.0).abs() < 1e-9);
        assert!((report.expectancy - 7.0).abs() < 1e-9);
        assert_eq!(report.exits_by_reason[&ExitReason::TakeProfit], 2);
        assert!(report.summary().contains("win rate 50.0%"));
    }

    #[test]
    fn test_empty_report() {
        let report = BacktestReport::build(
            &AccountState::new(1000.0),
            vec![],
            vec![point(0, 1000.0)],
            RunCounters::default(),
        );
        assert_eq!(report.win_rate, 0.0);
        assert_eq!(report.profit_factor, None);
        assert!(report.summary().contains("Exits: none"));
    }

    #[test]
    fn test_write_trades_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.jsonl");
        let report = BacktestReport::build(
            &AccountState::new(1000.0),
            vec![trade(40.0, ExitReason::TakeProfit), trade(-3.0, ExitReason::StopLoss)],
            vec![],
            RunCounters::default(),
        );
        report.write_trades(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"STOP_LOSS\""));
    }
}
