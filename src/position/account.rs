//! Account state: equity and open positions
//!
//! Equity only moves when a position closes. Mark-to-market values are
//! derived on demand and never written back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::manager::{Position, Trade};

/// Everything a restart needs to continue trading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub initial_equity: f64,
    /// Realized equity in quote currency
    pub equity: f64,
    /// Highest realized equity so far
    pub peak_equity: f64,
    pub realized_pnl: f64,
    pub fees_paid: f64,
    /// Open positions keyed by symbol, at most one each
    pub open_positions: BTreeMap<String, Position>,
    pub closed_trades: u64,
    pub winning_trades: u64,
    /// Data time of the last change
    pub updated_at: Option<DateTime<Utc>>,
}

impl AccountState {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            initial_equity,
            equity: initial_equity,
            peak_equity: initial_equity,
            realized_pnl: 0.0,
            fees_paid: 0.0,
            open_positions: BTreeMap::new(),
            closed_trades: 0,
            winning_trades: 0,
            updated_at: None,
        }
    }

    pub fn open_count(&self) -> usize {
        self.open_positions.len()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.open_positions.contains_key(symbol)
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.open_positions.get(symbol)
    }

    /// Sum of entry notionals of open positions
    pub fn exposure(&self) -> f64 {
        self.open_positions.values().map(|p| p.notional).sum()
    }

    /// Unrealized P&L at each position's last seen price
    pub fn unrealized_pnl(&self) -> f64 {
        self.open_positions.values().map(|p| p.unrealized_pnl()).sum()
    }

    /// Realized equity plus unrealized P&L
    pub fn marked_equity(&self) -> f64 {
        self.equity + self.unrealized_pnl()
    }

    /// Realized drawdown from the equity peak, in percent
    pub fn drawdown_pct(&self) -> f64 {
        if self.peak_equity <= 0.0 {
            return 0.0;
        }
        ((self.peak_equity - self.equity) / self.peak_equity * 100.0).max(0.0)
    }

    /// Total return over initial equity, in percent
    pub fn return_pct(&self) -> f64 {
        if self.initial_equity <= 0.0 {
            return 0.0;
        }
        (self.equity - self.initial_equity) / self.initial_equity * 100.0
    }

    /// Book a closed trade
    pub(crate) fn record_trade(&mut self, trade: &Trade) {
        self.equity += trade.pnl;
        self.realized_pnl += trade.pnl;
        self.fees_paid += trade.fees;
        self.closed_trades += 1;
        if trade.pnl_pct > 0.0 {
            self.winning_trades += 1;
        }
        self.peak_equity = self.peak_equity.max(self.equity);
        self.updated_at = Some(trade.exit_time);
    }

    pub fn win_rate(&self) -> f64 {
        if self.closed_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.closed_trades as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::manager::ExitReason;
    use crate::trading::OrderId;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap()
    }

    fn position(symbol: &str, notional: f64, last_price: f64) -> Position {
        Position {
            symbol: symbol.to_string(),
            order_id: OrderId("sim-000001".into()),
            entry_price: 100.0,
            entry_fill: 100.0,
            entry_time: ts(0),
            size: notional / 100.0,
            notional,
            stop_loss_price: 103.0,
            take_profit_price: 98.0,
            ticks_held: 0,
            last_price,
            last_update: ts(0),
            low_price: 100.0,
            high_price: 100.0,
        }
    }

    fn trade(pnl: f64, pnl_pct: f64) -> Trade {
        Trade {
            symbol: "A".into(),
            order_id: OrderId("sim-000001".into()),
            entry_price: 100.0,
            exit_price: 100.0 - pnl_pct,
            entry_fill: 100.0,
            exit_fill: 100.0 - pnl_pct,
            entry_time: ts(0),
            exit_time: ts(2),
            size: 1.0,
            notional: 100.0,
            pnl_pct,
            pnl,
            fees: 0.1,
            slippage: 0.0,
            exit_reason: ExitReason::TakeProfit,
            ticks_held: 3,
            mfe_pct: 0.0,
            mae_pct: 0.0,
        }
    }

    #[test]
    fn test_exposure_and_marks() {
        let mut account = AccountState::new(1000.0);
        account.open_positions.insert("A".into(), position("A", 40.0, 90.0));
        account.open_positions.insert("B".into(), position("B", 40.0, 110.0));
        assert_eq!(account.exposure(), 80.0);
        // +10% on A, -10% on B
        assert!(account.unrealized_pnl().abs() < 1e-9);
        assert_eq!(account.marked_equity(), 1000.0);
        assert_eq!(account.open_count(), 2);
    }

    #[test]
    fn test_record_trade_and_drawdown() {
        let mut account = AccountState::new(1000.0);
        account.record_trade(&trade(100.0, 2.0));
        assert_eq!(account.equity, 1100.0);
        assert_eq!(account.peak_equity, 1100.0);

        account.record_trade(&trade(-220.0, -5.0));
        assert_eq!(account.equity, 880.0);
        assert!((account.drawdown_pct() - 20.0).abs() < 1e-9);
        assert_eq!(account.closed_trades, 2);
        assert_eq!(account.win_rate(), 0.5);
        assert!((account.return_pct() + 12.0).abs() < 1e-9);
        assert_eq!(account.updated_at, Some(ts(2)));
    }
}
