//! Position management
//!
//! Opens shorts on signals, checks exits on every tick and books closed
//! trades. State only changes after the gateway confirmed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::account::AccountState;
use super::risk::RiskGovernor;
use crate::config::RiskConfig;
use crate::error::{Error, Result};
use crate::market::Snapshot;
use crate::strategy::types::Signal;
use crate::trading::{OrderGateway, OrderId, ShortOrder};

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TimeExit,
    Manual,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::TimeExit => "TIME_EXIT",
            ExitReason::Manual => "MANUAL",
        };
        f.write_str(name)
    }
}

/// An open short; once closed it becomes a [`Trade`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub order_id: OrderId,
    /// Signal price; exits and pnl_pct are measured against it
    pub entry_price: f64,
    /// Price actually sold at, after slippage
    pub entry_fill: f64,
    pub entry_time: DateTime<Utc>,
    /// Base-asset quantity
    pub size: f64,
    /// Quote notional at entry
    pub notional: f64,
    /// Above entry
    pub stop_loss_price: f64,
    /// Below entry
    pub take_profit_price: f64,
    /// Ticks seen since entry, the entry tick excluded
    pub ticks_held: u64,
    pub last_price: f64,
    pub last_update: DateTime<Utc>,
    /// Lowest price seen while open (best for a short)
    pub low_price: f64,
    /// Highest price seen while open (worst for a short)
    pub high_price: f64,
}

impl Position {
    /// P&L percent of a short closed at `price`
    pub fn pnl_pct_at(&self, price: f64) -> f64 {
        (self.entry_price - price) / self.entry_price * 100.0
    }

    pub fn unrealized_pnl_pct(&self) -> f64 {
        self.pnl_pct_at(self.last_price)
    }

    /// Unrealized P&L in quote currency, before fees
    pub fn unrealized_pnl(&self) -> f64 {
        self.notional * self.unrealized_pnl_pct() / 100.0
    }

    /// Which exit, if any, the price triggers; stop loss wins ties
    pub fn exit_trigger(&self, price: f64, max_holding_ticks: u64) -> Option<ExitReason> {
        if price >= self.stop_loss_price {
            Some(ExitReason::StopLoss)
        } else if price <= self.take_profit_price {
            Some(ExitReason::TakeProfit)
        } else if max_holding_ticks > 0 && self.ticks_held >= max_holding_ticks {
            Some(ExitReason::TimeExit)
        } else {
            None
        }
    }

    fn mark(&mut self, snapshot: &Snapshot) {
        self.ticks_held += 1;
        self.last_price = snapshot.price;
        self.last_update = snapshot.timestamp;
        self.low_price = self.low_price.min(snapshot.price);
        self.high_price = self.high_price.max(snapshot.price);
    }
}

/// A closed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub order_id: OrderId,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_fill: f64,
    pub exit_fill: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub size: f64,
    pub notional: f64,
    /// Price move in the short's favour, percent of entry, before fees
    pub pnl_pct: f64,
    /// Quote P&L after fees and slippage
    pub pnl: f64,
    pub fees: f64,
    /// Quote cost of slippage on both fills
    pub slippage: f64,
    pub exit_reason: ExitReason,
    pub ticks_held: u64,
    /// Best unrealized move while open, percent
    pub mfe_pct: f64,
    /// Worst unrealized move while open, percent
    pub mae_pct: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl_pct > 0.0
    }
}

/// Result of marking an open position with a tick
#[derive(Debug, Clone, PartialEq)]
pub enum PositionUpdate {
    Holding(Position),
    Closed(Trade),
}

/// Owns the account, the risk governor and the gateway
pub struct PositionManager<G> {
    config: RiskConfig,
    account: AccountState,
    risk: RiskGovernor,
    gateway: G,
    trades: Vec<Trade>,
}

impl<G: OrderGateway> PositionManager<G> {
    /// Create a manager over an existing account (fresh or restored)
    pub fn new(config: RiskConfig, account: AccountState, gateway: G) -> Self {
        Self {
            risk: RiskGovernor::new(config.clone()),
            config,
            account,
            gateway,
            trades: Vec::new(),
        }
    }

    /// Open a short for a signal
    ///
    /// Risk refusals come back as [`Error::RiskLimitExceeded`], gateway
    /// failures as [`Error::Exchange`]. Neither changes any state.
    pub fn open(&mut self, signal: &Signal) -> Result<Position> {
        let multiplier = if self.config.adaptive_sizing {
            self.risk.size_multiplier(&signal.symbol)
        } else {
            1.0
        };
        let notional = self.account.equity * self.config.risk_per_trade_pct / 100.0 * multiplier;

        self.risk
            .check_entry(&self.account, &signal.symbol, notional, signal.timestamp)
            .map_err(Error::RiskLimitExceeded)?;

        let entry_price = signal.trigger_price;
        let slip = self.config.slippage_pct / 100.0;
        let order = ShortOrder {
            symbol: signal.symbol.clone(),
            size: notional / entry_price,
            reference_price: entry_price,
            stop_loss_price: entry_price * (1.0 + self.config.stop_loss_pct / 100.0),
            take_profit_price: entry_price * (1.0 - self.config.take_profit_pct / 100.0),
        };

        let order_id = self.gateway.submit_short(&order)?;

        let position = Position {
            symbol: order.symbol.clone(),
            order_id,
            entry_price,
            // A short sells into the bid
            entry_fill: entry_price * (1.0 - slip),
            entry_time: signal.timestamp,
            size: order.size,
            notional,
            stop_loss_price: order.stop_loss_price,
            take_profit_price: order.take_profit_price,
            ticks_held: 0,
            last_price: entry_price,
            last_update: signal.timestamp,
            low_price: entry_price,
            high_price: entry_price,
        };

        info!(
            "Opened short {} @ {} (notional {:.2}, SL {:.6}, TP {:.6}, {})",
            position.symbol,
            entry_price,
            notional,
            position.stop_loss_price,
            position.take_profit_price,
            position.order_id
        );

        self.account
            .open_positions
            .insert(position.symbol.clone(), position.clone());
        self.account.updated_at = Some(signal.timestamp);

        Ok(position)
    }

    /// Mark the symbol's position with a tick and close it on an exit trigger
    pub fn update(&mut self, snapshot: &Snapshot) -> Result<Option<PositionUpdate>> {
        let max_holding_ticks = self.config.max_holding_ticks;
        let Some(position) = self.account.open_positions.get_mut(&snapshot.symbol) else {
            return Ok(None);
        };

        position.mark(snapshot);

        match position.exit_trigger(snapshot.price, max_holding_ticks) {
            Some(reason) => {
                let trade =
                    self.close_at(&snapshot.symbol, reason, snapshot.price, snapshot.timestamp)?;
                Ok(Some(PositionUpdate::Closed(trade)))
            }
            None => {
                debug!(
                    "{} holding: {:+.2}% after {} ticks",
                    position.symbol,
                    position.unrealized_pnl_pct(),
                    position.ticks_held
                );
                Ok(Some(PositionUpdate::Holding(position.clone())))
            }
        }
    }

    /// Close at the last seen price
    pub fn close(&mut self, symbol: &str, reason: ExitReason) -> Result<Trade> {
        let position = self
            .account
            .open_positions
            .get(symbol)
            .ok_or_else(|| Error::PositionNotFound(symbol.to_string()))?;
        let (price, time) = (position.last_price, position.last_update);
        self.close_at(symbol, reason, price, time)
    }

    fn close_at(
        &mut self,
        symbol: &str,
        reason: ExitReason,
        exit_price: f64,
        exit_time: DateTime<Utc>,
    ) -> Result<Trade> {
        if !self.account.has_position(symbol) {
            return Err(Error::PositionNotFound(symbol.to_string()));
        }

        let confirmation = match self.gateway.close_position(symbol) {
            Ok(confirmation) => confirmation,
            Err(e) => {
                warn!("Close of {} ({}) not confirmed: {}", symbol, reason, e);
                return Err(e);
            }
        };

        let position = self
            .account
            .open_positions
            .remove(symbol)
            .ok_or_else(|| Error::PositionNotFound(symbol.to_string()))?;

        let pnl_pct = position.pnl_pct_at(exit_price);
        // Buying back pays the ask
        let exit_fill = exit_price * (1.0 + self.config.slippage_pct / 100.0);
        let slippage = position.size
            * ((position.entry_price - position.entry_fill) + (exit_fill - exit_price));
        let fee_rate = self.config.taker_fee_pct / 100.0;
        let fees = (position.notional + position.size * exit_price) * fee_rate;
        let pnl = position.notional * pnl_pct / 100.0 - fees - slippage;

        let trade = Trade {
            symbol: position.symbol.clone(),
            order_id: position.order_id.clone(),
            entry_price: position.entry_price,
            exit_price,
            entry_fill: position.entry_fill,
            exit_fill,
            entry_time: position.entry_time,
            exit_time,
            size: position.size,
            notional: position.notional,
            pnl_pct,
            pnl,
            fees,
            slippage,
            exit_reason: reason,
            ticks_held: position.ticks_held,
            mfe_pct: position.pnl_pct_at(position.low_price.min(exit_price)).max(0.0),
            mae_pct: (-position.pnl_pct_at(position.high_price.max(exit_price))).max(0.0),
        };

        self.account.record_trade(&trade);
        self.risk.record_close(&trade, self.account.equity);
        self.trades.push(trade.clone());

        info!(
            "Closed {} ({}) @ {}: {:+.2}% / {:+.2} quote, equity {:.2} ({})",
            trade.symbol,
            trade.exit_reason,
            trade.exit_price,
            trade.pnl_pct,
            trade.pnl,
            self.account.equity,
            confirmation.order_id
        );

        Ok(trade)
    }

    /// Symbols with open positions, sorted
    pub fn open_symbols(&self) -> Vec<String> {
        self.account.open_positions.keys().cloned().collect()
    }

    pub fn has_open(&self, symbol: &str) -> bool {
        self.account.has_position(symbol)
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn risk(&self) -> &RiskGovernor {
        &self.risk
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Closed trades in close order
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }
}
