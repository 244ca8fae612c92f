//! Risk governor
//!
//! Gatekeeper for new entries. Checks run in a fixed order and the first
//! failing check is reported as a [`RiskBlock`]. All clocks are data time.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use super::account::AccountState;
use super::manager::Trade;
use crate::config::RiskConfig;

/// Reasons a new position is refused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBlock {
    /// Symbol already has an open position
    AlreadyOpen { symbol: String },
    /// Symbol closed a position too recently
    CoolingDown {
        symbol: String,
        until: DateTime<Utc>,
    },
    /// Paused after a losing streak
    TradingPaused {
        reason: String,
        until: DateTime<Utc>,
    },
    /// Realized drawdown from the equity peak too deep
    MaxDrawdownReached { drawdown_pct: f64, limit_pct: f64 },
    /// Realized loss for the UTC day too large
    DailyLossLimitReached { loss_pct: f64, limit_pct: f64 },
    /// Maximum number of concurrent positions reached
    MaxPositionsReached { current: usize, max: usize },
    /// Open notional would exceed the exposure cap
    MaxExposureReached { exposure_pct: f64, max_pct: f64 },
}

impl RiskBlock {
    /// Get human-readable description
    pub fn description(&self) -> String {
        match self {
            RiskBlock::AlreadyOpen { symbol } => {
                format!("Position already open for {}", symbol)
            }
            RiskBlock::CoolingDown { symbol, until } => {
                format!("{} cooling down until {}", symbol, until.format("%Y-%m-%d %H:%M"))
            }
            RiskBlock::TradingPaused { reason, until } => {
                format!(
                    "Trading paused: {} (until {})",
                    reason,
                    until.format("%Y-%m-%d %H:%M")
                )
            }
            RiskBlock::MaxDrawdownReached {
                drawdown_pct,
                limit_pct,
            } => {
                format!("Max drawdown reached: {:.2}%/{:.2}%", drawdown_pct, limit_pct)
            }
            RiskBlock::DailyLossLimitReached {
                loss_pct,
                limit_pct,
            } => {
                format!("Daily loss limit: {:.2}%/{:.2}%", loss_pct, limit_pct)
            }
            RiskBlock::MaxPositionsReached { current, max } => {
                format!("Max positions reached: {}/{}", current, max)
            }
            RiskBlock::MaxExposureReached {
                exposure_pct,
                max_pct,
            } => {
                format!("Max exposure reached: {:.1}%/{:.1}% of equity", exposure_pct, max_pct)
            }
        }
    }
}

/// Closed-trade record per symbol, used for cooldown and adaptive sizing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub trades: u32,
    pub wins: u32,
    /// Worst trade so far in percent; 0 until a trade closes
    pub worst_pnl_pct: f64,
    pub last_close: Option<DateTime<Utc>>,
}

impl SymbolRecord {
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades as f64
    }
}

/// Entry gatekeeper
pub struct RiskGovernor {
    config: RiskConfig,
    symbols: HashMap<String, SymbolRecord>,
    consecutive_losses: u32,
    paused_until: Option<DateTime<Utc>>,
    pause_reason: Option<String>,
    /// UTC day being tracked and realized equity at its start
    day: Option<NaiveDate>,
    day_start_equity: f64,
}

impl RiskGovernor {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            symbols: HashMap::new(),
            consecutive_losses: 0,
            paused_until: None,
            pause_reason: None,
            day: None,
            day_start_equity: 0.0,
        }
    }

    /// Check whether a new position of `notional` may open for `symbol`
    pub fn check_entry(
        &mut self,
        account: &AccountState,
        symbol: &str,
        notional: f64,
        now: DateTime<Utc>,
    ) -> Result<(), RiskBlock> {
        self.roll_day(now, account.equity);

        if account.has_position(symbol) {
            return Err(RiskBlock::AlreadyOpen {
                symbol: symbol.to_string(),
            });
        }

        if self.config.cooldown_minutes > 0 {
            if let Some(last_close) = self.symbols.get(symbol).and_then(|r| r.last_close) {
                let until = last_close + Duration::minutes(self.config.cooldown_minutes as i64);
                if now < until {
                    return Err(RiskBlock::CoolingDown {
                        symbol: symbol.to_string(),
                        until,
                    });
                }
            }
        }

        if let Some(until) = self.paused_until {
            if now < until {
                return Err(RiskBlock::TradingPaused {
                    reason: self.pause_reason.clone().unwrap_or_default(),
                    until,
                });
            }
            info!("Trading pause lifted");
            self.paused_until = None;
            self.pause_reason = None;
        }

        if self.config.max_drawdown_pct > 0.0 {
            let drawdown_pct = account.drawdown_pct();
            if drawdown_pct >= self.config.max_drawdown_pct {
                return Err(RiskBlock::MaxDrawdownReached {
                    drawdown_pct,
                    limit_pct: self.config.max_drawdown_pct,
                });
            }
        }

        if self.config.daily_loss_limit_pct > 0.0 && self.day_start_equity > 0.0 {
            let loss_pct =
                (self.day_start_equity - account.equity) / self.day_start_equity * 100.0;
            if loss_pct >= self.config.daily_loss_limit_pct {
                return Err(RiskBlock::DailyLossLimitReached {
                    loss_pct,
                    limit_pct: self.config.daily_loss_limit_pct,
                });
            }
        }

        let current = account.open_count();
        if current >= self.config.max_concurrent_positions {
            return Err(RiskBlock::MaxPositionsReached {
                current,
                max: self.config.max_concurrent_positions,
            });
        }

        if account.equity <= 0.0 {
            return Err(RiskBlock::MaxExposureReached {
                exposure_pct: f64::INFINITY,
                max_pct: self.config.max_exposure_pct,
            });
        }
        let exposure_pct = (account.exposure() + notional) / account.equity * 100.0;
        if exposure_pct > self.config.max_exposure_pct {
            return Err(RiskBlock::MaxExposureReached {
                exposure_pct,
                max_pct: self.config.max_exposure_pct,
            });
        }

        Ok(())
    }

    /// Record a closed trade; `equity_after` is realized equity including it
    pub fn record_close(&mut self, trade: &Trade, equity_after: f64) {
        self.roll_day(trade.exit_time, equity_after - trade.pnl);

        let record = self.symbols.entry(trade.symbol.clone()).or_default();
        if record.trades == 0 || trade.pnl_pct < record.worst_pnl_pct {
            record.worst_pnl_pct = trade.pnl_pct;
        }
        record.trades += 1;
        if trade.pnl_pct > 0.0 {
            record.wins += 1;
        }
        record.last_close = Some(trade.exit_time);

        if trade.pnl < 0.0 {
            self.consecutive_losses += 1;
            let limit = self.config.consecutive_loss_limit;
            if limit > 0 && self.consecutive_losses >= limit {
                let until = trade.exit_time + Duration::minutes(self.config.loss_pause_minutes as i64);
                let reason = format!("{} consecutive losses", self.consecutive_losses);
                warn!("{}, pausing entries until {}", reason, until);
                self.paused_until = Some(until);
                self.pause_reason = Some(reason);
                self.consecutive_losses = 0;
            }
        } else {
            self.consecutive_losses = 0;
        }
    }

    /// Size multiplier from a symbol's own track record
    ///
    /// Half size until three trades exist, quarter size after a trade worse
    /// than -200%, half size below a 70% win rate, full size otherwise.
    pub fn size_multiplier(&self, symbol: &str) -> f64 {
        let Some(record) = self.symbols.get(symbol) else {
            return 0.5;
        };
        if record.trades < 3 {
            0.5
        } else if record.worst_pnl_pct < -200.0 {
            0.25
        } else if record.win_rate() < 0.7 {
            0.5
        } else {
            1.0
        }
    }

    fn roll_day(&mut self, now: DateTime<Utc>, equity: f64) {
        let today = now.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.day_start_equity = equity;
        }
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn paused_until(&self) -> Option<DateTime<Utc>> {
        self.paused_until
    }
}
