//! Configuration loading and validation

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pump: PumpConfig,
    #[serde(default)]
    pub stall: StallConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub live: LiveConfig,
}

/// Pump detection over the trailing window
#[derive(Debug, Clone, Deserialize)]
pub struct PumpConfig {
    /// Gain from the window low (percent) that flags a pump
    #[serde(default = "default_pump_threshold")]
    pub threshold_pct: f64,
    /// Length of the trailing window in hours
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

impl PumpConfig {
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.window_hours))
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            threshold_pct: default_pump_threshold(),
            window_hours: default_window_hours(),
        }
    }
}

/// Stall (entry) trigger configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StallConfig {
    /// Enable the retrace-from-peak rule
    #[serde(default = "default_true")]
    pub retrace_enabled: bool,
    /// Minimum pullback from the episode peak (percent)
    #[serde(default = "default_retrace_pct")]
    pub retrace_pct: f64,
    /// Consecutive ticks without a new peak required by the retrace rule
    #[serde(default = "default_stall_ticks")]
    pub stall_ticks: u32,
    /// Enable the momentum sign-flip rule
    #[serde(default = "default_true")]
    pub momentum_enabled: bool,
    /// Lookback (ticks) for the momentum delta
    #[serde(default = "default_momentum_lookback")]
    pub momentum_lookback_ticks: usize,
    /// Stop watching an episode that has not signalled after this many hours
    #[serde(default = "default_episode_ttl_hours")]
    pub episode_ttl_hours: u32,
    /// Trigger price must be at least this fraction of the window high (0 disables)
    #[serde(default = "default_near_high_ratio")]
    pub near_high_ratio: f64,
    /// Minimum quote turnover inside the window (0 disables)
    #[serde(default)]
    pub min_turnover_24h: f64,
}

impl StallConfig {
    pub fn episode_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.episode_ttl_hours))
    }
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            retrace_enabled: true,
            retrace_pct: default_retrace_pct(),
            stall_ticks: default_stall_ticks(),
            momentum_enabled: true,
            momentum_lookback_ticks: default_momentum_lookback(),
            episode_ttl_hours: default_episode_ttl_hours(),
            near_high_ratio: default_near_high_ratio(),
            min_turnover_24h: 0.0,
        }
    }
}

/// Position sizing, exits and account-level risk limits
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Fraction of current equity committed per trade (percent)
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade_pct: f64,
    /// Stop-loss distance above entry (percent)
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    /// Take-profit distance below entry (percent)
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    /// Close after this many ticks of the symbol
    #[serde(default = "default_max_holding_ticks")]
    pub max_holding_ticks: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_positions: usize,
    /// Sum of open notionals as a percent of equity
    #[serde(default = "default_max_exposure_pct")]
    pub max_exposure_pct: f64,
    /// Taker fee charged on entry and exit notional (percent)
    #[serde(default = "default_taker_fee_pct")]
    pub taker_fee_pct: f64,
    /// Adverse slippage on every fill, entry and exit (percent)
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: f64,
    /// No new entry on a symbol for this long after it closed (data time)
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
    /// Pause entries after this many losing trades in a row (0 disables)
    #[serde(default = "default_consecutive_loss_limit")]
    pub consecutive_loss_limit: u32,
    /// Length of that pause (data time)
    #[serde(default = "default_loss_pause_minutes")]
    pub loss_pause_minutes: u32,
    /// Block entries when equity is this far below its peak (percent, 0 disables)
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    /// Block entries once the UTC day lost this much of its opening equity (percent, 0 disables)
    #[serde(default = "default_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: f64,
    /// Scale size by the symbol's own track record
    #[serde(default)]
    pub adaptive_sizing: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: default_risk_per_trade(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_holding_ticks: default_max_holding_ticks(),
            max_concurrent_positions: default_max_concurrent(),
            max_exposure_pct: default_max_exposure_pct(),
            taker_fee_pct: default_taker_fee_pct(),
            slippage_pct: default_slippage_pct(),
            cooldown_minutes: default_cooldown_minutes(),
            consecutive_loss_limit: default_consecutive_loss_limit(),
            loss_pause_minutes: default_loss_pause_minutes(),
            max_drawdown_pct: default_max_drawdown_pct(),
            daily_loss_limit_pct: default_daily_loss_limit_pct(),
            adaptive_sizing: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_initial_equity")]
    pub initial_equity: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_equity: default_initial_equity(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterConfig {
    /// Symbols matching any of these never signal
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BacktestConfig {
    /// Close positions still open when the history runs out
    #[serde(default = "default_true")]
    pub close_open_at_end: bool,
    /// Mark-to-market equity sample every N ticks (0 = only at trade closes)
    #[serde(default)]
    pub equity_sample_every_ticks: u64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            close_open_at_end: true,
            equity_sample_every_ticks: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default = "default_snapshot_every_ticks")]
    pub snapshot_every_ticks: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            snapshot_every_ticks: default_snapshot_every_ticks(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

// Default value functions
fn default_pump_threshold() -> f64 {
    25.0
}

fn default_window_hours() -> u32 {
    24
}

fn default_retrace_pct() -> f64 {
    5.0
}

fn default_stall_ticks() -> u32 {
    2
}

fn default_momentum_lookback() -> usize {
    4
}

fn default_episode_ttl_hours() -> u32 {
    24
}

fn default_near_high_ratio() -> f64 {
    0.88
}

fn default_risk_per_trade() -> f64 {
    4.0
}

fn default_stop_loss_pct() -> f64 {
    300.0
}

fn default_take_profit_pct() -> f64 {
    40.0
}

fn default_max_holding_ticks() -> u64 {
    288
}

fn default_max_concurrent() -> usize {
    100
}

fn default_max_exposure_pct() -> f64 {
    400.0
}

fn default_taker_fee_pct() -> f64 {
    0.06
}

fn default_slippage_pct() -> f64 {
    0.05
}

fn default_cooldown_minutes() -> u32 {
    60
}

fn default_consecutive_loss_limit() -> u32 {
    3
}

fn default_loss_pause_minutes() -> u32 {
    60
}

fn default_max_drawdown_pct() -> f64 {
    20.0
}

fn default_daily_loss_limit_pct() -> f64 {
    5.0
}

fn default_initial_equity() -> f64 {
    1000.0
}

fn default_state_dir() -> String {
    std::env::var("DATA_DIR").unwrap_or_else(|_| "./data/state".into())
}

fn default_snapshot_every_ticks() -> u64 {
    100
}

fn default_channel_capacity() -> usize {
    10000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix PUMPSHORT__)
            .add_source(
                config::Environment::with_prefix("PUMPSHORT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Pump detection
        require_positive("pump.threshold_pct", self.pump.threshold_pct)?;
        if self.pump.threshold_pct > 1000.0 {
            return Err(Error::Config(format!(
                "pump.threshold_pct {} is above 1000",
                self.pump.threshold_pct
            )));
        }
        if self.pump.window_hours == 0 {
            return Err(Error::Config("pump.window_hours must be positive".into()));
        }

        // Stall rules
        if !self.stall.retrace_enabled && !self.stall.momentum_enabled {
            return Err(Error::Config(
                "at least one of stall.retrace_enabled / stall.momentum_enabled must be set".into(),
            ));
        }
        if self.stall.retrace_enabled {
            require_positive("stall.retrace_pct", self.stall.retrace_pct)?;
            if self.stall.retrace_pct >= 100.0 {
                return Err(Error::Config("stall.retrace_pct must be below 100".into()));
            }
        }
        if self.stall.momentum_enabled && self.stall.momentum_lookback_ticks == 0 {
            return Err(Error::Config(
                "stall.momentum_lookback_ticks must be positive".into(),
            ));
        }
        if self.stall.episode_ttl_hours == 0 {
            return Err(Error::Config("stall.episode_ttl_hours must be positive".into()));
        }
        if !self.stall.near_high_ratio.is_finite()
            || !(0.0..=1.0).contains(&self.stall.near_high_ratio)
        {
            return Err(Error::Config("stall.near_high_ratio must be within [0, 1]".into()));
        }
        require_non_negative("stall.min_turnover_24h", self.stall.min_turnover_24h)?;

        // Sizing and exits
        require_positive("risk.risk_per_trade_pct", self.risk.risk_per_trade_pct)?;
        if self.risk.risk_per_trade_pct > 100.0 {
            return Err(Error::Config("risk.risk_per_trade_pct cannot exceed 100".into()));
        }
        require_positive("risk.stop_loss_pct", self.risk.stop_loss_pct)?;
        require_positive("risk.take_profit_pct", self.risk.take_profit_pct)?;
        if self.risk.take_profit_pct >= 100.0 {
            return Err(Error::Config(
                "risk.take_profit_pct must be below 100 (a short cannot gain more than the entry)"
                    .into(),
            ));
        }
        if self.risk.take_profit_pct >= self.risk.stop_loss_pct {
            return Err(Error::Config(format!(
                "risk.take_profit_pct ({}) must be below risk.stop_loss_pct ({})",
                self.risk.take_profit_pct, self.risk.stop_loss_pct
            )));
        }
        if self.risk.max_holding_ticks == 0 {
            return Err(Error::Config("risk.max_holding_ticks must be positive".into()));
        }
        if self.risk.max_concurrent_positions == 0 {
            return Err(Error::Config(
                "risk.max_concurrent_positions must be positive".into(),
            ));
        }
        require_positive("risk.max_exposure_pct", self.risk.max_exposure_pct)?;
        require_non_negative("risk.taker_fee_pct", self.risk.taker_fee_pct)?;
        require_non_negative("risk.slippage_pct", self.risk.slippage_pct)?;
        if self.risk.slippage_pct >= 100.0 {
            return Err(Error::Config(format!(
                "risk.slippage_pct ({}) must be below 100",
                self.risk.slippage_pct
            )));
        }
        require_non_negative("risk.max_drawdown_pct", self.risk.max_drawdown_pct)?;
        require_non_negative("risk.daily_loss_limit_pct", self.risk.daily_loss_limit_pct)?;

        // Account
        require_positive("account.initial_equity", self.account.initial_equity)?;

        // Validate filter patterns (compile regex to check)
        for pattern in &self.filters.blocked_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                Error::Config(format!("Invalid blocked_pattern regex {}: {}", pattern, e))
            })?;
        }

        if self.live.channel_capacity == 0 {
            return Err(Error::Config("live.channel_capacity must be positive".into()));
        }

        Ok(())
    }

    /// Human-readable configuration summary
    pub fn summary(&self) -> String {
        format!(
            r#"Configuration:
  Pump:
    threshold: {}% over {}h
  Stall:
    retrace: {} ({}% after {} ticks without a new peak)
    momentum: {} (lookback {} ticks)
    episode_ttl: {}h
    near_high_ratio: {}
    min_turnover_24h: {}
  Risk:
    risk_per_trade: {}%
    stop_loss: {}%
    take_profit: {}%
    max_holding: {} ticks
    max_concurrent_positions: {}
    max_exposure: {}%
    taker_fee: {}%
    slippage: {}%
    cooldown: {}m
    consecutive_loss_limit: {} (pause {}m)
    max_drawdown: {}%
    daily_loss_limit: {}%
    adaptive_sizing: {}
  Account:
    initial_equity: {}
  Filters:
    blocked_patterns: {:?}
  Persistence:
    state_dir: {}
    snapshot_every: {} ticks
"#,
            self.pump.threshold_pct,
            self.pump.window_hours,
            self.stall.retrace_enabled,
            self.stall.retrace_pct,
            self.stall.stall_ticks,
            self.stall.momentum_enabled,
            self.stall.momentum_lookback_ticks,
            self.stall.episode_ttl_hours,
            self.stall.near_high_ratio,
            self.stall.min_turnover_24h,
            self.risk.risk_per_trade_pct,
            self.risk.stop_loss_pct,
            self.risk.take_profit_pct,
            self.risk.max_holding_ticks,
            self.risk.max_concurrent_positions,
            self.risk.max_exposure_pct,
            self.risk.taker_fee_pct,
            self.risk.slippage_pct,
            self.risk.cooldown_minutes,
            self.risk.consecutive_loss_limit,
            self.risk.loss_pause_minutes,
            self.risk.max_drawdown_pct,
            self.risk.daily_loss_limit_pct,
            self.risk.adaptive_sizing,
            self.account.initial_equity,
            self.filters.blocked_patterns,
            self.persistence.state_dir,
            self.persistence.snapshot_every_ticks,
        )
    }
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::Config(format!("{} must be positive, got {}", name, value)));
    }
    Ok(())
}

fn require_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::Config(format!(
            "{} must be non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}
