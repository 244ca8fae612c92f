//! Pump-and-stall short strategy
//!
//! Flags symbols that gained `threshold_pct` over their trailing 24h low,
//! waits for the move to stall and shorts with fixed stop-loss, take-profit
//! and holding-time exits. The same per-tick engine drives backtests and
//! live runs.

pub mod backtest;
pub mod cli;
pub mod config;
pub mod error;
pub mod live;
pub mod market;
pub mod position;
pub mod strategy;
pub mod trading;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
