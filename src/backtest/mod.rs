//! Backtesting over recorded snapshots

pub mod report;
pub mod runner;

pub use report::{BacktestReport, EquityPoint, RunCounters};
pub use runner::BacktestRunner;
