//! Live and paper trading

pub mod runner;

pub use runner::{LiveRunner, LiveStats};
