//! Error types for the pump-short core

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::position::risk::RiskBlock;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pump-short core
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Market data errors
    #[error("History load failed: {path}:{line}: {reason}")]
    HistoryParse {
        path: String,
        line: usize,
        reason: String,
    },

    // Risk errors
    #[error("Risk limit exceeded: {}", .0.description())]
    RiskLimitExceeded(RiskBlock),

    // Exchange errors
    #[error("Exchange error: {0}")]
    Exchange(String),

    // Position management errors
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Position persistence failed: {0}")]
    PositionPersistence(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

/// Data-quality problems with an incoming snapshot
///
/// Never fatal: the engine drops the tick and reports it in its outcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("snapshot has an empty symbol")]
    EmptySymbol,

    #[error("{symbol}: price {price} is not a finite positive number")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("{symbol}: volume {volume} is not a finite non-negative number")]
    InvalidVolume { symbol: String, volume: f64 },

    #[error("{symbol}: duplicate timestamp {timestamp}")]
    DuplicateTimestamp {
        symbol: String,
        timestamp: DateTime<Utc>,
    },

    #[error("{symbol}: out-of-order timestamp {timestamp} (last seen {last})")]
    OutOfOrder {
        symbol: String,
        timestamp: DateTime<Utc>,
        last: DateTime<Utc>,
    },
}

impl Error {
    /// Check if this error needs a human before trading continues
    pub fn needs_intervention(&self) -> bool {
        matches!(self, Error::Exchange(_) | Error::PositionPersistence(_))
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from config crate errors
impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
