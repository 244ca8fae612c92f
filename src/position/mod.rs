//! Position management module

pub mod account;
pub mod manager;
pub mod risk;
pub mod store;

pub use account::AccountState;
pub use manager::{ExitReason, Position, PositionManager, PositionUpdate, Trade};
pub use risk::{RiskBlock, RiskGovernor};
pub use store::StateStore;
