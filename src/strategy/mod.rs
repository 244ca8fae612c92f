//! Pump-then-stall short strategy
//!
//! - `window` - rolling data-time price window
//! - `pump_detector` - flags symbols up `threshold_pct` over the window low
//! - `stall_trigger` - decides when a pumped symbol stalled
//! - `engine` - per-tick coordinator, owns positions through the gateway

pub mod engine;
pub mod pump_detector;
pub mod stall_trigger;
pub mod types;
pub mod window;

pub use engine::{EngineStats, StrategyEngine, TickOutcome};
pub use pump_detector::{PumpDetector, PumpState};
pub use stall_trigger::StallTrigger;
pub use types::{Episode, PumpStatus, Signal, SignalKind, StallReason, SymbolPhase};
pub use window::PriceWindow;
