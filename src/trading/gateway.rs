//! Order gateway boundary
//!
//! Every financial action goes through [`OrderGateway`]. Calls are
//! synchronous from the engine's point of view and must confirm before any
//! position state changes. Failures surface as [`Error::Exchange`] and are
//! never retried here.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::error::{Error, Result};

/// Exchange-assigned order identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Market short with attached protective prices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortOrder {
    pub symbol: String,
    /// Base-asset quantity
    pub size: f64,
    /// Price the strategy expects to fill at
    pub reference_price: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
}

/// Confirmation that a position was flattened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseConfirmation {
    pub symbol: String,
    pub order_id: OrderId,
}

/// Exchange operations the strategy needs
pub trait OrderGateway: Send {
    /// Open a short; returns once the exchange confirmed
    fn submit_short(&mut self, order: &ShortOrder) -> Result<OrderId>;

    /// Close the whole position for a symbol
    fn close_position(&mut self, symbol: &str) -> Result<CloseConfirmation>;
}

impl<G: OrderGateway + ?Sized> OrderGateway for Box<G> {
    fn submit_short(&mut self, order: &ShortOrder) -> Result<OrderId> {
        (**self).submit_short(order)
    }

    fn close_position(&mut self, symbol: &str) -> Result<CloseConfirmation> {
        (**self).close_position(symbol)
    }
}

/// Request recorded by the simulated gateway
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayRequest {
    Short(ShortOrder),
    Close { symbol: String },
}

/// In-process gateway for backtests and paper trading
///
/// Fills every request immediately with sequential ids. Closing a symbol it
/// never opened is an error, same as a real exchange would report.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    next_id: u64,
    open: HashSet<String>,
    requests: Vec<GatewayRequest>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that already holds positions, e.g. after a state restore
    pub fn with_open_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            open: symbols.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Everything submitted so far, in order
    pub fn requests(&self) -> &[GatewayRequest] {
        &self.requests
    }

    pub fn is_open(&self, symbol: &str) -> bool {
        self.open.contains(symbol)
    }

    fn next_order_id(&mut self) -> OrderId {
        self.next_id += 1;
        OrderId(format!("sim-{:06}", self.next_id))
    }
}

impl OrderGateway for SimulatedGateway {
    fn submit_short(&mut self, order: &ShortOrder) -> Result<OrderId> {
        if !(order.size.is_finite() && order.size > 0.0) {
            return Err(Error::Exchange(format!(
                "{}: invalid order size {}",
                order.symbol, order.size
            )));
        }
        if !self.open.insert(order.symbol.clone()) {
            return Err(Error::Exchange(format!(
                "{}: position already open",
                order.symbol
            )));
        }

        self.requests.push(GatewayRequest::Short(order.clone()));
        let id = self.next_order_id();
        debug!("Simulated short {} {} @ {} ({})", order.size, order.symbol, order.reference_price, id);
        Ok(id)
    }

    fn close_position(&mut self, symbol: &str) -> Result<CloseConfirmation> {
        if !self.open.remove(symbol) {
            return Err(Error::Exchange(format!("{}: no open position", symbol)));
        }

        self.requests.push(GatewayRequest::Close {
            symbol: symbol.to_string(),
        });
        let order_id = self.next_order_id();
        debug!("Simulated close {} ({})", symbol, order_id);
        Ok(CloseConfirmation {
            symbol: symbol.to_string(),
            order_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(symbol: &str) -> ShortOrder {
        ShortOrder {
            symbol: symbol.to_string(),
            size: 2.0,
            reference_price: 120.0,
            stop_loss_price: 123.6,
            take_profit_price: 117.6,
        }
    }

    #[test]
    fn test_sequential_ids() {
        let mut gw = SimulatedGateway::new();
        assert_eq!(gw.submit_short(&order("A")).unwrap(), OrderId("sim-000001".into()));
        assert_eq!(gw.submit_short(&order("B")).unwrap().to_string(), "sim-000002");
        let confirmation = gw.close_position("A").unwrap();
        assert_eq!(confirmation.order_id.0, "sim-000003");
        assert_eq!(gw.requests().len(), 3);
    }

    #[test]
    fn test_rejects_double_open_and_unknown_close() {
        let mut gw = SimulatedGateway::new();
        gw.submit_short(&order("A")).unwrap();
        assert!(matches!(gw.submit_short(&order("A")), Err(Error::Exchange(_))));
        assert!(matches!(gw.close_position("B"), Err(Error::Exchange(_))));
        // Failed requests are not recorded
        assert_eq!(gw.requests().len(), 1);
    }

    #[test]
    fn test_rejects_bad_size() {
        let mut gw = SimulatedGateway::new();
        let mut bad = order("A");
        bad.size = 0.0;
        assert!(gw.submit_short(&bad).is_err());
        assert!(!gw.is_open("A"));
    }

    #[test]
    fn test_restored_symbols_can_close() {
        let mut gw = SimulatedGateway::with_open_symbols(["A"]);
        assert!(gw.is_open("A"));
        assert!(gw.close_position("A").is_ok());
    }

    #[test]
    fn test_boxed_gateway() {
        let mut gw: Box<dyn OrderGateway> = Box::new(SimulatedGateway::new());
        assert!(gw.submit_short(&order("A")).is_ok());
    }
}
