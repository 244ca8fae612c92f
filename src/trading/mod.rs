//! Exchange-facing order execution

pub mod gateway;

pub use gateway::{
    CloseConfirmation, GatewayRequest, OrderGateway, OrderId, ShortOrder, SimulatedGateway,
};
