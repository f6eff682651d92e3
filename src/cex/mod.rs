//! Exchange collaborators.
//!
//! Responsibilities:
//! • List tradable spot pairs and snapshot last-trade prices.
//! • Place market orders and report lot-size rules.
//! • Synthesize fills when running in simulation mode.

use crate::errors::Result;
use crate::models::{MarketOrder, OrderFill, PairInfo, PriceSnapshot};
use async_trait::async_trait;

pub mod binance;
#[cfg(test)]
pub mod mock;
pub mod simulated;

pub use binance::{BinanceClient, Credentials};
pub use simulated::SimulatedGateway;

/// Source of pair metadata and last-trade prices.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn list_tradable_pairs(&self) -> Result<Vec<PairInfo>>;

    /// Prices for `symbols`, or for every listed symbol when `None`.
    /// Requested symbols the exchange does not know are reported at 0.
    async fn get_prices(&self, symbols: Option<&[String]>) -> Result<PriceSnapshot>;
}

/// Order placement transport.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderFill>;

    /// Quantity granularity for `symbol`. Zero means no rounding rule.
    async fn get_symbol_step_size(&self, symbol: &str) -> Result<f64>;
}
