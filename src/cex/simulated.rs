//! Paper-trading gateway used when `SIMULATION_MODE` is on.

use super::OrderGateway;
use crate::arbitrage::fee_multiplier;
use crate::errors::{AppError, Result};
use crate::models::{MarketOrder, OrderFill, Side};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Fills every market order in full at its reference price.
///
/// The per-leg fee is charged once, on the asset received. Lot sizes come from
/// a real source so quantities round exactly as they would live.
pub struct SimulatedGateway {
    lot_sizes: Arc<dyn OrderGateway>,
    fee_percent_per_leg: f64,
    sequence: AtomicU64,
}

impl SimulatedGateway {
    pub fn new(lot_sizes: Arc<dyn OrderGateway>, fee_percent_per_leg: f64) -> Self {
        Self {
            lot_sizes,
            fee_percent_per_leg,
            sequence: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl OrderGateway for SimulatedGateway {
    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderFill> {
        let quantity: f64 = order.quantity.parse()?;
        let price = order.reference_price;
        if !(price > 0.0) {
            return Err(AppError::PriceUnavailable(order.symbol.clone()));
        }

        let fee_mult = fee_multiplier(self.fee_percent_per_leg);
        let (executed_qty, cumulative_quote_qty) = match order.side {
            Side::Buy => (quantity * fee_mult, quantity * price),
            Side::Sell => (quantity, quantity * price * fee_mult),
        };
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let order_id = format!("SIM_{}_{}", Utc::now().timestamp(), seq);

        info!(
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.quantity,
            price,
            %order_id,
            "[SIM] filled market order"
        );
        Ok(OrderFill {
            order_id,
            executed_qty,
            cumulative_quote_qty,
        })
    }

    async fn get_symbol_step_size(&self, symbol: &str) -> Result<f64> {
        self.lot_sizes.get_symbol_step_size(symbol).await
    }
}
