//! In-memory collaborators for tests.

use super::{MarketDataSource, OrderGateway};
use crate::errors::{AppError, Result};
use crate::models::{MarketOrder, OrderFill, PairInfo, PriceSnapshot};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Default)]
pub struct MockMarket {
    pub pairs: Vec<PairInfo>,
    pub prices: HashMap<String, f64>,
    pub fail_listing: bool,
}

impl MockMarket {
    pub fn new(pairs: Vec<PairInfo>, prices: &[(&str, f64)]) -> Self {
        Self {
            pairs,
            prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
            fail_listing: false,
        }
    }
}

#[async_trait]
impl MarketDataSource for MockMarket {
    async fn list_tradable_pairs(&self) -> Result<Vec<PairInfo>> {
        if self.fail_listing {
            return Err(AppError::Timeout("exchangeInfo".into()));
        }
        Ok(self.pairs.clone())
    }

    async fn get_prices(&self, symbols: Option<&[String]>) -> Result<PriceSnapshot> {
        Ok(match symbols {
            Some(wanted) => wanted
                .iter()
                .map(|s| (s.clone(), self.prices.get(s).copied().unwrap_or(0.0)))
                .collect(),
            None => PriceSnapshot::new(self.prices.clone()),
        })
    }
}

/// Fills at the reference price without fees; can be told to reject or hang.
pub struct MockGateway {
    pub step_size: f64,
    /// 1-based order number to reject.
    pub reject_order: Option<usize>,
    /// 1-based order number that never returns.
    pub hang_order: Option<usize>,
    /// Delay before every fill.
    pub latency: Duration,
    pub orders: Mutex<Vec<MarketOrder>>,
}

impl MockGateway {
    pub fn new(step_size: f64) -> Self {
        Self {
            step_size,
            reject_order: None,
            hang_order: None,
            latency: Duration::ZERO,
            orders: Mutex::new(Vec::new()),
        }
    }

    pub fn placed(&self) -> Vec<MarketOrder> {
        self.orders.lock().clone()
    }
}

#[async_trait]
impl OrderGateway for MockGateway {
    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderFill> {
        let n = {
            let mut orders = self.orders.lock();
            orders.push(order.clone());
            orders.len()
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.hang_order == Some(n) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.reject_order == Some(n) {
            return Err(AppError::Exchange {
                code: -2010,
                msg: "Account has insufficient balance for requested action.".into(),
            });
        }
        let qty: f64 = order.quantity.parse()?;
        let quote = qty * order.reference_price;
        Ok(OrderFill {
            order_id: format!("MOCK_{n}"),
            executed_qty: qty,
            cumulative_quote_qty: quote,
        })
    }

    async fn get_symbol_step_size(&self, _symbol: &str) -> Result<f64> {
        Ok(self.step_size)
    }
}
