use super::lot_size::format_quantity;
use crate::cex::{MarketDataSource, OrderGateway};
use crate::errors::{AppError, Result};
use crate::models::{
    ExecutionResult, ExecutionState, LegResult, MarketOrder, OpportunityResult, Side,
};
use crate::utils::with_timeout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Inflation applied once when the rounded quantity comes out as zero.
const ZERO_QTY_RETRY_FACTOR: f64 = 1.01;

/// Why a leg did not complete.
#[derive(Debug)]
struct LegFailure {
    error: AppError,
    /// Present when the failure happened at or after order submission.
    attempt: Option<LegResult>,
}

impl From<AppError> for LegFailure {
    fn from(error: AppError) -> Self {
        Self {
            error,
            attempt: None,
        }
    }
}

/// Runs the three legs of a triangle as sequential market orders.
///
/// Each leg trades what the previous leg actually delivered. A failing leg
/// aborts the run without unwinding earlier legs. Calls to `execute` are
/// serialized so two runs never spend the same balance.
pub struct ExecutionEngine {
    market: Arc<dyn MarketDataSource>,
    gateway: Arc<dyn OrderGateway>,
    call_timeout: Duration,
    in_flight: Mutex<()>,
}

impl ExecutionEngine {
    pub fn new(
        market: Arc<dyn MarketDataSource>,
        gateway: Arc<dyn OrderGateway>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            market,
            gateway,
            call_timeout,
            in_flight: Mutex::new(()),
        }
    }

    pub async fn execute(&self, opportunity: &OpportunityResult, amount: f64) -> ExecutionResult {
        let _guard = self.in_flight.lock().await;
        let triangle = &opportunity.triangle;

        info!(
            route = %triangle.route(),
            pairs = ?triangle.pairs(),
            amount,
            expected_profit = opportunity.net_profit,
            expected_pct = opportunity.net_profit_percent,
            "[EXEC] starting triangle"
        );

        let mut result = ExecutionResult {
            success: false,
            state: ExecutionState::AwaitingLeg1,
            legs: Vec::with_capacity(3),
            failed_leg: None,
            initial_amount: amount,
            final_amount: 0.0,
            realized_profit: 0.0,
            realized_profit_percent: 0.0,
            errors: Vec::new(),
        };
        let mut available = amount;

        while let Some(i) = result.state.pending_leg() {
            let symbol = &triangle.pairs()[i];
            let side = triangle.sides()[i];
            let receive_asset = &triangle.path()[i + 1];

            match self.execute_leg(symbol, side, available, receive_asset).await {
                Ok(leg) => {
                    info!(
                        leg = i + 1,
                        symbol = %leg.symbol,
                        side = %leg.side,
                        order_id = leg.order_id.as_deref().unwrap_or_default(),
                        sent = leg.quantity_sent,
                        received = leg.quantity_received,
                        price = leg.execution_price,
                        asset = %receive_asset,
                        "[EXEC] leg filled"
                    );
                    available = leg.quantity_received;
                    result.legs.push(leg);
                    result.state = result.state.advance();
                }
                Err(failure) => {
                    let msg = format!("leg {} ({} {}) failed: {}", i + 1, side, symbol, failure.error);
                    error!(leg = i + 1, %symbol, %side, error = %failure.error, "[EXEC] leg failed, aborting");
                    result.errors.push(msg);
                    result.failed_leg = failure.attempt;
                    result.state = result.state.fail();
                }
            }
        }

        if result.state == ExecutionState::Completed {
            result.success = true;
            result.final_amount = available;
            result.realized_profit = available - amount;
            result.realized_profit_percent = result.realized_profit / amount * 100.0;
            info!(
                initial = amount,
                final_amount = result.final_amount,
                realized_profit = result.realized_profit,
                realized_pct = result.realized_profit_percent,
                expected_profit = opportunity.net_profit,
                "[EXEC] triangle completed"
            );
        } else if let Some((asset, qty)) = result.stranded_position(triangle) {
            warn!(
                %asset,
                quantity = qty,
                legs_filled = result.legs.len(),
                "[EXEC] partial execution, position needs manual reconciliation"
            );
        }

        result
    }

    async fn execute_leg(
        &self,
        symbol: &str,
        side: Side,
        available: f64,
        receive_asset: &str,
    ) -> std::result::Result<LegResult, LegFailure> {
        let price = self.reference_price(symbol).await?;
        let step_size = with_timeout(
            self.call_timeout,
            &format!("step size {symbol}"),
            self.gateway.get_symbol_step_size(symbol),
        )
        .await?;

        let raw_quantity = match side {
            Side::Buy => available / price,
            Side::Sell => available,
        };
        let quantity = rounded_quantity(symbol, raw_quantity, step_size)?;

        let order = MarketOrder {
            symbol: symbol.to_string(),
            side,
            quantity: quantity.clone(),
            reference_price: price,
            receive_asset: receive_asset.to_string(),
        };
        let mut leg = LegResult {
            symbol: symbol.to_string(),
            side,
            quantity_sent: available,
            quantity_received: 0.0,
            execution_price: price,
            order_id: None,
            error: None,
        };

        let placed = with_timeout(
            self.call_timeout,
            &format!("market order {symbol}"),
            self.gateway.place_market_order(&order),
        )
        .await
        .and_then(|fill| {
            let received = fill.received(side);
            if received > 0.0 && received.is_finite() {
                Ok(fill)
            } else {
                Err(AppError::Other(format!(
                    "order {} on {symbol} delivered nothing",
                    fill.order_id
                )))
            }
        });

        match placed {
            Ok(fill) => {
                leg.quantity_received = fill.received(side);
                let avg = fill.average_price();
                if avg > 0.0 {
                    leg.execution_price = avg;
                }
                leg.order_id = Some(fill.order_id);
                Ok(leg)
            }
            Err(error) => {
                leg.error = Some(error.to_string());
                Err(LegFailure {
                    error,
                    attempt: Some(leg),
                })
            }
        }
    }

    async fn reference_price(&self, symbol: &str) -> Result<f64> {
        let wanted = [symbol.to_string()];
        let prices = with_timeout(
            self.call_timeout,
            &format!("ticker {symbol}"),
            self.market.get_prices(Some(&wanted)),
        )
        .await?;
        match prices.get(symbol) {
            Some(p) if p > 0.0 && p.is_finite() => Ok(p),
            _ => Err(AppError::PriceUnavailable(symbol.to_string())),
        }
    }
}

/// Round down to the step size, retrying once with a 1% larger quantity if that yields zero.
fn rounded_quantity(symbol: &str, raw_quantity: f64, step_size: f64) -> Result<String> {
    let first = format_quantity(raw_quantity, step_size);
    if first.parse::<f64>()? > 0.0 {
        return Ok(first);
    }
    let retry = format_quantity(raw_quantity * ZERO_QTY_RETRY_FACTOR, step_size);
    if retry.parse::<f64>()? > 0.0 {
        warn!(%symbol, raw_quantity, step_size, quantity = %retry, "[EXEC] quantity inflated to reach one step");
        return Ok(retry);
    }
    Err(AppError::QuantityTooSmall {
        symbol: symbol.to_string(),
        quantity: raw_quantity,
        step_size,
    })
}
