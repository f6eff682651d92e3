use super::types::ArbitrageConfig;
use crate::models::{OpportunityResult, PriceSnapshot, Triangle};

/// Fraction of each leg's input that survives the exchange fee.
pub fn fee_multiplier(fee_percent_per_leg: f64) -> f64 {
    1.0 - fee_percent_per_leg / 100.0
}

/// Evaluate the fee-adjusted outcome of running `initial_amount` through a triangle.
///
/// Returns `None` when a leg price is missing, zero or not a finite positive number, or when the
/// amount is not positive. The fee is charged on every leg before conversion,
/// so it compounds as `(1 - fee)^3`.
pub fn evaluate(
    triangle: &Triangle,
    prices: &PriceSnapshot,
    initial_amount: f64,
    fee_percent_per_leg: f64,
) -> Option<OpportunityResult> {
    if !(initial_amount > 0.0) {
        return None;
    }

    let mut prices_used = [0.0; 3];
    for (slot, symbol) in prices_used.iter_mut().zip(triangle.pairs()) {
        let price = prices.get(symbol)?;
        if !(price > 0.0) || !price.is_finite() {
            return None;
        }
        *slot = price;
    }

    let fee_mult = fee_multiplier(fee_percent_per_leg);
    let sides = triangle.sides();

    let mut amount = initial_amount;
    let mut gross = initial_amount;
    for i in 0..3 {
        amount = sides[i].convert(amount * fee_mult, prices_used[i]);
        gross = sides[i].convert(gross, prices_used[i]);
    }

    let final_amount = amount;
    let net_profit = final_amount - initial_amount;
    let net_profit_percent = net_profit / initial_amount * 100.0;
    let total_fees = (initial_amount - final_amount - net_profit).abs();

    Some(OpportunityResult {
        triangle: triangle.clone(),
        initial_amount,
        final_amount,
        gross_profit: gross - initial_amount,
        net_profit,
        net_profit_percent,
        total_fees,
        prices_used,
    })
}

/// Evaluate every triangle against one snapshot, skipping those without usable prices.
pub fn evaluate_all(
    triangles: &[Triangle],
    prices: &PriceSnapshot,
    config: &ArbitrageConfig,
) -> Vec<OpportunityResult> {
    triangles
        .iter()
        .filter_map(|t| evaluate(t, prices, config.trade_amount, config.fee_percent_per_leg))
        .collect()
}
