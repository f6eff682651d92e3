//! Rounding of order quantities to an exchange step size.

const STEP_RATIO_EPSILON: f64 = 1e-12;

/// Decimal places implied by a step size, e.g. `0.001` -> 3.
pub fn step_precision(step_size: f64) -> usize {
    if !(step_size > 0.0) || step_size >= 1.0 {
        return 0;
    }
    let repr = format!("{step_size}");
    repr.split_once('.')
        .map(|(_, frac)| frac.trim_end_matches('0').len())
        .unwrap_or(0)
}

/// Round `quantity` down to a multiple of `step_size` and format it for the exchange.
///
/// Never rounds up. A non-positive step size leaves the quantity untouched.
pub fn format_quantity(quantity: f64, step_size: f64) -> String {
    if !(quantity > 0.0) {
        return "0".to_string();
    }
    if !(step_size > 0.0) {
        return format!("{quantity}");
    }
    // Relative tolerance absorbs binary noise such as 0.3 / 0.1 = 2.9999999999999996
    // without lifting a genuine shortfall onto the next step.
    let ratio = quantity / step_size;
    let steps = (ratio + ratio * STEP_RATIO_EPSILON).floor();
    let floored = steps * step_size;
    format!("{:.*}", step_precision(step_size), floored)
}
