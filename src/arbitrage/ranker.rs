//! Filtering and ordering of evaluated opportunities.

use crate::models::OpportunityResult;
use std::cmp::Ordering;

/// Keep results with `net_profit > min_net_profit`, best first.
///
/// The sort is stable: equal profits keep their input order.
pub fn rank(results: Vec<OpportunityResult>, min_net_profit: f64) -> Vec<OpportunityResult> {
    let mut kept: Vec<OpportunityResult> = results
        .into_iter()
        .filter(|r| r.net_profit > min_net_profit)
        .collect();
    kept.sort_by(|a, b| {
        b.net_profit
            .partial_cmp(&a.net_profit)
            .unwrap_or(Ordering::Equal)
    });
    kept
}

/// Keep results whose net profit percent reaches `min_percent`, preserving order.
pub fn retain_min_percent(
    results: Vec<OpportunityResult>,
    min_percent: f64,
) -> Vec<OpportunityResult> {
    results
        .into_iter()
        .filter(|r| r.net_profit_percent >= min_percent)
        .collect()
}
