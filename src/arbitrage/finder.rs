//! Enumerates base → A → B → base cycles over a [`PairGraph`].

use super::graph::PairGraph;
use crate::models::Triangle;
use tracing::debug;

/// Finds every triangle starting and ending in `base_currency`.
///
/// Leg 2 is only searched in the base → quote direction: `coin_a` must be the
/// base asset of the middle pair. Duplicated routes are kept.
pub fn find_triangles(graph: &PairGraph, base_currency: &str) -> Vec<Triangle> {
    let mut triangles = Vec::new();

    for pair1 in graph.pairs_quoted_in(base_currency) {
        let coin_a = &pair1.base_asset;
        for pair2 in graph.pairs_based_on(coin_a) {
            let coin_b = &pair2.quote_asset;
            for pair3 in graph.pairs_based_on(coin_b) {
                if pair3.quote_asset != base_currency {
                    continue;
                }
                match Triangle::new(base_currency, [pair1, pair2, pair3]) {
                    Ok(t) => triangles.push(t),
                    Err(e) => debug!(error = %e, "[SCAN] skipping candidate"),
                }
            }
        }
    }

    triangles
}
