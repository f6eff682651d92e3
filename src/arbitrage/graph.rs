//! Index of tradable pairs keyed by base and by quote asset.

use crate::models::PairInfo;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PairGraph {
    by_base: HashMap<String, Vec<PairInfo>>,
    by_quote: HashMap<String, Vec<PairInfo>>,
}

impl PairGraph {
    /// Indexes every tradable pair. Lists keep the order pairs arrive in.
    pub fn build(pairs: &[PairInfo]) -> Self {
        let mut graph = Self::default();
        for pair in pairs.iter().filter(|p| p.tradable) {
            graph
                .by_base
                .entry(pair.base_asset.clone())
                .or_default()
                .push(pair.clone());
            graph
                .by_quote
                .entry(pair.quote_asset.clone())
                .or_default()
                .push(pair.clone());
        }
        graph
    }

    /// Pairs where `quote_asset == asset`.
    pub fn pairs_quoted_in(&self, asset: &str) -> &[PairInfo] {
        self.by_quote.get(asset).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pairs where `base_asset == asset`.
    pub fn pairs_based_on(&self, asset: &str) -> &[PairInfo] {
        self.by_base.get(asset).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_base.is_empty()
    }
}
