//! Shared data structures used throughout the application.

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A spot trading pair as listed by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub tradable: bool,
}

impl PairInfo {
    pub fn new(symbol: &str, base_asset: &str, quote_asset: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
            tradable: true,
        }
    }
}

/// Last-trade prices captured once per scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSnapshot {
    prices: HashMap<String, f64>,
}

impl PriceSnapshot {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        Self { prices }
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FromIterator<(String, f64)> for PriceSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

/// Order side on a spot pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Amount of the asset received for `amount` of the held asset at `price`.
    ///
    /// Buying spends quote to receive base, selling spends base to receive quote.
    pub fn convert(&self, amount: f64, price: f64) -> f64 {
        match self {
            Side::Buy => amount / price,
            Side::Sell => amount * price,
        }
    }
}

impl FromStr for Side {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(AppError::Other(format!("unknown order side {other:?}"))),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A base → A → B → base cycle over three distinct pairs.
///
/// Each leg records the side implied by where the held asset sits in the pair,
/// so pricing and execution never have to guess the orientation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Triangle {
    path: [String; 4],
    pairs: [String; 3],
    sides: [Side; 3],
}

impl Triangle {
    /// Builds a triangle from the three pairs traversed in order, starting with `base`.
    pub fn new(base: &str, legs: [&PairInfo; 3]) -> Result<Self> {
        let mut held = base.to_string();
        let mut path: Vec<String> = vec![held.clone()];
        let mut sides = [Side::Buy; 3];

        for (i, pair) in legs.iter().enumerate() {
            let (side, next) = if pair.quote_asset == held {
                (Side::Buy, pair.base_asset.clone())
            } else if pair.base_asset == held {
                (Side::Sell, pair.quote_asset.clone())
            } else {
                return Err(AppError::InvalidTriangle(format!(
                    "leg {} ({}) does not trade {}",
                    i + 1,
                    pair.symbol,
                    held
                )));
            };
            sides[i] = side;
            held = next;
            path.push(held.clone());
        }

        if path[3] != base {
            return Err(AppError::InvalidTriangle(format!(
                "cycle ends in {} instead of {}",
                path[3], base
            )));
        }
        if path[1] == path[2] || path[1] == base || path[2] == base {
            return Err(AppError::InvalidTriangle(format!(
                "intermediate assets must differ: {}",
                path.join(" -> ")
            )));
        }
        let [p1, p2, p3] = legs;
        if p1.symbol == p2.symbol || p2.symbol == p3.symbol || p1.symbol == p3.symbol {
            return Err(AppError::InvalidTriangle(format!(
                "pairs must be distinct: {}, {}, {}",
                p1.symbol, p2.symbol, p3.symbol
            )));
        }

        let [a, b, c, d]: [String; 4] = path
            .try_into()
            .map_err(|_| AppError::InvalidTriangle("path must have 4 assets".into()))?;
        Ok(Self {
            path: [a, b, c, d],
            pairs: [p1.symbol.clone(), p2.symbol.clone(), p3.symbol.clone()],
            sides,
        })
    }

    pub fn path(&self) -> &[String; 4] {
        &self.path
    }

    pub fn pairs(&self) -> &[String; 3] {
        &self.pairs
    }

    pub fn sides(&self) -> &[Side; 3] {
        &self.sides
    }

    pub fn base_currency(&self) -> &str {
        &self.path[0]
    }

    /// Human readable route, e.g. `USDT → BTC → ETH → USDT`.
    pub fn route(&self) -> String {
        self.path.join(" → ")
    }
}

/// Predicted outcome of running a triangle with a hypothetical amount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityResult {
    pub triangle: Triangle,
    pub initial_amount: f64,
    pub final_amount: f64,
    pub gross_profit: f64,
    pub net_profit: f64,
    pub net_profit_percent: f64,
    pub total_fees: f64,
    pub prices_used: [f64; 3],
}

/// Outcome of a single executed (or attempted) leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegResult {
    pub symbol: String,
    pub side: Side,
    pub quantity_sent: f64,
    pub quantity_received: f64,
    pub execution_price: f64,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

/// Where an execution pipeline stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionState {
    AwaitingLeg1,
    AwaitingLeg2,
    AwaitingLeg3,
    Completed,
    /// Aborted while waiting on the given leg (1-based).
    Failed { leg: usize },
}

impl ExecutionState {
    /// Leg currently awaited, 0-based.
    pub fn pending_leg(&self) -> Option<usize> {
        match self {
            ExecutionState::AwaitingLeg1 => Some(0),
            ExecutionState::AwaitingLeg2 => Some(1),
            ExecutionState::AwaitingLeg3 => Some(2),
            ExecutionState::Completed | ExecutionState::Failed { .. } => None,
        }
    }

    pub fn advance(self) -> Self {
        match self {
            ExecutionState::AwaitingLeg1 => ExecutionState::AwaitingLeg2,
            ExecutionState::AwaitingLeg2 => ExecutionState::AwaitingLeg3,
            ExecutionState::AwaitingLeg3 => ExecutionState::Completed,
            terminal => terminal,
        }
    }

    pub fn fail(self) -> Self {
        match self.pending_leg() {
            Some(i) => ExecutionState::Failed { leg: i + 1 },
            None => self,
        }
    }
}

/// Realized outcome of executing an opportunity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub state: ExecutionState,
    /// Successfully filled legs, in order.
    pub legs: Vec<LegResult>,
    /// The attempt that aborted the pipeline, if any.
    pub failed_leg: Option<LegResult>,
    pub initial_amount: f64,
    pub final_amount: f64,
    pub realized_profit: f64,
    pub realized_profit_percent: f64,
    pub errors: Vec<String>,
}

impl ExecutionResult {
    /// Asset and amount left over after a partial execution.
    pub fn stranded_position<'a>(&self, triangle: &'a Triangle) -> Option<(&'a str, f64)> {
        if self.success {
            return None;
        }
        let last = self.legs.last()?;
        Some((triangle.path()[self.legs.len()].as_str(), last.quantity_received))
    }
}

/// Market order request handed to an order gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketOrder {
    pub symbol: String,
    pub side: Side,
    /// Quantity of the base asset, already rounded to the lot size.
    pub quantity: String,
    /// Price the quantity was derived from.
    pub reference_price: f64,
    /// Asset the order delivers.
    pub receive_asset: String,
}

/// Fill reported by an order gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFill {
    pub order_id: String,
    pub executed_qty: f64,
    pub cumulative_quote_qty: f64,
}

impl OrderFill {
    /// Amount of the asset the order delivered.
    pub fn received(&self, side: Side) -> f64 {
        match side {
            Side::Buy => self.executed_qty,
            Side::Sell => self.cumulative_quote_qty,
        }
    }

    pub fn average_price(&self) -> f64 {
        if self.executed_qty > 0.0 {
            self.cumulative_quote_qty / self.executed_qty
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc_eth_pairs() -> (PairInfo, PairInfo, PairInfo) {
        (
            PairInfo::new("BTCUSDT", "BTC", "USDT"),
            PairInfo::new("BTCETH", "BTC", "ETH"),
            PairInfo::new("ETHUSDT", "ETH", "USDT"),
        )
    }

    #[test]
    fn triangle_orients_each_leg() {
        let (p1, p2, p3) = btc_eth_pairs();
        let t = Triangle::new("USDT", [&p1, &p2, &p3]).expect("valid triangle");
        assert_eq!(t.path(), &["USDT", "BTC", "ETH", "USDT"].map(String::from));
        assert_eq!(t.pairs(), &["BTCUSDT", "BTCETH", "ETHUSDT"].map(String::from));
        assert_eq!(t.sides(), &[Side::Buy, Side::Sell, Side::Sell]);
        assert_eq!(t.route(), "USDT → BTC → ETH → USDT");
    }

    #[test]
    fn triangle_accepts_reverse_middle_leg() {
        let p1 = PairInfo::new("BTCUSDT", "BTC", "USDT");
        let p2 = PairInfo::new("ETHBTC", "ETH", "BTC");
        let p3 = PairInfo::new("ETHUSDT", "ETH", "USDT");
        let t = Triangle::new("USDT", [&p1, &p2, &p3]).expect("valid triangle");
        assert_eq!(t.sides(), &[Side::Buy, Side::Buy, Side::Sell]);
        assert_eq!(t.path()[2], "ETH");
    }

    #[test]
    fn triangle_rejects_open_cycle() {
        let p1 = PairInfo::new("BTCUSDT", "BTC", "USDT");
        let p2 = PairInfo::new("BTCETH", "BTC", "ETH");
        let p3 = PairInfo::new("ETHBUSD", "ETH", "BUSD");
        assert!(matches!(
            Triangle::new("USDT", [&p1, &p2, &p3]),
            Err(AppError::InvalidTriangle(_))
        ));
    }

    #[test]
    fn triangle_rejects_repeated_pair() {
        let p1 = PairInfo::new("BTCUSDT", "BTC", "USDT");
        assert!(Triangle::new("USDT", [&p1, &p1, &p1]).is_err());
    }

    #[test]
    fn state_machine_walks_three_legs() {
        let mut s = ExecutionState::AwaitingLeg1;
        assert_eq!(s.pending_leg(), Some(0));
        s = s.advance();
        assert_eq!(s.fail(), ExecutionState::Failed { leg: 2 });
        s = s.advance().advance();
        assert_eq!(s, ExecutionState::Completed);
        assert_eq!(s.fail(), ExecutionState::Completed);
    }

    #[test]
    fn side_parses_its_wire_name() {
        assert_eq!("BUY".parse::<Side>().expect("side"), Side::Buy);
        assert_eq!(Side::Sell.as_str().parse::<Side>().expect("side"), Side::Sell);
        assert!("buy".parse::<Side>().is_err());
    }

    #[test]
    fn fill_received_depends_on_side() {
        let fill = OrderFill {
            order_id: "1".into(),
            executed_qty: 0.5,
            cumulative_quote_qty: 1500.0,
        };
        assert_eq!(fill.received(Side::Buy), 0.5);
        assert_eq!(fill.received(Side::Sell), 1500.0);
        assert_eq!(fill.average_price(), 3000.0);
    }
}
