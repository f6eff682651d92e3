/// Configuration for arbitrage detection and execution
#[derive(Debug, Clone)]
pub struct ArbitrageConfig {
    /// Asset every cycle starts and ends in (e.g. USDT).
    pub base_currency: String,
    /// Exchange fee charged on each leg, in percent (0.1 = 0.1%).
    pub fee_percent_per_leg: f64,
    /// Opportunities must beat this net profit, in base currency.
    pub min_net_profit: f64,
    /// Opportunities must reach this net profit percent to be executed.
    pub min_profit_percent: f64,
    /// Amount of base currency committed per cycle.
    pub trade_amount: f64,
    pub simulation_mode: bool,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            base_currency: "USDT".to_string(),
            fee_percent_per_leg: 0.1,
            min_net_profit: 0.0,
            min_profit_percent: 0.5,
            trade_amount: 100.0,
            simulation_mode: true,
        }
    }
}
