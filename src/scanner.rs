//! Scan loop: detect, rank and execute triangular opportunities on a fixed interval.

use crate::{
    arbitrage::{ArbitrageConfig, PairGraph, evaluate_all, find_triangles, rank, retain_min_percent},
    cex::MarketDataSource,
    errors::Result,
    executor::ExecutionEngine,
    models::{ExecutionResult, OpportunityResult},
    storage::{OpportunityRecord, ResultSink, TradeRecord},
    utils::with_timeout,
};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Running totals across scan cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub opportunities_found: u64,
    pub trades_executed: u64,
    pub trades_successful: u64,
    pub trades_failed: u64,
    /// Base currency committed by completed trades.
    pub total_invested: f64,
    pub total_profit: f64,
}

impl ScanStats {
    pub fn record_execution(&mut self, exec: &ExecutionResult) {
        self.trades_executed += 1;
        if exec.success {
            self.trades_successful += 1;
            self.total_invested += exec.initial_amount;
            self.total_profit += exec.realized_profit;
        } else {
            self.trades_failed += 1;
        }
    }

    /// Realized return on completed trades, in percent.
    pub fn roi(&self) -> f64 {
        if self.total_invested > 0.0 {
            self.total_profit / self.total_invested * 100.0
        } else {
            0.0
        }
    }

    pub fn log(&self) {
        info!(
            cycles = self.cycles,
            failed_cycles = self.failed_cycles,
            opportunities = self.opportunities_found,
            executed = self.trades_executed,
            successful = self.trades_successful,
            failed = self.trades_failed,
            total_invested = self.total_invested,
            total_profit = self.total_profit,
            roi_pct = self.roi(),
            "[STATS] session totals"
        );
    }
}

/// What a single cycle saw and did.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub pairs: usize,
    pub triangles: usize,
    pub evaluated: usize,
    /// Ranked candidates meeting both profit thresholds.
    pub qualified: Vec<OpportunityResult>,
    /// Most profitable candidate by percent, whether or not it qualified.
    pub best_available: Option<OpportunityResult>,
    pub execution: Option<ExecutionResult>,
}

pub struct Scanner {
    config: ArbitrageConfig,
    market: Arc<dyn MarketDataSource>,
    engine: ExecutionEngine,
    sink: Arc<dyn ResultSink>,
    call_timeout: Duration,
    top_saved: usize,
    stats: ScanStats,
}

impl Scanner {
    pub fn new(
        config: ArbitrageConfig,
        market: Arc<dyn MarketDataSource>,
        engine: ExecutionEngine,
        sink: Arc<dyn ResultSink>,
        call_timeout: Duration,
        top_saved: usize,
    ) -> Self {
        Self {
            config,
            market,
            engine,
            sink,
            call_timeout,
            top_saved,
            stats: ScanStats::default(),
        }
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Run one scan against a fresh pair and price snapshot.
    ///
    /// Market-data failures are returned as errors; storage failures are only logged.
    pub async fn run_cycle(&mut self) -> Result<ScanReport> {
        self.stats.cycles += 1;
        let cycle = self.stats.cycles;

        let pairs = with_timeout(
            self.call_timeout,
            "pair listing",
            self.market.list_tradable_pairs(),
        )
        .await?;
        let graph = PairGraph::build(&pairs);
        let triangles = find_triangles(&graph, &self.config.base_currency);

        let mut report = ScanReport {
            pairs: pairs.len(),
            triangles: triangles.len(),
            ..ScanReport::default()
        };
        if triangles.is_empty() {
            warn!(
                cycle,
                pairs = pairs.len(),
                base = %self.config.base_currency,
                "[SCAN] no triangles through base currency"
            );
            return Ok(report);
        }

        let mut seen = HashSet::new();
        let symbols: Vec<String> = triangles
            .iter()
            .flat_map(|t| t.pairs().iter())
            .filter(|s| seen.insert(s.as_str()))
            .cloned()
            .collect();
        let prices = with_timeout(
            self.call_timeout,
            "price snapshot",
            self.market.get_prices(Some(&symbols)),
        )
        .await?;

        let evaluated = evaluate_all(&triangles, &prices, &self.config);
        report.evaluated = evaluated.len();
        report.best_available = evaluated
            .iter()
            .max_by(|a, b| a.net_profit_percent.total_cmp(&b.net_profit_percent))
            .cloned();

        let ranked = rank(evaluated, self.config.min_net_profit);
        report.qualified = retain_min_percent(ranked, self.config.min_profit_percent);
        self.stats.opportunities_found += report.qualified.len() as u64;

        info!(
            cycle,
            pairs = report.pairs,
            triangles = report.triangles,
            priced = prices.len(),
            evaluated = report.evaluated,
            qualified = report.qualified.len(),
            "[SCAN] cycle complete"
        );

        for opp in report.qualified.iter().take(self.top_saved) {
            if let Err(e) = self.sink.save_opportunity(&OpportunityRecord::from(opp)) {
                warn!(error = %e, route = %opp.triangle.route(), "[SCAN] failed to save opportunity");
            }
        }

        let Some(best) = report.qualified.first() else {
            match &report.best_available {
                Some(c) => info!(
                    route = %c.triangle.route(),
                    net_profit = c.net_profit,
                    net_pct = c.net_profit_percent,
                    min_pct = self.config.min_profit_percent,
                    "[HEARTBEAT] no opportunity above threshold"
                ),
                None => info!("[HEARTBEAT] no priced triangles this cycle"),
            }
            return Ok(report);
        };

        info!(
            route = %best.triangle.route(),
            pairs = ?best.triangle.pairs(),
            prices = ?best.prices_used,
            net_profit = best.net_profit,
            net_pct = best.net_profit_percent,
            "[OPP] executing best opportunity"
        );
        let exec = self.engine.execute(best, self.config.trade_amount).await;
        self.stats.record_execution(&exec);

        let record = TradeRecord::new(best, &exec, self.config.simulation_mode);
        if let Err(e) = self.sink.save_trade(&record) {
            warn!(error = %e, route = %record.path, "[SCAN] failed to save trade");
        }
        report.execution = Some(exec);
        Ok(report)
    }

    /// Run cycles every `interval` until `shutdown` resolves.
    ///
    /// A cycle in progress is allowed to finish before the loop exits.
    pub async fn run_until<S>(&mut self, interval: Duration, stats_every: u64, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.record_status(true);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("[INIT] shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(report) => debug!(qualified = report.qualified.len(), "[SCAN] cycle done"),
                        Err(e) => {
                            self.stats.failed_cycles += 1;
                            if e.is_transient() {
                                warn!(error = %e, "[SCAN] market data unavailable, retrying next cycle");
                            } else {
                                error!(error = %e, "[SCAN] cycle failed");
                            }
                        }
                    }
                    if stats_every > 0 && self.stats.cycles % stats_every == 0 {
                        self.stats.log();
                    }
                }
            }
        }

        self.stats.log();
        self.record_status(false);
    }

    fn record_status(&self, running: bool) {
        if let Err(e) = self.sink.save_status(running) {
            warn!(error = %e, running, "[SCAN] failed to save running status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cex::OrderGateway;
    use crate::cex::mock::{MockGateway, MockMarket};
    use crate::models::PairInfo;
    use crate::storage::{NullSink, SqliteSink};

    fn pairs() -> Vec<PairInfo> {
        vec![
            PairInfo::new("BTCUSDT", "BTC", "USDT"),
            PairInfo::new("BTCETH", "BTC", "ETH"),
            PairInfo::new("ETHUSDT", "ETH", "USDT"),
            PairInfo::new("BNBBTC", "BNB", "BTC"),
        ]
    }

    fn scanner(
        market: MockMarket,
        gateway: Arc<MockGateway>,
        sink: Arc<dyn ResultSink>,
    ) -> Scanner {
        let market: Arc<dyn MarketDataSource> = Arc::new(market);
        let gateway: Arc<dyn OrderGateway> = gateway;
        let timeout = Duration::from_millis(200);
        let engine = ExecutionEngine::new(market.clone(), gateway, timeout);
        Scanner::new(ArbitrageConfig::default(), market, engine, sink, timeout, 5)
    }

    #[tokio::test]
    async fn profitable_cycle_executes_and_persists() {
        // 100 / 50000 * 17 * 3000 = 102 before fees
        let market = MockMarket::new(
            pairs(),
            &[("BTCUSDT", 50000.0), ("BTCETH", 17.0), ("ETHUSDT", 3000.0)],
        );
        let gateway = Arc::new(MockGateway::new(0.00001));
        let sink = Arc::new(SqliteSink::in_memory().expect("in-memory db"));
        let mut s = scanner(market, gateway.clone(), sink.clone());

        let report = s.run_cycle().await.expect("cycle runs");
        assert_eq!(report.triangles, 1);
        assert_eq!(report.qualified.len(), 1);
        let exec = report.execution.expect("best opportunity executed");
        assert!(exec.success);
        assert!((exec.final_amount - 102.0).abs() < 1e-6);
        assert_eq!(gateway.placed().len(), 3);

        assert_eq!(sink.count("opportunities").expect("count"), 1);
        assert_eq!(sink.count("trade_history").expect("count"), 1);
        let stats = s.stats();
        assert_eq!((stats.cycles, stats.trades_successful), (1, 1));
        assert!((stats.roi() - 2.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unprofitable_cycle_reports_best_candidate_only() {
        let market = MockMarket::new(
            pairs(),
            &[("BTCUSDT", 50000.0), ("BTCETH", 17.0), ("ETHUSDT", 2900.0)],
        );
        let gateway = Arc::new(MockGateway::new(0.00001));
        let mut s = scanner(market, gateway.clone(), Arc::new(NullSink));

        let report = s.run_cycle().await.expect("cycle runs");
        assert!(report.qualified.is_empty());
        assert!(report.execution.is_none());
        let best = report.best_available.expect("one priced triangle");
        assert!(best.net_profit < 0.0);
        assert!(gateway.placed().is_empty());
        assert_eq!(s.stats().trades_executed, 0);
    }

    #[tokio::test]
    async fn missing_prices_skip_triangle() {
        let market = MockMarket::new(pairs(), &[("BTCUSDT", 50000.0), ("BTCETH", 17.0)]);
        let mut s = scanner(market, Arc::new(MockGateway::new(0.0)), Arc::new(NullSink));

        let report = s.run_cycle().await.expect("cycle runs");
        assert_eq!(report.triangles, 1);
        assert_eq!(report.evaluated, 0);
        assert!(report.best_available.is_none());
    }

    #[tokio::test]
    async fn failed_execution_is_counted_and_saved() {
        let market = MockMarket::new(
            pairs(),
            &[("BTCUSDT", 50000.0), ("BTCETH", 17.0), ("ETHUSDT", 3000.0)],
        );
        let mut gateway = MockGateway::new(0.00001);
        gateway.reject_order = Some(2);
        let sink = Arc::new(SqliteSink::in_memory().expect("in-memory db"));
        let mut s = scanner(market, Arc::new(gateway), sink.clone());

        let exec = s
            .run_cycle()
            .await
            .expect("cycle runs")
            .execution
            .expect("attempted");
        assert!(!exec.success);
        assert_eq!(exec.legs.len(), 1);
        assert_eq!(s.stats().trades_failed, 1);
        assert_eq!(s.stats().total_invested, 0.0);
        assert_eq!(sink.count("trade_history").expect("count"), 1);

        let trade_id = sink.latest_trade_id().expect("query").expect("saved");
        let legs = sink.trade_legs(trade_id).expect("legs");
        assert_eq!(legs.len(), 2);
        assert!(legs[0].filled);
        assert_eq!(legs[0].result.order_id.as_deref(), Some("MOCK_1"));
        assert_eq!(legs[0].result.symbol, "BTCUSDT");
        assert!(!legs[1].filled);
        assert_eq!(legs[1].result.symbol, "BTCETH");
        assert!(legs[1].result.error.is_some());
    }

    #[tokio::test]
    async fn run_until_marks_status_running_then_stopped() {
        let market = MockMarket::new(pairs(), &[]);
        let sink = Arc::new(SqliteSink::in_memory().expect("in-memory db"));
        let mut s = scanner(market, Arc::new(MockGateway::new(0.0)), sink.clone());
        assert_eq!(sink.running_status().expect("query"), None);

        let observer = sink.clone();
        s.run_until(Duration::from_millis(10), 100, async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(observer.running_status().expect("query"), Some(true));
        })
        .await;
        assert_eq!(sink.running_status().expect("query"), Some(false));
    }

    #[tokio::test]
    async fn listing_failure_fails_cycle_but_loop_continues() {
        let mut market = MockMarket::new(pairs(), &[]);
        market.fail_listing = true;
        let mut s = scanner(market, Arc::new(MockGateway::new(0.0)), Arc::new(NullSink));

        assert!(s.run_cycle().await.is_err());

        s.run_until(
            Duration::from_millis(10),
            1,
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await;
        assert!(s.stats().cycles >= 3);
        assert_eq!(s.stats().failed_cycles, s.stats().cycles - 1);
    }
}
