use anyhow::Result;
use std::sync::Arc;
use triangular_arbitrage::{
    cex::{BinanceClient, MarketDataSource, OrderGateway, SimulatedGateway},
    config::AppConfig,
    executor::ExecutionEngine,
    scanner::Scanner,
    storage::{NullSink, ResultSink, SqliteSink},
    utils,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let config = AppConfig::from_env()?;
    let arb = config.arbitrage();

    tracing::info!(
        base = %arb.base_currency,
        fee_pct = arb.fee_percent_per_leg,
        min_profit_pct = arb.min_profit_percent,
        min_net_profit = arb.min_net_profit,
        trade_amount = arb.trade_amount,
        interval_secs = config.check_interval.as_secs(),
        simulation = arb.simulation_mode,
        "[INIT] triangular-arbitrage starting"
    );
    if !arb.simulation_mode {
        tracing::warn!("[INIT] LIVE TRADING ENABLED: real orders will be placed with real funds");
    }

    let client = Arc::new(BinanceClient::new(
        &config.base_url,
        config.credentials(),
        config.request_timeout,
    )?);
    let market: Arc<dyn MarketDataSource> = client.clone();
    let gateway: Arc<dyn OrderGateway> = if arb.simulation_mode {
        Arc::new(SimulatedGateway::new(client, arb.fee_percent_per_leg))
    } else {
        client
    };

    let sink: Arc<dyn ResultSink> = match SqliteSink::open(&config.database_path) {
        Ok(sink) => {
            tracing::info!(path = %config.database_path, "[INIT] result database ready");
            Arc::new(sink)
        }
        Err(e) => {
            tracing::warn!(error = %e, path = %config.database_path, "[INIT] database unavailable, results will not be persisted");
            Arc::new(NullSink)
        }
    };

    let engine = ExecutionEngine::new(market.clone(), gateway, config.request_timeout);
    let mut scanner = Scanner::new(
        arb,
        market,
        engine,
        sink,
        config.request_timeout,
        config.top_opportunities_saved,
    );

    scanner
        .run_until(config.check_interval, config.stats_every_cycles, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "[INIT] failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!("[INIT] stopped");
    Ok(())
}
