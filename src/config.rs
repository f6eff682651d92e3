//! Configuration loader and application settings.

use crate::arbitrage::ArbitrageConfig;
use crate::cex::{Credentials, binance::BINANCE_REST_ENDPOINT};
use crate::errors::{AppError, Result};
use std::str::FromStr;
use std::time::Duration;

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Asset every triangle starts and ends in.
    pub base_currency: String,
    /// Exchange fee per leg, in percent.
    pub fee_percent: f64,
    /// Minimum net profit percent required to execute.
    pub min_profit_percent: f64,
    /// Minimum net profit, in base currency, to keep a candidate at all.
    pub min_net_profit: f64,
    /// Base currency committed per executed triangle.
    pub trade_amount: f64,
    pub check_interval: Duration,
    /// When set, orders are filled locally instead of on the exchange.
    pub simulation_mode: bool,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// REST endpoint, e.g. https://api.binance.com
    pub base_url: String,
    /// Per-call limit for every exchange request.
    pub request_timeout: Duration,
    pub database_path: String,
    /// Log statistics every N scan cycles.
    pub stats_every_cycles: u64,
    /// How many ranked opportunities to persist per cycle.
    pub top_opportunities_saved: usize,
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            base_currency: get("BASE_CURRENCY")
                .unwrap_or_else(|| "USDT".into())
                .to_uppercase(),
            fee_percent: parse_or(&get, "FEE_PERCENT", 0.1)?,
            min_profit_percent: parse_or(&get, "MIN_PROFIT_PERCENT", 0.5)?,
            min_net_profit: parse_or(&get, "MIN_NET_PROFIT", 0.0)?,
            trade_amount: parse_or(&get, "TRADE_AMOUNT_USDT", 100.0)?,
            check_interval: Duration::from_secs(parse_or(&get, "CHECK_INTERVAL_SECONDS", 30)?),
            simulation_mode: parse_bool(&get, "SIMULATION_MODE", true)?,
            api_key: get("BINANCE_API_KEY"),
            api_secret: get("BINANCE_API_SECRET"),
            base_url: get("BINANCE_BASE_URL").unwrap_or_else(|| BINANCE_REST_ENDPOINT.into()),
            request_timeout: Duration::from_millis(parse_or(&get, "REQUEST_TIMEOUT_MS", 5000)?),
            database_path: get("DATABASE_PATH").unwrap_or_else(|| "arbitrage.db".into()),
            stats_every_cycles: parse_or(&get, "STATS_EVERY_CYCLES", 10)?,
            top_opportunities_saved: parse_or(&get, "TOP_OPPORTUNITIES_SAVED", 5)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..100.0).contains(&self.fee_percent) {
            return Err(AppError::Config(format!(
                "FEE_PERCENT must be in [0, 100), got {}",
                self.fee_percent
            )));
        }
        if self.trade_amount <= 0.0 || !self.trade_amount.is_finite() {
            return Err(AppError::Config(format!(
                "TRADE_AMOUNT_USDT must be positive, got {}",
                self.trade_amount
            )));
        }
        if self.check_interval.is_zero() {
            return Err(AppError::Config("CHECK_INTERVAL_SECONDS must be at least 1".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(AppError::Config("REQUEST_TIMEOUT_MS must be at least 1".into()));
        }
        if self.stats_every_cycles == 0 {
            return Err(AppError::Config("STATS_EVERY_CYCLES must be at least 1".into()));
        }
        url::Url::parse(&self.base_url)?;
        if !self.simulation_mode && self.credentials().is_none() {
            return Err(AppError::Config(
                "live trading requires BINANCE_API_KEY and BINANCE_API_SECRET".into(),
            ));
        }
        Ok(())
    }

    /// API credentials, when both halves are present.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) => Some(Credentials {
                api_key: key.clone(),
                api_secret: secret.clone(),
            }),
            _ => None,
        }
    }

    /// Parameters consumed by detection and execution.
    pub fn arbitrage(&self) -> ArbitrageConfig {
        ArbitrageConfig {
            base_currency: self.base_currency.clone(),
            fee_percent_per_leg: self.fee_percent,
            min_net_profit: self.min_net_profit,
            min_profit_percent: self.min_profit_percent,
            trade_amount: self.trade_amount,
            simulation_mode: self.simulation_mode,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}"))),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(AppError::Config(format!("{key}={v:?} is not a boolean"))),
        },
    }
}
