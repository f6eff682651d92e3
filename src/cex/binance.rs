use super::{MarketDataSource, OrderGateway};
use crate::errors::{AppError, Result};
use crate::models::{MarketOrder, OrderFill, PairInfo, PriceSnapshot, Side};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const BINANCE_REST_ENDPOINT: &str = "https://api.binance.com";
const RECV_WINDOW_MS: u64 = 5000;
/// Above this many symbols the full ticker list is cheaper than a filtered request.
const MAX_SYMBOLS_PER_TICKER_REQUEST: usize = 100;
const INVALID_SYMBOL: i64 = -1121;

type HmacSha256 = Hmac<Sha256>;

/// API key pair for signed endpoints.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default)]
    is_spot_trading_allowed: bool,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

impl SymbolInfo {
    fn step_size(&self) -> Option<f64> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::LotSize { step_size } => step_size.parse().ok(),
            SymbolFilter::Other => None,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum SymbolFilter {
    #[serde(rename = "LOT_SIZE")]
    LotSize {
        #[serde(rename = "stepSize")]
        step_size: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

/// `ticker/price` answers `symbol=` with an object and everything else with an array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TickerResponse {
    One(TickerPrice),
    Many(Vec<TickerPrice>),
}

impl TickerResponse {
    fn into_prices(self) -> Result<HashMap<String, f64>> {
        let tickers = match self {
            TickerResponse::One(t) => vec![t],
            TickerResponse::Many(ts) => ts,
        };
        tickers
            .into_iter()
            .map(|t| -> Result<(String, f64)> { Ok((t.symbol, t.price.parse()?)) })
            .collect()
    }
}

/// Query parameter narrowing `ticker/price` to `wanted`, or `None` for the full list.
fn ticker_query(wanted: &[String]) -> Result<Option<(&'static str, String)>> {
    Ok(match wanted {
        [] => None,
        [one] => Some(("symbol", one.clone())),
        many if many.len() <= MAX_SYMBOLS_PER_TICKER_REQUEST => {
            Some(("symbols", serde_json::to_string(many)?))
        }
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    executed_qty: String,
    cummulative_quote_qty: String,
    #[serde(default)]
    fills: Vec<FillMsg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillMsg {
    commission: String,
    commission_asset: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorMsg {
    code: i64,
    msg: String,
}

/// Binance spot REST client.
pub struct BinanceClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
    step_sizes: RwLock<HashMap<String, f64>>,
}

impl BinanceClient {
    pub fn new(base_url: &str, credentials: Option<Credentials>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            credentials,
            step_sizes: RwLock::new(HashMap::new()),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.base_url.join(path)?;
        let resp = self.http.get(url).query(query).send().await?;
        decode(resp).await
    }

    async fn exchange_info(&self, symbol: Option<&str>) -> Result<ExchangeInfo> {
        let query: Vec<(&str, &str)> = symbol.map(|s| vec![("symbol", s)]).unwrap_or_default();
        let info: ExchangeInfo = self.get_json("/api/v3/exchangeInfo", &query).await?;

        let mut cache = self.step_sizes.write();
        for s in &info.symbols {
            if let Some(step) = s.step_size() {
                cache.insert(s.symbol.clone(), step);
            }
        }
        Ok(info)
    }

    async fn tickers(&self, filter: Option<(&str, String)>) -> Result<HashMap<String, f64>> {
        let query: Vec<(&str, &str)> = filter
            .as_ref()
            .map(|(k, v)| vec![(*k, v.as_str())])
            .unwrap_or_default();
        let resp: TickerResponse = self.get_json("/api/v3/ticker/price", &query).await?;
        resp.into_prices()
    }

    fn sign(&self, query: &str) -> Result<(String, String)> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            AppError::Config("live trading requires BINANCE_API_KEY and BINANCE_API_SECRET".into())
        })?;
        Ok((creds.api_key.clone(), sign_query(&creds.api_secret, query)?))
    }
}

/// Hex HMAC-SHA256 of the query string, as required by signed endpoints.
pub fn sign_query(secret: &str, query: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Other(format!("HMAC key error: {e}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

async fn decode<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(match serde_json::from_str::<ApiErrorMsg>(&body) {
            Ok(e) => AppError::Exchange { code: e.code, msg: e.msg },
            Err(_) => AppError::Other(format!("HTTP {status}: {body}")),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Subtract commission charged in the asset the order delivers.
fn net_fill(resp: OrderResponse, side: Side, receive_asset: &str) -> Result<OrderFill> {
    let mut executed_qty: f64 = resp.executed_qty.parse()?;
    let mut cumulative_quote_qty: f64 = resp.cummulative_quote_qty.parse()?;
    let commission: f64 = resp
        .fills
        .iter()
        .filter(|f| f.commission_asset == receive_asset)
        .filter_map(|f| f.commission.parse::<f64>().ok())
        .sum();
    match side {
        Side::Buy => executed_qty -= commission,
        Side::Sell => cumulative_quote_qty -= commission,
    }
    Ok(OrderFill {
        order_id: resp.order_id.to_string(),
        executed_qty,
        cumulative_quote_qty,
    })
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn list_tradable_pairs(&self) -> Result<Vec<PairInfo>> {
        let info = self.exchange_info(None).await?;
        let pairs: Vec<PairInfo> = info
            .symbols
            .into_iter()
            .filter(|s| s.status == "TRADING" && s.is_spot_trading_allowed)
            .map(|s| PairInfo {
                symbol: s.symbol,
                base_asset: s.base_asset,
                quote_asset: s.quote_asset,
                tradable: true,
            })
            .collect();
        debug!(pairs = pairs.len(), "[CEX] exchangeInfo loaded");
        Ok(pairs)
    }

    async fn get_prices(&self, symbols: Option<&[String]>) -> Result<PriceSnapshot> {
        let Some(wanted) = symbols else {
            return Ok(PriceSnapshot::new(self.tickers(None).await?));
        };
        if wanted.is_empty() {
            return Ok(PriceSnapshot::default());
        }
        let all = match ticker_query(wanted)? {
            Some(filter) => match self.tickers(Some(filter)).await {
                // One unknown symbol rejects the whole filtered request.
                Err(AppError::Exchange { code: INVALID_SYMBOL, .. }) => {
                    debug!(requested = wanted.len(), "[CEX] unknown symbol requested, loading all tickers");
                    self.tickers(None).await?
                }
                other => other?,
            },
            None => self.tickers(None).await?,
        };
        Ok(wanted
            .iter()
            .map(|s| (s.clone(), all.get(s).copied().unwrap_or(0.0)))
            .collect())
    }
}

#[async_trait]
impl OrderGateway for BinanceClient {
    async fn place_market_order(&self, order: &MarketOrder) -> Result<OrderFill> {
        let query = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newOrderRespType=FULL&recvWindow={}&timestamp={}",
            order.symbol,
            order.side,
            order.quantity,
            RECV_WINDOW_MS,
            Utc::now().timestamp_millis()
        );
        let (api_key, signature) = self.sign(&query)?;
        let mut url = self.base_url.join("/api/v3/order")?;
        url.set_query(Some(&format!("{query}&signature={signature}")));

        info!(symbol = %order.symbol, side = %order.side, quantity = %order.quantity, "[CEX] submitting market order");
        let resp = self
            .http
            .post(url)
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await?;
        let parsed: OrderResponse = decode(resp).await?;
        net_fill(parsed, order.side, &order.receive_asset)
    }

    async fn get_symbol_step_size(&self, symbol: &str) -> Result<f64> {
        let cached = self.step_sizes.read().get(symbol).copied();
        if let Some(step) = cached {
            return Ok(step);
        }
        let info = self.exchange_info(Some(symbol)).await?;
        info.symbols
            .iter()
            .find(|s| s.symbol == symbol)
            .and_then(SymbolInfo::step_size)
            .ok_or_else(|| AppError::Other(format!("no LOT_SIZE filter for {symbol}")))
    }
}
