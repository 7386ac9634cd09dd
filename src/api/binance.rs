use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::RoundingStrategy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{ExchangeGateway, GatewayError};
use crate::models::{
    Balance, BracketOrder, Candle, Fill, OrderRef, OrderSide, StopLimitOrder,
};
use crate::precision::format_decimal;

const BINANCE_API_BASE: &str = "https://api.binance.com";
const BINANCE_TESTNET_API_BASE: &str = "https://testnet.binance.vision";

// Binance error codes
const UNKNOWN_ORDER: i64 = -2011;
const TOO_MANY_REQUESTS: i64 = -1003;
const DISCONNECTED: i64 = -1001;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Connection settings for the Binance spot REST API
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
    /// Overrides the production/testnet URL when set
    pub base_url: Option<String>,
    pub testnet: bool,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub request_timeout_secs: u64,
    pub recv_window_ms: u64,
    pub max_requests_per_minute: u32,
    pub max_read_retries: u32,
    pub retry_backoff_ms: u64,
    pub quantity_precision: u32,
    pub price_precision: u32,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            testnet: false,
            api_key: None,
            api_secret: None,
            request_timeout_secs: 10,
            recv_window_ms: 5000,
            max_requests_per_minute: 600,
            max_read_retries: 3,
            retry_backoff_ms: 1000,
            quantity_precision: 6,
            price_precision: 2,
        }
    }
}

impl BinanceConfig {
    pub fn resolved_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.testnet => BINANCE_TESTNET_API_BASE.to_string(),
            None => BINANCE_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    free: String,
    #[serde(default)]
    locked: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderListResponse {
    order_list_id: i64,
}

/// Binance spot REST client
///
/// Cloneable; clones share the HTTP connection pool and the rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    config: BinanceConfig,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceClient {
    pub fn new(config: BinanceConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let rpm = NonZeroU32::new(config.max_requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: config.resolved_base_url(),
            config,
            rate_limiter,
        })
    }

    fn quantity_param(&self, quantity: f64) -> String {
        format_decimal(
            quantity,
            self.config.quantity_precision,
            RoundingStrategy::ToZero,
        )
    }

    fn price_param(&self, price: f64) -> String {
        format_decimal(
            price,
            self.config.price_precision,
            RoundingStrategy::MidpointAwayFromZero,
        )
    }

    fn sign(&self, payload: &str) -> Result<String, GatewayError> {
        let secret = self
            .config
            .api_secret
            .as_deref()
            .ok_or(GatewayError::MissingCredentials)?;

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| GatewayError::Http(format!("invalid api secret: {}", e)))?;
        mac.update(payload.as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Send one request and decode the body, mapping Binance error payloads
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T, GatewayError> {
        let mut query = encode_query(params);

        let mut request = if signed {
            let api_key = self
                .config
                .api_key
                .as_deref()
                .ok_or(GatewayError::MissingCredentials)?;

            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&format!(
                "recvWindow={}&timestamp={}",
                self.config.recv_window_ms,
                Utc::now().timestamp_millis()
            ));
            let signature = self.sign(&query)?;
            query.push_str(&format!("&signature={}", signature));

            self.client
                .request(method, format!("{}{}?{}", self.base_url, path, query))
                .header("X-MBX-APIKEY", api_key)
        } else {
            let url = if query.is_empty() {
                format!("{}{}", self.base_url, path)
            } else {
                format!("{}{}?{}", self.base_url, path, query)
            };
            self.client.request(method, url)
        };

        request = request.header("Accept", "application/json");

        self.rate_limiter.until_ready().await;
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(decode_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| GatewayError::Decode(format!("{}: {}", e, body)))
    }

    /// Retry read-only calls on transient failures with exponential backoff
    async fn read_with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.config.max_read_retries.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && is_transient(&e) => {
                    let backoff_ms = backoff_delay_ms(self.config.retry_backoff_ms, attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                        what,
                        attempt,
                        max_attempts,
                        e,
                        backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Delay before retry number `attempt`, doubling from `base_ms`
fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)))
}

fn decode_error(status: StatusCode, body: &str) -> GatewayError {
    // 5xx stays retryable even when the gateway sends a JSON error body
    if status.is_server_error() {
        return GatewayError::Http(format!("status {}: {}", status, body));
    }

    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(err) => GatewayError::Rejected {
            code: err.code,
            msg: err.msg,
        },
        Err(_) => GatewayError::Http(format!("status {}: {}", status, body)),
    }
}

fn is_transient(err: &GatewayError) -> bool {
    match err {
        GatewayError::Http(_) | GatewayError::Timeout => true,
        GatewayError::Rejected { code, .. } => *code == TOO_MANY_REQUESTS || *code == DISCONNECTED,
        _ => false,
    }
}

fn parse_number(field: &str, raw: &str) -> Result<f64, GatewayError> {
    raw.parse::<f64>()
        .map_err(|_| GatewayError::Decode(format!("{} is not a number: {:?}", field, raw)))
}

fn parse_kline(symbol: &str, row: &[serde_json::Value]) -> Result<Candle, GatewayError> {
    if row.len() < 6 {
        return Err(GatewayError::Decode(format!(
            "kline row has {} fields",
            row.len()
        )));
    }

    let field = |idx: usize, name: &str| -> Result<f64, GatewayError> {
        match &row[idx] {
            serde_json::Value::String(s) => parse_number(name, s),
            serde_json::Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| GatewayError::Decode(format!("{} out of range", name))),
            other => Err(GatewayError::Decode(format!("{} has type {}", name, other))),
        }
    };

    let open_time_ms = row[0]
        .as_i64()
        .ok_or_else(|| GatewayError::Decode("kline open time".to_string()))?;
    let open_time = DateTime::from_timestamp_millis(open_time_ms)
        .ok_or_else(|| GatewayError::Decode(format!("bad timestamp {}", open_time_ms)))?;

    Ok(Candle {
        symbol: symbol.to_string(),
        open_time,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn get_ticker(&self, symbol: &str) -> Result<f64, GatewayError> {
        let params = [("symbol", symbol.to_string())];
        let ticker: TickerResponse = self
            .read_with_retry("ticker", || {
                self.execute(Method::GET, "/api/v3/ticker/price", &params, false)
            })
            .await?;

        parse_number("price", &ticker.price)
    }

    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<Vec<serde_json::Value>> = self
            .read_with_retry("klines", || {
                self.execute(Method::GET, "/api/v3/klines", &params, false)
            })
            .await?;

        if rows.is_empty() {
            return Err(GatewayError::NoData(symbol.to_string()));
        }

        rows.iter().map(|row| parse_kline(symbol, row)).collect()
    }

    async fn get_balance(&self, asset: &str) -> Result<Balance, GatewayError> {
        let account: AccountResponse = self
            .read_with_retry("account", || {
                self.execute(Method::GET, "/api/v3/account", &[], true)
            })
            .await?;

        // Zero balances may be omitted from the listing
        match account.balances.iter().find(|b| b.asset == asset) {
            Some(entry) => Ok(Balance {
                free: parse_number("free", &entry.free)?,
                locked: match &entry.locked {
                    Some(raw) => parse_number("locked", raw)?,
                    None => 0.0,
                },
            }),
            None => Ok(Balance::default()),
        }
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<Fill, GatewayError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", self.quantity_param(quantity)),
            ("newOrderRespType", "FULL".to_string()),
        ];
        let response: OrderResponse = self
            .execute(Method::POST, "/api/v3/order", &params, true)
            .await?;

        let executed_qty = match response.executed_qty.as_deref() {
            Some(raw) => parse_number("executedQty", raw)?,
            None => 0.0,
        };
        let quote_qty = match response.cummulative_quote_qty.as_deref() {
            Some(raw) => parse_number("cummulativeQuoteQty", raw)?,
            None => 0.0,
        };
        let avg_price = if executed_qty > 0.0 {
            quote_qty / executed_qty
        } else {
            0.0
        };

        Ok(Fill {
            order_id: response.order_id,
            executed_qty,
            avg_price,
        })
    }

    async fn place_bracket_order(&self, order: &BracketOrder) -> Result<OrderRef, GatewayError> {
        let params = [
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("quantity", self.quantity_param(order.quantity)),
            ("price", self.price_param(order.take_profit_price)),
            ("stopPrice", self.price_param(order.stop_price)),
            ("stopLimitPrice", self.price_param(order.stop_limit_price)),
            ("stopLimitTimeInForce", "GTC".to_string()),
        ];
        let response: OrderListResponse = self
            .execute(Method::POST, "/api/v3/order/oco", &params, true)
            .await?;

        Ok(OrderRef::OrderList(response.order_list_id))
    }

    async fn place_stop_limit_order(
        &self,
        order: &StopLimitOrder,
    ) -> Result<OrderRef, GatewayError> {
        let params = [
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "STOP_LOSS_LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", self.quantity_param(order.quantity)),
            ("stopPrice", self.price_param(order.stop_price)),
            ("price", self.price_param(order.limit_price)),
        ];
        let response: OrderResponse = self
            .execute(Method::POST, "/api/v3/order", &params, true)
            .await?;

        Ok(OrderRef::Order(response.order_id))
    }

    async fn cancel_order(&self, symbol: &str, order: &OrderRef) -> Result<(), GatewayError> {
        let (path, params) = match order {
            OrderRef::Order(id) => (
                "/api/v3/order",
                [("symbol", symbol.to_string()), ("orderId", id.to_string())],
            ),
            OrderRef::OrderList(id) => (
                "/api/v3/orderList",
                [
                    ("symbol", symbol.to_string()),
                    ("orderListId", id.to_string()),
                ],
            ),
        };

        match self
            .execute::<serde_json::Value>(Method::DELETE, path, &params, true)
            .await
        {
            Ok(_) => Ok(()),
            Err(GatewayError::Rejected { code, msg }) if code == UNKNOWN_ORDER => {
                tracing::debug!("Cancel of {} ignored: {}", order, msg);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
