pub mod binance;

pub use binance::{BinanceClient, BinanceConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Balance, BracketOrder, Candle, Fill, OrderRef, OrderSide, StopLimitOrder,
};

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("no data returned for {0}")]
    NoData(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("request timed out")]
    Timeout,

    #[error("exchange rejected request ({code}): {msg}")]
    Rejected { code: i64, msg: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("api credentials are not configured")]
    MissingCredentials,
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else if e.is_decode() {
            GatewayError::Decode(e.to_string())
        } else {
            GatewayError::Http(e.to_string())
        }
    }
}

/// Exchange capabilities consumed by the trading core
///
/// Implementations must not retry order placement: a retried submit can
/// double-place. Read operations may retry.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Last traded price
    async fn get_ticker(&self, symbol: &str) -> Result<f64, GatewayError>;

    /// Most recent `limit` bars, oldest first. `NoData` if empty.
    async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError>;

    /// Free and locked amounts of an asset, zero if the account holds none
    async fn get_balance(&self, asset: &str) -> Result<Balance, GatewayError>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<Fill, GatewayError>;

    /// Stop-loss-limit + take-profit pair; returns the order list id
    async fn place_bracket_order(&self, order: &BracketOrder) -> Result<OrderRef, GatewayError>;

    async fn place_stop_limit_order(
        &self,
        order: &StopLimitOrder,
    ) -> Result<OrderRef, GatewayError>;

    /// Cancelling an order that is already filled or cancelled is not an error
    async fn cancel_order(&self, symbol: &str, order: &OrderRef) -> Result<(), GatewayError>;
}
