use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OHLCV candlestick data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trading signal produced by the strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Enter,
    Exit,
    Hold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Exchange wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Reference to a live exchange order
///
/// Bracket (OCO) orders are tracked by their order list id, plain stop
/// orders by their order id. The two are cancelled through different calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderRef {
    Order(u64),
    OrderList(i64),
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderRef::Order(id) => write!(f, "order:{}", id),
            OrderRef::OrderList(id) => write!(f, "list:{}", id),
        }
    }
}

/// Fill confirmation for a market order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: u64,
    pub executed_qty: f64,
    pub avg_price: f64,
}

impl Fill {
    /// A zero-quantity fill is an acknowledgement, not a confirmation
    pub fn is_confirmed(&self) -> bool {
        self.executed_qty > 0.0
    }
}

/// Account holdings of one asset
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub free: f64,
    /// Reserved by open orders, e.g. a resting stop or OCO
    pub locked: f64,
}

impl Balance {
    pub fn total(&self) -> f64 {
        self.free + self.locked
    }
}

/// Combined stop-loss-limit + take-profit order pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BracketOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub stop_price: f64,
    pub stop_limit_price: f64,
    pub take_profit_price: f64,
}

/// Single stop-loss-limit order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopLimitOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub stop_price: f64,
    pub limit_price: f64,
}
