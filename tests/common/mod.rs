#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rsibot::api::{ExchangeGateway, GatewayError};
use rsibot::models::{
    Balance, BracketOrder, Candle, Fill, OrderRef, OrderSide, StopLimitOrder,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Orders and cancels seen by the scripted exchange
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Market {
        symbol: String,
        side: OrderSide,
        quantity: f64,
    },
    Bracket(BracketOrder),
    StopLimit(StopLimitOrder),
    Cancel {
        symbol: String,
        order: OrderRef,
    },
}

#[derive(Default)]
pub struct MockState {
    pub candles: Vec<Candle>,
    pub prices: HashMap<String, f64>,
    /// Free amounts
    pub balances: HashMap<String, f64>,
    /// Amounts held by resting protective orders
    pub locked: HashMap<String, f64>,
    /// Asset and amount each resting order holds
    pub holds: HashMap<OrderRef, (String, f64)>,
    pub fail_ticker: HashSet<String>,
    pub fail_klines: bool,
    pub fail_market: bool,
    pub unfilled_market: bool,
    pub fail_bracket: bool,
    pub fail_stop_limit: bool,
    pub fail_cancel: bool,
    pub next_id: u64,
    pub calls: Vec<Call>,
}

/// In-memory exchange driven by test scripts
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F: FnOnce(&mut MockState)>(&self, f: F) {
        let mut state = self.state.lock().unwrap();
        f(&mut state);
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.with(|s| {
            s.prices.insert(symbol.to_string(), price);
        });
    }

    pub fn set_balance(&self, asset: &str, amount: f64) {
        self.with(|s| {
            s.balances.insert(asset.to_string(), amount);
        });
    }

    pub fn free_balance(&self, asset: &str) -> f64 {
        let state = self.state.lock().unwrap();
        state.balances.get(asset).copied().unwrap_or(0.0)
    }

    pub fn locked_balance(&self, asset: &str) -> f64 {
        let state = self.state.lock().unwrap();
        state.locked.get(asset).copied().unwrap_or(0.0)
    }

    /// The exchange executes a resting protective order on its own
    pub fn fill_resting(&self, order: OrderRef) {
        self.with(|s| {
            if let Some((asset, amount)) = s.holds.remove(&order) {
                let locked = s.locked.entry(asset).or_insert(0.0);
                *locked = (*locked - amount).max(0.0);
            }
        });
    }

    pub fn set_candles(&self, candles: Vec<Candle>) {
        self.with(|s| s.candles = candles);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    pub fn brackets(&self) -> Vec<BracketOrder> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Bracket(order) => Some(order),
                _ => None,
            })
            .collect()
    }

    pub fn stop_limits(&self) -> Vec<StopLimitOrder> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::StopLimit(order) => Some(order),
                _ => None,
            })
            .collect()
    }

    pub fn cancels(&self) -> Vec<OrderRef> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Cancel { order, .. } => Some(order),
                _ => None,
            })
            .collect()
    }

    pub fn market_orders(&self) -> Vec<(OrderSide, f64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Market { side, quantity, .. } => Some((side, quantity)),
                _ => None,
            })
            .collect()
    }
}

fn base_asset(symbol: &str) -> String {
    symbol.trim_end_matches("USDT").to_string()
}

impl MockState {
    /// Move up to `quantity` of the base asset from free to locked
    fn hold(&mut self, order: OrderRef, symbol: &str, quantity: f64) {
        let base = base_asset(symbol);
        let free = self.balances.entry(base.clone()).or_insert(0.0);
        let amount = free.min(quantity);
        *free -= amount;
        *self.locked.entry(base.clone()).or_insert(0.0) += amount;
        self.holds.insert(order, (base, amount));
    }

    fn release(&mut self, order: &OrderRef) {
        if let Some((asset, amount)) = self.holds.remove(order) {
            let locked = self.locked.entry(asset.clone()).or_insert(0.0);
            *locked = (*locked - amount).max(0.0);
            *self.balances.entry(asset).or_insert(0.0) += amount;
        }
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn get_ticker(&self, symbol: &str) -> Result<f64, GatewayError> {
        let state = self.state.lock().unwrap();
        if state.fail_ticker.contains(symbol) {
            return Err(GatewayError::Timeout);
        }
        state
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::NoData(symbol.to_string()))
    }

    async fn get_klines(
        &self,
        symbol: &str,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let state = self.state.lock().unwrap();
        if state.fail_klines {
            return Err(GatewayError::Http("connection reset".to_string()));
        }
        if state.candles.is_empty() {
            return Err(GatewayError::NoData(symbol.to_string()));
        }
        let skip = state.candles.len().saturating_sub(limit);
        Ok(state.candles[skip..].to_vec())
    }

    async fn get_balance(&self, asset: &str) -> Result<Balance, GatewayError> {
        let state = self.state.lock().unwrap();
        Ok(Balance {
            free: state.balances.get(asset).copied().unwrap_or(0.0),
            locked: state.locked.get(asset).copied().unwrap_or(0.0),
        })
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<Fill, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Market {
            symbol: symbol.to_string(),
            side,
            quantity,
        });
        if state.fail_market {
            return Err(GatewayError::Rejected {
                code: -2010,
                msg: "Account has insufficient balance".to_string(),
            });
        }

        let base = base_asset(symbol);
        let held = state.balances.get(&base).copied().unwrap_or(0.0);
        if side == OrderSide::Sell && quantity > held + 1e-9 {
            return Err(GatewayError::Rejected {
                code: -2010,
                msg: "Account has insufficient balance for requested action.".to_string(),
            });
        }

        state.next_id += 1;
        let order_id = state.next_id;
        if state.unfilled_market {
            return Ok(Fill {
                order_id,
                executed_qty: 0.0,
                avg_price: 0.0,
            });
        }

        let price = state.prices.get(symbol).copied().unwrap_or(0.0);
        let updated = match side {
            OrderSide::Buy => held + quantity,
            OrderSide::Sell => (held - quantity).max(0.0),
        };
        state.balances.insert(base, updated);

        Ok(Fill {
            order_id,
            executed_qty: quantity,
            avg_price: price,
        })
    }

    async fn place_bracket_order(&self, order: &BracketOrder) -> Result<OrderRef, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Bracket(order.clone()));
        if state.fail_bracket {
            return Err(GatewayError::Rejected {
                code: -1013,
                msg: "Filter failure: PRICE_FILTER".to_string(),
            });
        }
        state.next_id += 1;
        let placed = OrderRef::OrderList(state.next_id as i64);
        state.hold(placed, &order.symbol, order.quantity);
        Ok(placed)
    }

    async fn place_stop_limit_order(
        &self,
        order: &StopLimitOrder,
    ) -> Result<OrderRef, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::StopLimit(order.clone()));
        if state.fail_stop_limit {
            return Err(GatewayError::Timeout);
        }
        state.next_id += 1;
        let placed = OrderRef::Order(state.next_id);
        state.hold(placed, &order.symbol, order.quantity);
        Ok(placed)
    }

    async fn cancel_order(&self, symbol: &str, order: &OrderRef) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Cancel {
            symbol: symbol.to_string(),
            order: *order,
        });
        if state.fail_cancel {
            return Err(GatewayError::Http("connection reset".to_string()));
        }
        state.release(order);
        Ok(())
    }
}

/// Five-minute candles with the given closes, oldest first
pub fn candles(symbol: &str, closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            symbol: symbol.to_string(),
            open_time: start + Duration::minutes(5 * i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        })
        .collect()
}

/// Strictly falling closes ending at `last` (oscillator reads 0)
pub fn falling_to(last: f64, count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| last + (count - 1 - i) as f64 * 0.5)
        .collect()
}

/// Strictly rising closes ending at `last` (oscillator reads 100)
pub fn rising_to(last: f64, count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| last - (count - 1 - i) as f64 * 0.5)
        .collect()
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
