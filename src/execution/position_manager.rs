use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{TradingError, TradingResult};
use crate::models::OrderRef;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub base_asset: String,
    pub entry_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_price: f64,                    // Never decreases while open
    pub protective_order: Option<OrderRef>, // None = exposed position
    pub highest_observed_price: f64,
}

impl Position {
    pub fn new(
        symbol: impl Into<String>,
        base_asset: impl Into<String>,
        entry_price: f64,
        quantity: f64,
        stop_price: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            base_asset: base_asset.into(),
            entry_price,
            quantity,
            entry_time: Utc::now(),
            stop_price,
            protective_order: None,
            highest_observed_price: entry_price,
        }
    }

    pub fn with_protective_order(mut self, order: OrderRef) -> Self {
        self.protective_order = Some(order);
        self
    }

    pub fn is_protected(&self) -> bool {
        self.protective_order.is_some()
    }

    /// Fractional gain of `current_price` over entry
    pub fn gain_pct(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) / self.entry_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.quantity
    }

    pub fn observe_price(&mut self, price: f64) {
        if price > self.highest_observed_price {
            self.highest_observed_price = price;
        }
    }

    /// Swap in a tighter stop and the order that enforces it
    pub fn ratchet_stop(&mut self, new_stop: f64, order: OrderRef) -> TradingResult<()> {
        if new_stop < self.stop_price {
            return Err(TradingError::StopWouldLoosen {
                symbol: self.symbol.clone(),
                current: self.stop_price,
                requested: new_stop,
            });
        }

        self.stop_price = new_stop;
        self.protective_order = Some(order);
        Ok(())
    }
}

/// Open positions keyed by symbol, at most one per symbol
#[derive(Debug, Default)]
pub struct PositionManager {
    positions: HashMap<String, Position>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_position(&mut self, position: Position) -> TradingResult<&Position> {
        if self.positions.contains_key(&position.symbol) {
            return Err(TradingError::AlreadyInPosition {
                symbol: position.symbol,
            });
        }

        tracing::info!(
            symbol = %position.symbol,
            entry_price = position.entry_price,
            quantity = position.quantity,
            stop_price = position.stop_price,
            protective_order = ?position.protective_order,
            "Opened position"
        );

        let symbol = position.symbol.clone();
        Ok(self.positions.entry(symbol).or_insert(position))
    }

    /// Remove a position together with its protective order reference
    pub fn close_position(&mut self, symbol: &str) -> TradingResult<Position> {
        let position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| TradingError::NoPosition {
                symbol: symbol.to_string(),
            })?;

        tracing::info!(
            symbol = %position.symbol,
            entry_price = position.entry_price,
            quantity = position.quantity,
            "Closed position"
        );

        Ok(position)
    }

    pub fn has_open_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn get_open_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn get_open_position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.get_mut(symbol)
    }

    /// Symbols with an open position, sorted for a stable processing order
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.positions.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        let mut positions: Vec<&Position> = self.positions.values().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(symbol: &str) -> Position {
        Position::new(symbol, "BTC", 100.0, 1.0, 98.0).with_protective_order(OrderRef::OrderList(1))
    }

    #[test]
    fn test_open_position() {
        let mut pm = PositionManager::new();
        pm.open_position(position("BTCUSDT")).unwrap();

        assert!(pm.has_open_position("BTCUSDT"));
        assert_eq!(pm.len(), 1);

        let position = pm.get_open_position("BTCUSDT").unwrap();
        assert_eq!(position.entry_price, 100.0);
        assert_eq!(position.quantity, 1.0);
        assert_eq!(position.stop_price, 98.0);
        assert_eq!(position.highest_observed_price, 100.0);
        assert!(position.is_protected());
    }

    #[test]
    fn test_prevent_duplicate_positions() {
        let mut pm = PositionManager::new();
        pm.open_position(position("BTCUSDT")).unwrap();

        let result = pm.open_position(position("BTCUSDT"));
        assert!(matches!(result, Err(TradingError::AlreadyInPosition { .. })));
        assert_eq!(pm.len(), 1);
    }

    #[test]
    fn test_close_position_clears_references() {
        let mut pm = PositionManager::new();
        pm.open_position(position("BTCUSDT")).unwrap();

        let closed = pm.close_position("BTCUSDT").unwrap();
        assert_eq!(closed.protective_order, Some(OrderRef::OrderList(1)));
        assert!(!pm.has_open_position("BTCUSDT"));
        assert!(pm.is_empty());

        let result = pm.close_position("BTCUSDT");
        assert!(matches!(result, Err(TradingError::NoPosition { .. })));
    }

    #[test]
    fn test_ratchet_only_tightens() {
        let mut position = position("BTCUSDT");

        position.ratchet_stop(104.5, OrderRef::Order(9)).unwrap();
        assert_eq!(position.stop_price, 104.5);
        assert_eq!(position.protective_order, Some(OrderRef::Order(9)));

        let result = position.ratchet_stop(100.0, OrderRef::Order(10));
        assert!(matches!(result, Err(TradingError::StopWouldLoosen { .. })));
        assert_eq!(position.stop_price, 104.5);
        assert_eq!(position.protective_order, Some(OrderRef::Order(9)));
    }

    #[test]
    fn test_pnl_calculation() {
        let position = Position::new("BTCUSDT", "BTC", 100.0, 2.0, 98.0);

        assert_eq!(position.unrealized_pnl(110.0), 20.0);
        assert_eq!(position.unrealized_pnl(95.0), -10.0);
        assert!((position.gain_pct(103.0) - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_observe_price_keeps_high_water_mark() {
        let mut position = position("BTCUSDT");
        position.observe_price(105.0);
        position.observe_price(101.0);
        assert_eq!(position.highest_observed_price, 105.0);
    }

    #[test]
    fn test_open_positions_sorted() {
        let mut pm = PositionManager::new();
        pm.open_position(position("ETHUSDT")).unwrap();
        pm.open_position(position("BTCUSDT")).unwrap();

        assert_eq!(pm.symbols(), vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(pm.open_positions()[0].symbol, "BTCUSDT");
    }
}
