use serde::Deserialize;
use std::sync::Arc;

use crate::api::ExchangeGateway;
use crate::error::{TradingError, TradingResult};
use crate::execution::{Position, PositionManager};
use crate::models::{BracketOrder, Fill, OrderSide};
use crate::precision::floor_to_precision;

/// Stop-limit orders rest 1% under their trigger so they still fill on a gap
pub const STOP_LIMIT_FACTOR: f64 = 0.99;

/// What to do with a position that has no protective order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnprotectedPolicy {
    /// Log and keep polling
    #[default]
    Accept,
    /// Re-submit the bracket on the next cycle
    RetryBracket,
    /// Sell the position at market
    Liquidate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrderSettings {
    pub risk_fraction: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub quantity_precision: u32,
    pub dust_threshold: f64,
    pub unprotected_policy: UnprotectedPolicy,
    /// Forget a position whose base balance is gone instead of keeping it
    pub release_empty_positions: bool,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            risk_fraction: 0.95,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.06,
            quantity_precision: 6,
            dust_threshold: 0.0,
            unprotected_policy: UnprotectedPolicy::Accept,
            release_empty_positions: false,
        }
    }
}

/// Exit levels of the bracket placed right after entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketLevels {
    pub stop_price: f64,
    pub stop_limit_price: f64,
    pub take_profit_price: f64,
}

impl BracketLevels {
    pub fn from_entry(entry_price: f64, stop_loss_pct: f64, take_profit_pct: f64) -> Self {
        let stop_price = entry_price * (1.0 - stop_loss_pct);
        Self {
            stop_price,
            stop_limit_price: stop_price * STOP_LIMIT_FACTOR,
            take_profit_price: entry_price * (1.0 + take_profit_pct),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExitOutcome {
    /// Market sell filled and the position was cleared
    Closed { fill: Fill, realized_pnl: f64 },
    /// No base balance to sell; no order was touched and the position is kept
    NothingToSell,
    /// No base balance to sell and the position was forgotten
    Released,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtectionOutcome {
    Exposed,
    Protected,
    Liquidated,
}

/// Places and tears down entry, bracket and exit orders
pub struct OrderOrchestrator {
    gateway: Arc<dyn ExchangeGateway>,
    settings: OrderSettings,
}

impl OrderOrchestrator {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, settings: OrderSettings) -> Self {
        Self { gateway, settings }
    }

    /// Size from the quote balance, risk fraction and price, floored to precision
    pub fn position_size(&self, price: f64, quote_balance: f64) -> TradingResult<f64> {
        let raw = (quote_balance * self.settings.risk_fraction) / price;
        let quantity = floor_to_precision(raw, self.settings.quantity_precision);

        // Also rejects NaN from a zero price
        if !(quantity > 0.0) {
            return Err(TradingError::InsufficientQuantity { quantity });
        }
        Ok(quantity)
    }

    /// Buy at market and protect the fill with a bracket order
    ///
    /// A failed bracket does not undo the entry: the position is recorded
    /// without a protective order and handled by `protect_exposed`.
    pub async fn enter_position(
        &self,
        book: &mut PositionManager,
        symbol: &str,
        base_asset: &str,
        price: f64,
        quote_balance: f64,
    ) -> TradingResult<Position> {
        if book.has_open_position(symbol) {
            return Err(TradingError::AlreadyInPosition {
                symbol: symbol.to_string(),
            });
        }

        let quantity = self.position_size(price, quote_balance)?;

        tracing::info!(
            symbol,
            price,
            quantity,
            quote_balance,
            "Submitting market buy"
        );

        let fill = self
            .gateway
            .place_market_order(symbol, OrderSide::Buy, quantity)
            .await
            .map_err(|e| TradingError::EntryRejected {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;

        if !fill.is_confirmed() {
            return Err(TradingError::EntryRejected {
                symbol: symbol.to_string(),
                reason: format!("order {} returned no fill", fill.order_id),
            });
        }

        let quantity = floor_to_precision(fill.executed_qty, self.settings.quantity_precision);
        let levels = BracketLevels::from_entry(
            price,
            self.settings.stop_loss_pct,
            self.settings.take_profit_pct,
        );

        tracing::info!(
            symbol,
            order_id = fill.order_id,
            executed_qty = fill.executed_qty,
            avg_price = fill.avg_price,
            "Entry filled"
        );

        let mut position = Position::new(symbol, base_asset, price, quantity, levels.stop_price);

        let bracket = BracketOrder {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            quantity,
            stop_price: levels.stop_price,
            stop_limit_price: levels.stop_limit_price,
            take_profit_price: levels.take_profit_price,
        };

        match self.gateway.place_bracket_order(&bracket).await {
            Ok(order) => {
                tracing::info!(
                    symbol,
                    %order,
                    stop_price = levels.stop_price,
                    stop_limit_price = levels.stop_limit_price,
                    take_profit_price = levels.take_profit_price,
                    "Bracket order placed"
                );
                position.protective_order = Some(order);
            }
            Err(e) => {
                tracing::error!(
                    symbol,
                    quantity,
                    stop_price = levels.stop_price,
                    take_profit_price = levels.take_profit_price,
                    "Bracket order failed, position is unprotected: {}",
                    e
                );
            }
        }

        Ok(book.open_position(position)?.clone())
    }

    /// Free plus locked base balance, floored to precision
    ///
    /// A resting stop or OCO locks the position, so the free amount alone
    /// reads as zero while the protective order is live.
    async fn sellable_balance(&self, position: &Position) -> TradingResult<f64> {
        let balance = self
            .gateway
            .get_balance(&position.base_asset)
            .await
            .map_err(TradingError::data_unavailable)?;
        let quantity = floor_to_precision(balance.total(), self.settings.quantity_precision);

        if quantity <= 0.0 || quantity <= self.settings.dust_threshold {
            return Err(TradingError::NoBalance {
                asset: position.base_asset.clone(),
            });
        }
        Ok(quantity)
    }

    /// Cancel the protective order and sell the whole base balance
    ///
    /// Without a balance nothing is cancelled or sold. A failed sell leaves
    /// the position open so the next exit signal retries.
    pub async fn exit_position(
        &self,
        book: &mut PositionManager,
        symbol: &str,
    ) -> TradingResult<ExitOutcome> {
        let position = book
            .get_open_position(symbol)
            .cloned()
            .ok_or_else(|| TradingError::NoPosition {
                symbol: symbol.to_string(),
            })?;

        let quantity = match self.sellable_balance(&position).await {
            Ok(quantity) => quantity,
            Err(TradingError::NoBalance { asset }) => {
                if self.settings.release_empty_positions {
                    tracing::warn!(symbol, asset = %asset, "No balance to sell, releasing position");
                    book.close_position(symbol)?;
                    return Ok(ExitOutcome::Released);
                }
                tracing::warn!(symbol, asset = %asset, "No balance to sell, skipping exit");
                return Ok(ExitOutcome::NothingToSell);
            }
            Err(e) => return Err(e),
        };

        if let Some(order) = position.protective_order {
            match self.gateway.cancel_order(symbol, &order).await {
                Ok(()) => {
                    tracing::info!(symbol, %order, "Protective order cancelled");
                    if let Some(open) = book.get_open_position_mut(symbol) {
                        open.protective_order = None;
                    }
                }
                Err(e) => {
                    // The sell below fails too if the order still holds the balance
                    tracing::warn!(symbol, %order, "Failed to cancel protective order: {}", e);
                }
            }
        }

        tracing::info!(symbol, quantity, "Submitting market sell");

        let fill = self
            .gateway
            .place_market_order(symbol, OrderSide::Sell, quantity)
            .await
            .map_err(|e| TradingError::ExitRejected {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;

        if !fill.is_confirmed() {
            return Err(TradingError::ExitRejected {
                symbol: symbol.to_string(),
                reason: format!("order {} returned no fill", fill.order_id),
            });
        }

        let realized_pnl = (fill.avg_price - position.entry_price) * fill.executed_qty;
        book.close_position(symbol)?;

        tracing::info!(
            symbol,
            order_id = fill.order_id,
            exit_price = fill.avg_price,
            realized_pnl,
            "Exit filled"
        );

        Ok(ExitOutcome::Closed { fill, realized_pnl })
    }

    /// Apply the unprotected-position policy to every exposed position
    pub async fn protect_exposed(
        &self,
        book: &mut PositionManager,
    ) -> Vec<(String, TradingResult<ProtectionOutcome>)> {
        let exposed: Vec<String> = book
            .open_positions()
            .into_iter()
            .filter(|p| !p.is_protected())
            .map(|p| p.symbol.clone())
            .collect();

        let mut results = Vec::with_capacity(exposed.len());
        for symbol in exposed {
            let result = self.protect_one(book, &symbol).await;
            if let Err(e) = &result {
                tracing::error!(symbol = %symbol, "Failed to handle unprotected position: {}", e);
            }
            results.push((symbol, result));
        }
        results
    }

    async fn protect_one(
        &self,
        book: &mut PositionManager,
        symbol: &str,
    ) -> TradingResult<ProtectionOutcome> {
        match self.settings.unprotected_policy {
            UnprotectedPolicy::Accept => {
                tracing::warn!(symbol, "Position has no protective order");
                Ok(ProtectionOutcome::Exposed)
            }
            UnprotectedPolicy::Liquidate => {
                tracing::warn!(symbol, "Liquidating unprotected position");
                match self.exit_position(book, symbol).await? {
                    ExitOutcome::NothingToSell => Ok(ProtectionOutcome::Exposed),
                    ExitOutcome::Closed { .. } | ExitOutcome::Released => {
                        Ok(ProtectionOutcome::Liquidated)
                    }
                }
            }
            UnprotectedPolicy::RetryBracket => {
                let position =
                    book.get_open_position_mut(symbol)
                        .ok_or_else(|| TradingError::NoPosition {
                            symbol: symbol.to_string(),
                        })?;

                let bracket = BracketOrder {
                    symbol: symbol.to_string(),
                    side: OrderSide::Sell,
                    quantity: position.quantity,
                    stop_price: position.stop_price,
                    stop_limit_price: position.stop_price * STOP_LIMIT_FACTOR,
                    take_profit_price: position.entry_price
                        * (1.0 + self.settings.take_profit_pct),
                };

                let order = self
                    .gateway
                    .place_bracket_order(&bracket)
                    .await
                    .map_err(|e| TradingError::ProtectiveOrderFailure {
                        symbol: symbol.to_string(),
                        order: None,
                        reason: e.to_string(),
                    })?;

                tracing::info!(symbol, %order, stop_price = bracket.stop_price, "Bracket order re-placed");
                position.protective_order = Some(order);
                Ok(ProtectionOutcome::Protected)
            }
        }
    }
}
