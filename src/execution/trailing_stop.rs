use serde::Deserialize;
use std::sync::Arc;

use crate::api::ExchangeGateway;
use crate::error::{TradingError, TradingResult};
use crate::execution::orchestrator::STOP_LIMIT_FACTOR;
use crate::execution::{Position, PositionManager};
use crate::models::{OrderSide, StopLimitOrder};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrailingSettings {
    /// Distance of the stop below the current price
    pub trailing_stop_pct: f64,
    /// Minimum gain over entry before the stop starts trailing
    pub activation_pct: f64,
}

impl Default for TrailingSettings {
    fn default() -> Self {
        Self {
            trailing_stop_pct: 0.05,
            activation_pct: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrailOutcome {
    /// Gain below the activation threshold
    Inactive { gain_pct: f64 },
    /// Activated but the candidate would not tighten the stop
    Held { candidate: f64, stop_price: f64 },
    /// Protective order replaced with a tighter stop
    Ratcheted { previous: f64, stop_price: f64 },
}

/// Ratchets the protective stop of every open position
pub struct TrailingStopManager {
    gateway: Arc<dyn ExchangeGateway>,
    settings: TrailingSettings,
}

impl TrailingStopManager {
    pub fn new(gateway: Arc<dyn ExchangeGateway>, settings: TrailingSettings) -> Self {
        Self { gateway, settings }
    }

    /// Candidate stop for a price, `None` while below activation
    pub fn candidate_stop(&self, position: &Position, current_price: f64) -> Option<f64> {
        if position.gain_pct(current_price) < self.settings.activation_pct {
            return None;
        }
        Some(current_price * (1.0 - self.settings.trailing_stop_pct))
    }

    /// Update every open position in symbol order
    ///
    /// A failure on one symbol is logged and does not stop the others.
    pub async fn update_all(
        &self,
        book: &mut PositionManager,
    ) -> Vec<(String, TradingResult<TrailOutcome>)> {
        let mut results = Vec::new();

        for symbol in book.symbols() {
            let Some(position) = book.get_open_position_mut(&symbol) else {
                continue;
            };

            let result = self.update_position(position).await;
            match &result {
                Ok(TrailOutcome::Ratcheted { previous, stop_price }) => {
                    tracing::info!(
                        symbol = %symbol,
                        previous,
                        stop_price,
                        "Trailing stop raised"
                    );
                }
                Ok(outcome) => {
                    tracing::debug!(symbol = %symbol, ?outcome, "Trailing stop unchanged");
                }
                Err(e) => {
                    tracing::error!(symbol = %symbol, "Trailing stop update failed: {}", e);
                }
            }
            results.push((symbol, result));
        }

        results
    }

    pub async fn update_position(&self, position: &mut Position) -> TradingResult<TrailOutcome> {
        let current_price = self
            .gateway
            .get_ticker(&position.symbol)
            .await
            .map_err(TradingError::data_unavailable)?;

        position.observe_price(current_price);

        let Some(candidate) = self.candidate_stop(position, current_price) else {
            return Ok(TrailOutcome::Inactive {
                gain_pct: position.gain_pct(current_price),
            });
        };

        // Strict: an unchanged price never replaces the order
        if candidate <= position.stop_price {
            return Ok(TrailOutcome::Held {
                candidate,
                stop_price: position.stop_price,
            });
        }

        if let Some(old) = position.protective_order {
            if let Err(e) = self.gateway.cancel_order(&position.symbol, &old).await {
                tracing::warn!(
                    symbol = %position.symbol,
                    order = %old,
                    "Failed to cancel protective order before ratchet: {}",
                    e
                );
            }
        }

        let order = StopLimitOrder {
            symbol: position.symbol.clone(),
            side: OrderSide::Sell,
            quantity: position.quantity,
            stop_price: candidate,
            limit_price: candidate * STOP_LIMIT_FACTOR,
        };

        let new_order = self
            .gateway
            .place_stop_limit_order(&order)
            .await
            .map_err(|e| TradingError::ProtectiveOrderFailure {
                symbol: position.symbol.clone(),
                order: position.protective_order,
                reason: e.to_string(),
            })?;

        let previous = position.stop_price;
        position.ratchet_stop(candidate, new_order)?;

        tracing::info!(
            symbol = %position.symbol,
            current_price,
            gain_pct = position.gain_pct(current_price),
            order = %new_order,
            "Placed trailing stop at {:.8}",
            candidate
        );

        Ok(TrailOutcome::Ratcheted {
            previous,
            stop_price: candidate,
        })
    }
}
