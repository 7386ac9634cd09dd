use thiserror::Error;

use crate::api::GatewayError;
use crate::models::OrderRef;

/// Failure taxonomy for one trading cycle
///
/// Every variant is recoverable: the control loop logs it and carries on
/// with the next cycle.
#[derive(Debug, Error)]
pub enum TradingError {
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("order quantity {quantity} is not positive after rounding")]
    InsufficientQuantity { quantity: f64 },

    #[error("entry order rejected for {symbol}: {reason}")]
    EntryRejected { symbol: String, reason: String },

    #[error("exit order rejected for {symbol}: {reason}")]
    ExitRejected { symbol: String, reason: String },

    #[error("no {asset} balance to sell")]
    NoBalance { asset: String },

    #[error("protective order failure for {symbol}: {reason}")]
    ProtectiveOrderFailure {
        symbol: String,
        order: Option<OrderRef>,
        reason: String,
    },

    #[error("already have an open position for {symbol}")]
    AlreadyInPosition { symbol: String },

    #[error("no open position for {symbol}")]
    NoPosition { symbol: String },

    #[error("stop for {symbol} cannot move down from {current} to {requested}")]
    StopWouldLoosen {
        symbol: String,
        current: f64,
        requested: f64,
    },

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl TradingError {
    pub fn data_unavailable(err: GatewayError) -> Self {
        TradingError::DataUnavailable(err.to_string())
    }
}

pub type TradingResult<T> = std::result::Result<T, TradingError>;
