// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod precision;
pub mod strategy;

// Re-export commonly used types
pub use api::{ExchangeGateway, GatewayError};
pub use config::BotConfig;
pub use error::{TradingError, TradingResult};
pub use execution::TradingBot;
pub use models::*;
pub use strategy::Strategy;
