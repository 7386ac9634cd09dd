use anyhow::Context;
use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::api::BinanceConfig;
use crate::execution::{OrderSettings, TrailingSettings};
use crate::strategy::signals::{interval_seconds, SignalConfig};

const ENV_PREFIX: &str = "RSIBOT";
const DEFAULT_LOG_FILTER: &str = "rsibot=info";
const MAX_READ_RETRIES: u32 = 10;

/// Runtime configuration of the bot
///
/// Read from an optional TOML file, then overridden by `RSIBOT_*`
/// environment variables. Nested tables use a double underscore, e.g.
/// `RSIBOT_SIGNAL__OVERSOLD=25`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub kline_interval: String,
    pub kline_lookback: usize,
    pub poll_interval_secs: u64,
    /// Skip the cycle when the kline series has holes
    pub check_candle_gaps: bool,
    pub log_filter: String,
    pub signal: SignalConfig,
    pub orders: OrderSettings,
    pub trailing: TrailingSettings,
    pub exchange: BinanceConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
            kline_interval: "5m".to_string(),
            kline_lookback: 288, // 24h of 5m bars
            poll_interval_secs: 60,
            check_candle_gaps: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            signal: SignalConfig::default(),
            orders: OrderSettings::default(),
            trailing: TrailingSettings::default(),
            exchange: BinanceConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load from `path` (skipped if missing) and the environment, then validate
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<Self> {
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let mut config: BotConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.apply_credential_fallback();
        // Sizing and wire formatting share one quantity precision
        config.exchange.quantity_precision = config.orders.quantity_precision;
        config.validate()?;
        Ok(config)
    }

    /// Fall back to the conventional Binance variables for credentials
    fn apply_credential_fallback(&mut self) {
        if self.exchange.api_key.is_none() {
            self.exchange.api_key = std::env::var("BINANCE_API_KEY").ok();
        }
        if self.exchange.api_secret.is_none() {
            self.exchange.api_secret = std::env::var("BINANCE_API_SECRET").ok();
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.symbol.is_empty() || self.base_asset.is_empty() || self.quote_asset.is_empty() {
            anyhow::bail!("symbol, base_asset and quote_asset must be set");
        }
        if interval_seconds(&self.kline_interval).is_none() {
            anyhow::bail!("unsupported kline interval '{}'", self.kline_interval);
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be positive");
        }

        self.signal.validate().context("Invalid signal settings")?;

        if self.kline_lookback < self.signal.period + 1 {
            anyhow::bail!(
                "kline_lookback ({}) must cover at least period + 1 ({}) candles",
                self.kline_lookback,
                self.signal.period + 1
            );
        }

        let orders = &self.orders;
        if !(orders.risk_fraction > 0.0 && orders.risk_fraction <= 1.0) {
            anyhow::bail!("risk_fraction must lie in (0, 1], got {}", orders.risk_fraction);
        }
        if !(orders.stop_loss_pct > 0.0 && orders.stop_loss_pct < 1.0) {
            anyhow::bail!("stop_loss_pct must lie in (0, 1), got {}", orders.stop_loss_pct);
        }
        if !(orders.take_profit_pct > 0.0) {
            anyhow::bail!("take_profit_pct must be positive, got {}", orders.take_profit_pct);
        }
        if orders.dust_threshold < 0.0 {
            anyhow::bail!("dust_threshold cannot be negative");
        }

        if self.exchange.max_read_retries > MAX_READ_RETRIES {
            anyhow::bail!(
                "max_read_retries must be at most {}, got {}",
                MAX_READ_RETRIES,
                self.exchange.max_read_retries
            );
        }

        let trailing = &self.trailing;
        if !(trailing.trailing_stop_pct > 0.0 && trailing.trailing_stop_pct < 1.0) {
            anyhow::bail!(
                "trailing_stop_pct must lie in (0, 1), got {}",
                trailing.trailing_stop_pct
            );
        }
        if trailing.activation_pct < 0.0 {
            anyhow::bail!("activation_pct cannot be negative");
        }

        Ok(())
    }

    /// Filter for the tracing subscriber, `RUST_LOG` takes precedence
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }
}
