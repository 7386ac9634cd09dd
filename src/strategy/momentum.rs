use super::{
    signals::{evaluate_signal, SignalConfig},
    Strategy,
};
use crate::indicators::{Oscillator, Rsi};
use crate::models::{Candle, Signal};

/// Two-threshold oscillator strategy
///
/// Buys when the oscillator dips below `oversold` while flat and sells
/// when it rises above `overbought` while holding.
pub struct MomentumStrategy {
    config: SignalConfig,
    oscillator: Box<dyn Oscillator>,
}

impl MomentumStrategy {
    pub fn new(config: SignalConfig) -> Self {
        Self::with_oscillator(config, Box::new(Rsi))
    }

    pub fn with_oscillator(config: SignalConfig, oscillator: Box<dyn Oscillator>) -> Self {
        Self { config, oscillator }
    }

    /// Oscillator reading over the candle closes, `None` if history is too short
    pub fn oscillator_value(&self, candles: &[Candle]) -> Option<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        self.oscillator.compute(&closes, self.config.period)
    }
}

impl Default for MomentumStrategy {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}

impl std::fmt::Debug for MomentumStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MomentumStrategy")
            .field("config", &self.config)
            .field("oscillator", &self.oscillator.name())
            .finish()
    }
}

impl Strategy for MomentumStrategy {
    fn evaluate(&self, oscillator: f64, in_position: bool) -> Signal {
        evaluate_signal(oscillator, in_position, &self.config)
    }

    fn name(&self) -> &str {
        "MomentumStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.config.period + 1
    }
}
