use super::Oscillator;

/// Calculate Relative Strength Index (RSI) with Wilder smoothing
///
/// The first average gain/loss is a simple mean over `period` changes;
/// every later change is folded in as `avg = (avg * (period - 1) + x) / period`.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = changes.split_at(period);

    let mut avg_gain = seed.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = seed.iter().filter(|c| **c < 0.0).map(|c| -c).sum::<f64>() / period as f64;

    let weight = (period - 1) as f64;
    for change in rest {
        avg_gain = (avg_gain * weight + change.max(0.0)) / period as f64;
        avg_loss = (avg_loss * weight + (-change).max(0.0)) / period as f64;
    }

    if avg_loss == 0.0 {
        // Flat series is neutral, pure gains saturate
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// RSI as a pluggable oscillator
#[derive(Debug, Clone, Copy, Default)]
pub struct Rsi;

impl Oscillator for Rsi {
    fn name(&self) -> &str {
        "RSI"
    }

    fn compute(&self, prices: &[f64], period: usize) -> Option<f64> {
        calculate_rsi(prices, period)
    }
}
