// Technical indicators module

pub mod rsi;

pub use rsi::{calculate_rsi, Rsi};

/// Bounded momentum oscillator computed from closing prices
pub trait Oscillator: Send + Sync {
    fn name(&self) -> &str;

    /// Latest oscillator value, `None` when the history is too short
    fn compute(&self, prices: &[f64], period: usize) -> Option<f64>;
}
