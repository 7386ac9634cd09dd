// Trading strategy module
pub mod momentum;
pub mod signals;

use crate::models::Signal;

/// Base trait for signal strategies
pub trait Strategy: Send + Sync {
    /// Decide what to do given the latest oscillator reading
    fn evaluate(&self, oscillator: f64, in_position: bool) -> Signal;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
