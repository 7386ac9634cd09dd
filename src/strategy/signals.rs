use serde::Deserialize;

use crate::models::{Candle, Signal};

/// Oscillator window and the two decision thresholds
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.period == 0 {
            anyhow::bail!("oscillator period must be at least 1");
        }
        if !(0.0..=100.0).contains(&self.oversold) || !(0.0..=100.0).contains(&self.overbought) {
            anyhow::bail!(
                "thresholds must lie in [0, 100], got oversold={} overbought={}",
                self.oversold,
                self.overbought
            );
        }
        if self.oversold >= self.overbought {
            anyhow::bail!(
                "oversold ({}) must be below overbought ({})",
                self.oversold,
                self.overbought
            );
        }
        Ok(())
    }
}

/// Map an oscillator reading and the position flag to an action
///
/// Enter only when flat and oversold, exit only when holding and
/// overbought. Everything else holds.
pub fn evaluate_signal(oscillator: f64, in_position: bool, config: &SignalConfig) -> Signal {
    if !in_position && oscillator < config.oversold {
        Signal::Enter
    } else if in_position && oscillator > config.overbought {
        Signal::Exit
    } else {
        Signal::Hold
    }
}

/// Seconds per bar for an exchange interval string such as "5m" or "4h"
pub fn interval_seconds(interval: &str) -> Option<u64> {
    let unit = interval.chars().last()?;
    let count: u64 = interval[..interval.len() - unit.len_utf8()].parse().ok()?;
    let unit_secs = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        _ => return None,
    };
    Some(count * unit_secs)
}

/// Validate that candles are uniformly spaced in time
///
/// Allows up to 1.5x the expected interval between consecutive bars.
pub fn validate_candle_uniformity(
    candles: &[Candle],
    expected_interval_secs: u64,
) -> anyhow::Result<()> {
    if candles.len() < 2 {
        return Ok(());
    }

    let max_gap_secs = expected_interval_secs + (expected_interval_secs / 2);

    for window in candles.windows(2) {
        let time_diff = (window[1].open_time - window[0].open_time).num_seconds();

        if time_diff < 0 {
            anyhow::bail!("Candles are not sorted by open time");
        }

        if time_diff as u64 > max_gap_secs {
            anyhow::bail!(
                "Data gap detected: {}s between candles (expected ~{}s). Gap from {} to {}",
                time_diff,
                expected_interval_secs,
                window[0].open_time.format("%H:%M:%S"),
                window[1].open_time.format("%H:%M:%S")
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn candles_at(offsets_secs: &[i64]) -> Vec<Candle> {
        let start = Utc::now();
        offsets_secs
            .iter()
            .map(|&offset| Candle {
                symbol: "BTCUSDT".to_string(),
                open_time: start + Duration::seconds(offset),
                open: 100.0,
                high: 100.0,
                low: 100.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_enter_only_when_flat_and_oversold() {
        let config = SignalConfig::default();

        assert_eq!(evaluate_signal(25.0, false, &config), Signal::Enter);
        assert_eq!(evaluate_signal(25.0, true, &config), Signal::Hold);
        assert_eq!(evaluate_signal(30.0, false, &config), Signal::Hold); // strict
    }

    #[test]
    fn test_exit_only_when_holding_and_overbought() {
        let config = SignalConfig::default();

        assert_eq!(evaluate_signal(75.0, true, &config), Signal::Exit);
        assert_eq!(evaluate_signal(75.0, false, &config), Signal::Hold);
        assert_eq!(evaluate_signal(70.0, true, &config), Signal::Hold); // strict
    }

    #[test]
    fn test_signal_contract_over_sweep() {
        let config = SignalConfig::default();

        for step in 0..=1000 {
            let value = step as f64 / 10.0;
            for in_position in [false, true] {
                let signal = evaluate_signal(value, in_position, &config);
                let expect_enter = !in_position && value < config.oversold;
                let expect_exit = in_position && value > config.overbought;

                assert_eq!(signal == Signal::Enter, expect_enter, "value={}", value);
                assert_eq!(signal == Signal::Exit, expect_exit, "value={}", value);
            }
        }
    }

    #[test]
    fn test_validate_thresholds() {
        assert!(SignalConfig::default().validate().is_ok());

        let inverted = SignalConfig {
            period: 14,
            oversold: 70.0,
            overbought: 30.0,
        };
        assert!(inverted.validate().is_err());

        let zero_period = SignalConfig {
            period: 0,
            ..SignalConfig::default()
        };
        assert!(zero_period.validate().is_err());

        let out_of_range = SignalConfig {
            overbought: 120.0,
            ..SignalConfig::default()
        };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_interval_seconds() {
        assert_eq!(interval_seconds("1m"), Some(60));
        assert_eq!(interval_seconds("5m"), Some(300));
        assert_eq!(interval_seconds("4h"), Some(14_400));
        assert_eq!(interval_seconds("1d"), Some(86_400));
        assert_eq!(interval_seconds("1M"), None);
        assert_eq!(interval_seconds(""), None);
    }

    #[test]
    fn test_uniform_candles_pass() {
        let candles = candles_at(&[0, 300, 600, 900]);
        assert!(validate_candle_uniformity(&candles, 300).is_ok());
    }

    #[test]
    fn test_gap_detected() {
        let candles = candles_at(&[0, 300, 1200]);
        let err = validate_candle_uniformity(&candles, 300).unwrap_err();
        assert!(err.to_string().contains("Data gap detected"));
    }

    #[test]
    fn test_unsorted_candles_rejected() {
        let candles = candles_at(&[300, 0]);
        assert!(validate_candle_uniformity(&candles, 300).is_err());
    }
}
