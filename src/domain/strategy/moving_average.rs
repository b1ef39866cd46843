//! Moving-average crossover strategy.
//!
//! Buy when the short SMA crosses above the long SMA, sell on the reverse
//! crossover. The bar on which the long SMA first becomes defined counts as
//! a crossing out of the undefined regime.

use crate::domain::error::BacktestError;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::ohlcv::Candle;
use crate::domain::strategy::params::window_param;
use crate::domain::strategy::{Frame, FrameView, Parameters, Signal, Strategy};

pub const SHORT_MA: &str = "short_ma";
pub const LONG_MA: &str = "long_ma";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovingAverageCrossover {
    pub short_window: usize,
    pub long_window: usize,
}

impl Default for MovingAverageCrossover {
    fn default() -> Self {
        MovingAverageCrossover {
            short_window: 20,
            long_window: 50,
        }
    }
}

impl MovingAverageCrossover {
    pub fn new(short_window: usize, long_window: usize) -> Result<Self, BacktestError> {
        let strategy = MovingAverageCrossover {
            short_window,
            long_window,
        };
        strategy.validate()?;
        Ok(strategy)
    }
}

impl Strategy for MovingAverageCrossover {
    fn name(&self) -> &str {
        "Moving Average Crossover"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
            .with("short_window", self.short_window)
            .with("long_window", self.long_window)
    }

    fn apply(&mut self, parameters: &Parameters) -> Result<(), BacktestError> {
        let mut candidate = self.clone();
        for (name, _) in parameters.iter() {
            match name {
                "short_window" | "long_window" => {}
                other => {
                    return Err(BacktestError::invalid_parameters(format!(
                        "unknown parameter '{}' for {}",
                        other,
                        self.name()
                    )));
                }
            }
        }
        if let Some(v) = window_param(parameters, "short_window")? {
            candidate.short_window = v;
        }
        if let Some(v) = window_param(parameters, "long_window")? {
            candidate.long_window = v;
        }
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    fn min_required_candles(&self) -> usize {
        self.short_window.max(self.long_window)
    }

    fn prepare(&self, candles: &[Candle]) -> Result<Frame, BacktestError> {
        Frame::new(candles)
            .with_column(SHORT_MA, calculate_sma(candles, self.short_window).values)?
            .with_column(LONG_MA, calculate_sma(candles, self.long_window).values)
    }

    fn generate_signal(&self, data: &FrameView<'_>) -> Result<Signal, BacktestError> {
        if data.len() < self.min_required_candles() {
            return Ok(Signal::Hold);
        }
        let (Some(short), Some(long), Some(prev_short)) = (
            data.value(SHORT_MA, 0),
            data.value(LONG_MA, 0),
            data.value(SHORT_MA, 1),
        ) else {
            return Ok(Signal::Hold);
        };

        let signal = match data.value(LONG_MA, 1) {
            Some(prev_long) => {
                if prev_short <= prev_long && short > long {
                    Signal::Buy
                } else if prev_short >= prev_long && short < long {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
            // long average just became defined
            None => {
                if short > long {
                    Signal::Buy
                } else if short < long {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
        };
        Ok(signal)
    }

    fn validate(&self) -> Result<(), BacktestError> {
        if self.short_window == 0 || self.long_window == 0 {
            return Err(BacktestError::invalid_parameters(
                "moving average windows must be positive",
            ));
        }
        if self.short_window >= self.long_window {
            return Err(BacktestError::invalid_parameters(format!(
                "short_window ({}) must be less than long_window ({})",
                self.short_window, self.long_window
            )));
        }
        Ok(())
    }

    fn boxed_clone(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn candles(closes: &[f64]) -> Vec<Candle> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: base + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn signals(strategy: &MovingAverageCrossover, closes: &[f64]) -> Vec<Signal> {
        let series = candles(closes);
        let frame = strategy.prepare(&series).unwrap();
        (1..=series.len())
            .map(|len| strategy.generate_signal(&frame.view(len)).unwrap())
            .collect()
    }

    #[test]
    fn rising_series_buys_once_when_long_defined() {
        let strategy = MovingAverageCrossover::new(2, 4).unwrap();
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let sigs = signals(&strategy, &closes);
        assert_eq!(sigs[3], Signal::Buy);
        let buys = sigs.iter().filter(|s| **s == Signal::Buy).count();
        let sells = sigs.iter().filter(|s| **s == Signal::Sell).count();
        assert_eq!(buys, 1);
        assert_eq!(sells, 0);
    }

    #[test]
    fn holds_during_warmup() {
        let strategy = MovingAverageCrossover::new(2, 4).unwrap();
        let sigs = signals(&strategy, &[1.0, 2.0, 3.0]);
        assert!(sigs.iter().all(|s| *s == Signal::Hold));
    }

    #[test]
    fn crossover_up_and_down() {
        let strategy = MovingAverageCrossover::new(1, 3).unwrap();
        // falls first (sell on definition), then rallies through, then drops
        let closes = [10.0, 9.0, 8.0, 7.0, 12.0, 13.0, 5.0];
        let sigs = signals(&strategy, &closes);
        assert_eq!(sigs[2], Signal::Sell);
        assert_eq!(sigs[3], Signal::Hold);
        assert_eq!(sigs[4], Signal::Buy);
        assert_eq!(sigs[5], Signal::Hold);
        assert_eq!(sigs[6], Signal::Sell);
    }

    #[test]
    fn flat_series_never_trades() {
        let strategy = MovingAverageCrossover::new(2, 4).unwrap();
        let sigs = signals(&strategy, &[50.0; 12]);
        assert!(sigs.iter().all(|s| *s == Signal::Hold));
    }

    #[test]
    fn apply_is_atomic() {
        let mut strategy = MovingAverageCrossover::default();
        let bad = Parameters::new().with("short_window", 5usize).with("long_window", 0i64);
        assert!(strategy.apply(&bad).is_err());
        assert_eq!(strategy, MovingAverageCrossover::default());

        let inverted = Parameters::new().with("short_window", 60usize);
        assert!(strategy.apply(&inverted).is_err());
        assert_eq!(strategy.short_window, 20);

        let good = Parameters::new().with("short_window", 5usize).with("long_window", 30usize);
        strategy.apply(&good).unwrap();
        assert_eq!(strategy.short_window, 5);
        assert_eq!(strategy.long_window, 30);
        assert_eq!(strategy.min_required_candles(), 30);
    }

    #[test]
    fn apply_rejects_unknown_name() {
        let mut strategy = MovingAverageCrossover::default();
        let params = Parameters::new().with("rsi_period", 14usize);
        let err = strategy.apply(&params).unwrap_err();
        assert!(err.to_string().contains("rsi_period"));
    }

    #[test]
    fn prepare_does_not_touch_input() {
        let strategy = MovingAverageCrossover::new(2, 3).unwrap();
        let series = candles(&[1.0, 2.0, 3.0, 4.0]);
        let before = series.clone();
        let frame = strategy.prepare(&series).unwrap();
        assert_eq!(series, before);
        assert_eq!(frame.column(LONG_MA).unwrap()[2], Some(2.0));
    }
}
