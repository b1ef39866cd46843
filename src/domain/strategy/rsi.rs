//! RSI threshold strategy.
//!
//! Buy when RSI climbs back above the oversold level, sell when it falls back
//! below the overbought level.

use crate::domain::error::BacktestError;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::ohlcv::Candle;
use crate::domain::strategy::params::window_param;
use crate::domain::strategy::{Frame, FrameView, Parameters, Signal, Strategy};

pub const RSI: &str = "rsi";

#[derive(Debug, Clone, PartialEq)]
pub struct RsiThreshold {
    pub rsi_period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiThreshold {
    fn default() -> Self {
        RsiThreshold {
            rsi_period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl RsiThreshold {
    pub fn new(rsi_period: usize, oversold: f64, overbought: f64) -> Result<Self, BacktestError> {
        let strategy = RsiThreshold {
            rsi_period,
            oversold,
            overbought,
        };
        strategy.validate()?;
        Ok(strategy)
    }
}

impl Strategy for RsiThreshold {
    fn name(&self) -> &str {
        "RSI"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
            .with("rsi_period", self.rsi_period)
            .with("oversold", self.oversold)
            .with("overbought", self.overbought)
    }

    fn apply(&mut self, parameters: &Parameters) -> Result<(), BacktestError> {
        let mut candidate = self.clone();
        for (name, value) in parameters.iter() {
            match name {
                "rsi_period" => {}
                "oversold" => candidate.oversold = value.as_f64(),
                "overbought" => candidate.overbought = value.as_f64(),
                other => {
                    return Err(BacktestError::invalid_parameters(format!(
                        "unknown parameter '{}' for {}",
                        other,
                        self.name()
                    )));
                }
            }
        }
        if let Some(v) = window_param(parameters, "rsi_period")? {
            candidate.rsi_period = v;
        }
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }

    fn min_required_candles(&self) -> usize {
        self.rsi_period + 1
    }

    fn prepare(&self, candles: &[Candle]) -> Result<Frame, BacktestError> {
        Frame::new(candles).with_column(RSI, calculate_rsi(candles, self.rsi_period).values)
    }

    fn generate_signal(&self, data: &FrameView<'_>) -> Result<Signal, BacktestError> {
        if data.len() < self.min_required_candles() {
            return Ok(Signal::Hold);
        }
        let (Some(current), Some(prev)) = (data.value(RSI, 0), data.value(RSI, 1)) else {
            return Ok(Signal::Hold);
        };

        if prev <= self.oversold && current > self.oversold {
            Ok(Signal::Buy)
        } else if prev >= self.overbought && current < self.overbought {
            Ok(Signal::Sell)
        } else {
            Ok(Signal::Hold)
        }
    }

    fn validate(&self) -> Result<(), BacktestError> {
        if self.rsi_period == 0 {
            return Err(BacktestError::invalid_parameters("rsi_period must be positive"));
        }
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.oversold) || !in_range(self.overbought) {
            return Err(BacktestError::invalid_parameters(format!(
                "RSI thresholds must lie in [0, 100], got oversold={} overbought={}",
                self.oversold, self.overbought
            )));
        }
        if self.oversold >= self.overbought {
            return Err(BacktestError::invalid_parameters(format!(
                "oversold ({}) must be below overbought ({})",
                self.oversold, self.overbought
            )));
        }
        Ok(())
    }

    fn boxed_clone(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}
