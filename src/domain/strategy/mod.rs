//! Strategy abstraction: pluggable signal generators.
//!
//! A strategy turns a candle series into a [`Frame`] of derived columns once
//! (`prepare`), then is asked for a [`Signal`] on growing prefixes of that
//! frame (`generate_signal`). The prefix is handed over as a [`FrameView`],
//! which cannot reach past its last candle, so a strategy never sees the
//! future.

pub mod moving_average;
pub mod params;
pub mod rsi;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::BacktestError;
use crate::domain::ohlcv::Candle;

pub use moving_average::MovingAverageCrossover;
pub use params::{ParamValue, Parameters};
pub use rsi::RsiThreshold;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Candle series augmented with named indicator columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    candles: Vec<Candle>,
    columns: BTreeMap<String, Vec<Option<f64>>>,
}

impl Frame {
    /// Private copy of `candles` with no derived columns.
    pub fn new(candles: &[Candle]) -> Self {
        Frame {
            candles: candles.to_vec(),
            columns: BTreeMap::new(),
        }
    }

    /// Add or replace a derived column. Its length must match the candles.
    pub fn insert_column(
        &mut self,
        name: &str,
        values: Vec<Option<f64>>,
    ) -> Result<(), BacktestError> {
        if values.len() != self.candles.len() {
            return Err(BacktestError::simulation(
                None,
                format!(
                    "column '{}' has {} values for {} candles",
                    name,
                    values.len(),
                    self.candles.len()
                ),
            ));
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    pub fn with_column(mut self, name: &str, values: Vec<Option<f64>>) -> Result<Self, BacktestError> {
        self.insert_column(name, values)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// View of the first `len` candles (clamped to the frame length).
    pub fn view(&self, len: usize) -> FrameView<'_> {
        FrameView {
            frame: self,
            len: len.min(self.candles.len()),
        }
    }
}

/// Read-only prefix of a [`Frame`].
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    frame: &'a Frame,
    len: usize,
}

impl<'a> FrameView<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn candles(&self) -> &'a [Candle] {
        &self.frame.candles[..self.len]
    }

    /// The present candle.
    pub fn last(&self) -> Option<&'a Candle> {
        self.candles().last()
    }

    pub fn column(&self, name: &str) -> Option<&'a [Option<f64>]> {
        self.frame.column(name).map(|values| &values[..self.len])
    }

    /// Column value `back` candles before the present one (0 = present).
    pub fn value(&self, name: &str, back: usize) -> Option<f64> {
        let values = self.column(name)?;
        let idx = values.len().checked_sub(back + 1)?;
        values[idx]
    }
}

/// Signal-generating strategy.
///
/// Implementations are pure over their inputs: the only state is the
/// parameter set, which `apply` may rewrite between runs. Because of that
/// mutability one instance must not be shared by concurrent runs; use
/// [`Strategy::boxed_clone`] to give each task its own copy.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn parameters(&self) -> Parameters;

    /// Replace the named parameters. Either every value is accepted or the
    /// strategy is left unchanged.
    fn apply(&mut self, parameters: &Parameters) -> Result<(), BacktestError>;

    /// Prefix length below which `generate_signal` returns `Hold`.
    fn min_required_candles(&self) -> usize;

    /// Compute derived columns over the whole series.
    fn prepare(&self, candles: &[Candle]) -> Result<Frame, BacktestError>;

    fn generate_signal(&self, data: &FrameView<'_>) -> Result<Signal, BacktestError>;

    /// Position size multiplier in `[0, 1]`.
    fn risk_adjustment(&self, _data: &FrameView<'_>) -> f64 {
        1.0
    }

    /// New stop level for an open position, or `None` to keep the current one.
    fn update_stop_loss(&self, _data: &FrameView<'_>, _current_stop: Option<f64>) -> Option<f64> {
        None
    }

    fn validate(&self) -> Result<(), BacktestError> {
        Ok(())
    }

    fn boxed_clone(&self) -> Box<dyn Strategy>;
}

/// "Name (k=v, ...)".
pub fn describe(strategy: &dyn Strategy) -> String {
    format!("{} ({})", strategy.name(), strategy.parameters())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    MovingAverage,
    Rsi,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 2] = [StrategyKind::MovingAverage, StrategyKind::Rsi];
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::MovingAverage => write!(f, "moving_average"),
            StrategyKind::Rsi => write!(f, "rsi"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "moving_average" | "ma" | "sma_crossover" => Ok(StrategyKind::MovingAverage),
            "rsi" => Ok(StrategyKind::Rsi),
            other => {
                let known: Vec<String> = StrategyKind::ALL.iter().map(|k| k.to_string()).collect();
                Err(BacktestError::invalid_parameters(format!(
                    "unknown strategy type '{}' (available: {})",
                    other,
                    known.join(", ")
                )))
            }
        }
    }
}

/// Build a strategy with its defaults overridden by `parameters`.
pub fn create_strategy(
    kind: StrategyKind,
    parameters: &Parameters,
) -> Result<Box<dyn Strategy>, BacktestError> {
    let mut strategy: Box<dyn Strategy> = match kind {
        StrategyKind::MovingAverage => Box::new(MovingAverageCrossover::default()),
        StrategyKind::Rsi => Box::new(RsiThreshold::default()),
    };
    if !parameters.is_empty() {
        strategy.apply(parameters)?;
    }
    Ok(strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    + chrono::Duration::days(i as i64),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0 + i as f64,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn frame_rejects_mismatched_column() {
        let mut frame = Frame::new(&candles(3));
        assert!(frame.insert_column("x", vec![None; 2]).is_err());
        assert!(frame.insert_column("x", vec![None; 3]).is_ok());
        assert_eq!(frame.column_names().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn view_hides_future() {
        let frame = Frame::new(&candles(5))
            .with_column("x", vec![Some(0.0), Some(1.0), Some(2.0), Some(3.0), Some(4.0)])
            .unwrap();
        let view = frame.view(3);
        assert_eq!(view.len(), 3);
        assert_eq!(view.candles().len(), 3);
        assert_eq!(view.last().unwrap().close, 3.0);
        assert_eq!(view.column("x").unwrap().len(), 3);
        assert_eq!(view.value("x", 0), Some(2.0));
        assert_eq!(view.value("x", 1), Some(1.0));
        assert_eq!(view.value("x", 3), None);
        assert_eq!(view.value("missing", 0), None);
    }

    #[test]
    fn view_len_is_clamped() {
        let frame = Frame::new(&candles(2));
        assert_eq!(frame.view(10).len(), 2);
        assert!(frame.view(0).is_empty());
        assert!(frame.view(0).last().is_none());
    }

    #[test]
    fn strategy_kind_parse() {
        assert_eq!(
            "moving_average".parse::<StrategyKind>().unwrap(),
            StrategyKind::MovingAverage
        );
        assert_eq!("RSI".parse::<StrategyKind>().unwrap(), StrategyKind::Rsi);
        let err = "bollinger".parse::<StrategyKind>().unwrap_err();
        assert!(err.to_string().contains("moving_average, rsi"));
    }

    #[test]
    fn create_strategy_applies_overrides() {
        let params = Parameters::new().with("short_window", 5usize).with("long_window", 20usize);
        let strategy = create_strategy(StrategyKind::MovingAverage, &params).unwrap();
        assert_eq!(strategy.min_required_candles(), 20);
        assert_eq!(
            describe(strategy.as_ref()),
            "Moving Average Crossover (long_window=20, short_window=5)"
        );
    }

    #[test]
    fn create_strategy_rejects_unknown_parameter() {
        let params = Parameters::new().with("lookback", 5usize);
        assert!(create_strategy(StrategyKind::Rsi, &params).is_err());
    }

    #[test]
    fn default_hooks() {
        let strategy = create_strategy(StrategyKind::Rsi, &Parameters::new()).unwrap();
        let frame = Frame::new(&candles(3));
        let view = frame.view(3);
        assert_eq!(strategy.risk_adjustment(&view), 1.0);
        assert_eq!(strategy.update_stop_loss(&view, Some(0.5)), None);
        assert!(strategy.validate().is_ok());
    }
}
