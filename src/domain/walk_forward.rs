//! Walk-forward validation.
//!
//! The timeline is cut into rolling windows: parameters are optimized on a
//! training span and then scored on the step that immediately follows it.
//! Capital carries from one test span to the next.

use std::collections::BTreeMap;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use tracing::{info, warn};

use super::backtest::{simulate, BacktestConfig, Backtester};
use super::error::BacktestError;
use super::metrics::{Metric, MetricValue};
use super::ohlcv::{slice_range, Candle};
use super::optimizer::{optimize_series, ParameterGrid};
use super::portfolio::EquityPoint;
use super::position::Trade;
use super::result::{BacktestResult, EquityRecord, TradeRecord};
use super::strategy::{Parameters, Strategy};
use crate::ports::data_port::PriceFeed;

/// One train/test split. Both ranges are half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub index: usize,
    pub train_start: NaiveDateTime,
    pub train_end: NaiveDateTime,
    pub test_start: NaiveDateTime,
    pub test_end: NaiveDateTime,
}

/// Slide a `window_size` training span forward by `step` from `start` while
/// it still ends before `end`. Each test span is the following `step`,
/// clipped at `end`.
pub fn generate_windows(
    start: NaiveDateTime,
    end: NaiveDateTime,
    window_size: TimeDelta,
    step: TimeDelta,
) -> Result<Vec<Window>, BacktestError> {
    if window_size <= TimeDelta::zero() || step <= TimeDelta::zero() {
        return Err(BacktestError::invalid_parameters(
            "window size and step size must be positive",
        ));
    }
    if end <= start {
        return Err(BacktestError::invalid_parameters(format!(
            "walk-forward end {} is not after start {}",
            end, start
        )));
    }

    let mut windows = Vec::new();
    let mut train_start = start;
    loop {
        let train_end = shift(train_start, window_size)?;
        if train_end >= end {
            break;
        }
        windows.push(Window {
            index: windows.len(),
            train_start,
            train_end,
            test_start: train_end,
            test_end: shift(train_end, step)?.min(end),
        });
        train_start = shift(train_start, step)?;
    }
    Ok(windows)
}

fn shift(at: NaiveDateTime, by: TimeDelta) -> Result<NaiveDateTime, BacktestError> {
    at.checked_add_signed(by).ok_or_else(|| {
        BacktestError::invalid_parameters(format!(
            "{} days past {} is out of the representable range",
            by.num_days(),
            at
        ))
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalkForwardConfig {
    pub window_size: TimeDelta,
    pub step_size: TimeDelta,
    pub metric: Metric,
}

impl WalkForwardConfig {
    /// Window and step given in whole days.
    pub fn days(window_size: i64, step_size: i64, metric: Metric) -> Result<Self, BacktestError> {
        let span = |days: i64| {
            TimeDelta::try_days(days).ok_or_else(|| {
                BacktestError::invalid_parameters(format!("{} days is out of range", days))
            })
        };
        Ok(WalkForwardConfig {
            window_size: span(window_size)?,
            step_size: span(step_size)?,
            metric,
        })
    }
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        WalkForwardConfig {
            window_size: TimeDelta::days(90),
            step_size: TimeDelta::days(30),
            metric: Metric::TotalReturn,
        }
    }
}

/// Outcome of one completed window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowResult {
    pub window: Window,
    pub train_parameters: Parameters,
    pub train_metrics: BTreeMap<String, MetricValue>,
    pub test_metrics: BTreeMap<String, MetricValue>,
    pub test_trades: Vec<TradeRecord>,
    pub starting_capital: f64,
    pub ending_equity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalkForwardReport {
    pub strategy: String,
    pub symbol: String,
    pub timeframe: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub window_size: i64,
    pub step_size: i64,
    pub metric: Metric,
    pub num_windows: usize,
    pub completed_windows: usize,
    pub failed_windows: Vec<usize>,
    pub windows: Vec<WindowResult>,
    pub consolidated_metrics: BTreeMap<String, MetricValue>,
    pub equity_curve: Vec<EquityRecord>,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,
    #[serde(skip)]
    pub consolidated: BacktestResult,
}

/// Concatenate test segments, keeping the first point per timestamp.
fn chain_equity(segments: Vec<Vec<EquityPoint>>) -> Vec<EquityPoint> {
    let mut chained: Vec<EquityPoint> = segments.into_iter().flatten().collect();
    // stable sort keeps segment order among equal timestamps
    chained.sort_by_key(|p| p.timestamp);
    chained.dedup_by_key(|p| p.timestamp);
    chained
}

/// Walk-forward test over an in-memory series.
///
/// `config.start`/`config.end` bound the timeline; an open end stops just
/// after the last candle. A window whose optimization or test run fails is
/// recorded in `failed_windows` and the next window starts from the last
/// successful capital.
pub fn walk_forward_series(
    strategy: &mut dyn Strategy,
    candles: &[Candle],
    config: &BacktestConfig,
    wf: &WalkForwardConfig,
    grid: &ParameterGrid,
) -> Result<WalkForwardReport, BacktestError> {
    grid.validate()?;
    config.validate()?;
    let Some(last) = candles.last() else {
        return Err(BacktestError::NoData {
            symbol: config.symbol.clone(),
            timeframe: config.timeframe.clone(),
        });
    };
    let start = config.start;
    let end = match config.end {
        Some(end) => end,
        None => shift(last.timestamp, TimeDelta::seconds(1))?,
    };
    let windows = generate_windows(start, end, wf.window_size, wf.step_size)?;
    if windows.is_empty() {
        return Err(BacktestError::invalid_parameters(format!(
            "range {} .. {} is too short for a {}-day training window",
            start,
            end,
            wf.window_size.num_days()
        )));
    }
    info!(
        strategy = strategy.name(),
        symbol = %config.symbol,
        windows = windows.len(),
        "starting walk-forward test"
    );

    let mut capital = config.initial_capital;
    let mut results = Vec::new();
    let mut failed = Vec::new();
    let mut trades: Vec<Trade> = Vec::new();
    let mut segments = Vec::new();

    for window in &windows {
        info!(
            window = window.index + 1,
            total = windows.len(),
            train_start = %window.train_start,
            test_end = %window.test_end,
            "processing window"
        );
        let window_config = |from, to| BacktestConfig {
            start: from,
            end: Some(to),
            initial_capital: capital,
            ..config.clone()
        };

        let train_config = window_config(window.train_start, window.train_end);
        let train = slice_range(candles, Some(window.train_start), Some(window.train_end));
        let optimized = match optimize_series(strategy, train, &train_config, grid, wf.metric) {
            Ok(optimized) => optimized,
            Err(e) => {
                warn!(
                    window = window.index + 1,
                    error = %e,
                    "optimization failed, skipping window"
                );
                failed.push(window.index);
                continue;
            }
        };

        let test_config = window_config(window.test_start, window.test_end);
        let test = slice_range(candles, Some(window.test_start), Some(window.test_end));
        let tested = match simulate(strategy, test, &test_config) {
            Ok(tested) => tested,
            Err(e) => {
                warn!(
                    window = window.index + 1,
                    error = %e,
                    "test run failed, skipping window"
                );
                failed.push(window.index);
                continue;
            }
        };

        let starting_capital = capital;
        capital = tested.final_equity();
        trades.extend(tested.trades().iter().cloned());
        segments.push(tested.equity_curve().to_vec());
        results.push(WindowResult {
            window: *window,
            train_parameters: optimized.best_parameters,
            train_metrics: optimized.best_metrics,
            test_metrics: tested.metrics_record(),
            test_trades: tested.trade_records(),
            starting_capital,
            ending_equity: capital,
        });
    }

    if results.is_empty() {
        warn!("no walk-forward window completed");
    }

    let consolidated = BacktestResult::new(
        strategy.name(),
        Parameters::new(),
        config,
        trades,
        chain_equity(segments),
    );
    let total_return_pct = (capital - config.initial_capital) / config.initial_capital * 100.0;
    info!(
        completed = results.len(),
        failed = failed.len(),
        total_return_pct,
        "walk-forward test completed"
    );

    Ok(WalkForwardReport {
        strategy: strategy.name().to_string(),
        symbol: config.symbol.clone(),
        timeframe: config.timeframe.clone(),
        start,
        end,
        window_size: wf.window_size.num_days(),
        step_size: wf.step_size.num_days(),
        metric: wf.metric,
        num_windows: windows.len(),
        completed_windows: results.len(),
        failed_windows: failed,
        windows: results,
        consolidated_metrics: consolidated.metrics_record(),
        equity_curve: consolidated.equity_records(),
        initial_capital: config.initial_capital,
        final_equity: capital,
        total_return_pct,
        consolidated,
    })
}

impl<F: PriceFeed> Backtester<F> {
    /// Fetch the whole range once and walk forward over it.
    pub fn walk_forward_test(
        &mut self,
        config: &BacktestConfig,
        wf: &WalkForwardConfig,
        grid: &ParameterGrid,
    ) -> Result<WalkForwardReport, BacktestError> {
        grid.validate()?;
        config.validate()?;
        let candles = self.fetch(config)?;
        walk_forward_series(self.strategy_mut(), &candles, config, wf, grid)
    }
}
