//! Exhaustive grid search over strategy parameters.
//!
//! Combinations are enumerated in declaration order with the last axis
//! varying fastest. The strictly greatest metric value wins, so ties keep
//! the earliest combination. Failed runs are counted and skipped.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use super::backtest::{simulate, BacktestConfig, Backtester};
use super::error::BacktestError;
use super::metrics::{Metric, MetricValue};
use super::ohlcv::Candle;
use super::result::BacktestResult;
use super::strategy::{describe, ParamValue, Parameters, Strategy};
use crate::ports::data_port::PriceFeed;

/// Candidate values per parameter, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterGrid {
    axes: Vec<(String, Vec<ParamValue>)>,
}

impl ParameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_axis<V: Into<ParamValue>>(
        mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push_axis(name, values);
        self
    }

    pub fn push_axis<V: Into<ParamValue>>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) {
        self.axes
            .push((name.to_string(), values.into_iter().map(Into::into).collect()));
    }

    pub fn axes(&self) -> &[(String, Vec<ParamValue>)] {
        &self.axes
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Number of combinations.
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.iter().map(|(_, values)| values.len()).product()
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.axes.is_empty() {
            return Err(BacktestError::invalid_parameters("parameter grid is empty"));
        }
        for (i, (name, values)) in self.axes.iter().enumerate() {
            if values.is_empty() {
                return Err(BacktestError::invalid_parameters(format!(
                    "parameter '{}' has no candidate values",
                    name
                )));
            }
            if self.axes[..i].iter().any(|(other, _)| other == name) {
                return Err(BacktestError::invalid_parameters(format!(
                    "parameter '{}' is declared twice",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Cartesian product of all axes. Empty when any axis has no values.
    pub fn combinations(&self) -> Vec<Parameters> {
        let mut out = Vec::with_capacity(self.len());
        if self.len() == 0 {
            return out;
        }
        let mut odometer = vec![0usize; self.axes.len()];
        loop {
            let mut params = Parameters::new();
            for ((name, values), &idx) in self.axes.iter().zip(&odometer) {
                params.insert(name, values[idx]);
            }
            out.push(params);

            // advance from the last axis
            let mut axis = self.axes.len();
            loop {
                if axis == 0 {
                    return out;
                }
                axis -= 1;
                odometer[axis] += 1;
                if odometer[axis] < self.axes[axis].1.len() {
                    break;
                }
                odometer[axis] = 0;
            }
        }
    }
}

/// Score of one successful combination.
#[derive(Debug, Clone, Serialize)]
pub struct TrialResult {
    pub parameters: Parameters,
    pub metric_value: MetricValue,
    pub metrics: BTreeMap<String, MetricValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub strategy: String,
    pub symbol: String,
    pub timeframe: String,
    pub metric: Metric,
    pub num_combinations: usize,
    pub failed_combinations: usize,
    pub best_parameters: Parameters,
    pub best_metric_value: MetricValue,
    pub best_metrics: BTreeMap<String, MetricValue>,
    pub trials: Vec<TrialResult>,
    #[serde(skip)]
    pub best_result: BacktestResult,
}

/// Running reduction over trial outcomes, fed in enumeration order.
struct Tally {
    metric: Metric,
    trials: Vec<TrialResult>,
    failed: usize,
    best: Option<(f64, Parameters, BacktestResult)>,
}

impl Tally {
    fn new(metric: Metric) -> Self {
        Tally {
            metric,
            trials: Vec::new(),
            failed: 0,
            best: None,
        }
    }

    fn record(
        &mut self,
        index: usize,
        parameters: Parameters,
        outcome: Result<BacktestResult, BacktestError>,
    ) {
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    combination = index + 1,
                    parameters = %parameters,
                    error = %e,
                    "combination failed"
                );
                self.failed += 1;
                return;
            }
        };
        let value = self.metric.value(result.metrics());
        info!(
            combination = index + 1,
            parameters = %parameters,
            metric = %self.metric,
            value,
            "combination evaluated"
        );
        self.trials.push(TrialResult {
            parameters: parameters.clone(),
            metric_value: MetricValue::Number(value),
            metrics: result.metrics_record(),
        });
        let better = match &self.best {
            None => true,
            Some((best, _, _)) => value > *best,
        };
        if better {
            self.best = Some((value, parameters, result));
        }
    }

    fn finish(
        self,
        strategy: &mut dyn Strategy,
        original: &Parameters,
        config: &BacktestConfig,
        tried: usize,
    ) -> Result<OptimizationResult, BacktestError> {
        let Some((best_value, best_parameters, best_result)) = self.best else {
            // leave the strategy as it was found
            strategy.apply(original)?;
            warn!(tried, "no parameter combination produced a result");
            return Err(BacktestError::NoViableCombination { tried });
        };
        strategy.apply(&best_parameters)?;
        info!(
            parameters = %best_parameters,
            metric = %self.metric,
            value = best_value,
            failed = self.failed,
            "optimization completed"
        );
        Ok(OptimizationResult {
            strategy: strategy.name().to_string(),
            symbol: config.symbol.clone(),
            timeframe: config.timeframe.clone(),
            metric: self.metric,
            num_combinations: tried,
            failed_combinations: self.failed,
            best_parameters,
            best_metric_value: MetricValue::Number(best_value),
            best_metrics: best_result.metrics_record(),
            trials: self.trials,
            best_result,
        })
    }
}

fn evaluate(
    strategy: &mut dyn Strategy,
    parameters: &Parameters,
    candles: &[Candle],
    config: &BacktestConfig,
) -> Result<BacktestResult, BacktestError> {
    strategy.apply(parameters)?;
    simulate(strategy, candles, config)
}

/// Grid search over an in-memory series, one combination at a time.
///
/// On success `strategy` is left with the best parameters applied.
pub fn optimize_series(
    strategy: &mut dyn Strategy,
    candles: &[Candle],
    config: &BacktestConfig,
    grid: &ParameterGrid,
    metric: Metric,
) -> Result<OptimizationResult, BacktestError> {
    grid.validate()?;
    let combinations = grid.combinations();
    let original = strategy.parameters();
    info!(
        strategy = %describe(strategy),
        combinations = combinations.len(),
        metric = %metric,
        "starting grid search"
    );

    let mut tally = Tally::new(metric);
    for (index, parameters) in combinations.iter().enumerate() {
        let outcome = evaluate(strategy, parameters, candles, config);
        tally.record(index, parameters.clone(), outcome);
    }
    tally.finish(strategy, &original, config, combinations.len())
}

/// Same search as [`optimize_series`], running combinations on the rayon
/// pool. Each combination gets its own clone of `strategy`; the outcome is
/// identical to the sequential search.
#[cfg(feature = "parallel")]
pub fn optimize_series_parallel(
    strategy: &mut dyn Strategy,
    candles: &[Candle],
    config: &BacktestConfig,
    grid: &ParameterGrid,
    metric: Metric,
) -> Result<OptimizationResult, BacktestError> {
    use rayon::prelude::*;

    grid.validate()?;
    let combinations = grid.combinations();
    let original = strategy.parameters();
    info!(
        strategy = %describe(strategy),
        combinations = combinations.len(),
        metric = %metric,
        "starting parallel grid search"
    );

    let tasks: Vec<(Parameters, Box<dyn Strategy>)> = combinations
        .iter()
        .map(|p| (p.clone(), strategy.boxed_clone()))
        .collect();
    let outcomes: Vec<(Parameters, Result<BacktestResult, BacktestError>)> = tasks
        .into_par_iter()
        .map(|(parameters, mut local)| {
            let outcome = evaluate(local.as_mut(), &parameters, candles, config);
            (parameters, outcome)
        })
        .collect();

    let mut tally = Tally::new(metric);
    for (index, (parameters, outcome)) in outcomes.into_iter().enumerate() {
        tally.record(index, parameters, outcome);
    }
    tally.finish(strategy, &original, config, combinations.len())
}

impl<F: PriceFeed> Backtester<F> {
    /// Fetch data once and grid-search the bound strategy over it.
    pub fn optimize(
        &mut self,
        config: &BacktestConfig,
        grid: &ParameterGrid,
        metric: Metric,
    ) -> Result<OptimizationResult, BacktestError> {
        grid.validate()?;
        config.validate()?;
        let candles = self.fetch(config)?;
        optimize_series(self.strategy_mut(), &candles, config, grid, metric)
    }

    #[cfg(feature = "parallel")]
    pub fn optimize_parallel(
        &mut self,
        config: &BacktestConfig,
        grid: &ParameterGrid,
        metric: Metric,
    ) -> Result<OptimizationResult, BacktestError> {
        grid.validate()?;
        config.validate()?;
        let candles = self.fetch(config)?;
        optimize_series_parallel(self.strategy_mut(), &candles, config, grid, metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::MovingAverageCrossover;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

    fn day(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + TimeDelta::days(i)
    }

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: day(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect()
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            initial_capital: 10_000.0,
            commission_pct: 0.0,
            ..BacktestConfig::default()
        }
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + ((i as f64) / 4.0).sin() * 15.0).collect()
    }

    #[test]
    fn combinations_follow_declaration_order() {
        let grid = ParameterGrid::new()
            .with_axis("short_window", [5usize, 10])
            .with_axis("long_window", [20usize, 30]);
        let combos: Vec<String> = grid.combinations().iter().map(|p| p.to_string()).collect();
        assert_eq!(
            combos,
            vec![
                "long_window=20, short_window=5",
                "long_window=30, short_window=5",
                "long_window=20, short_window=10",
                "long_window=30, short_window=10",
            ]
        );
        assert_eq!(grid.len(), 4);
    }

    #[test]
    fn single_axis_grid() {
        let grid = ParameterGrid::new().with_axis("rsi_period", [7usize, 14, 21]);
        assert_eq!(grid.combinations().len(), 3);
    }

    #[test]
    fn grid_validation() {
        assert!(ParameterGrid::new().validate().is_err());
        let empty_axis = ParameterGrid::new().with_axis("a", Vec::<i64>::new());
        assert!(empty_axis.validate().is_err());
        let duplicate = ParameterGrid::new()
            .with_axis("a", [1i64])
            .with_axis("a", [2i64]);
        assert!(duplicate.validate().is_err());
        assert!(empty_axis.combinations().is_empty());
    }

    #[test]
    fn empty_axis_yields_no_combinations() {
        let grid = ParameterGrid::new()
            .with_axis("short_window", [5usize, 10])
            .with_axis("long_window", Vec::<i64>::new());
        assert_eq!(grid.len(), 0);
        assert!(grid.combinations().is_empty());
        let lone = ParameterGrid::new().with_axis("a", Vec::<i64>::new());
        assert!(lone.combinations().is_empty());
    }

    #[test]
    fn empty_grid_fails_before_running() {
        let mut strategy = MovingAverageCrossover::default();
        let err = optimize_series(&mut strategy, &[], &config(), &ParameterGrid::new(), Metric::TotalReturn)
            .unwrap_err();
        assert!(matches!(err, BacktestError::InvalidParameters { .. }));
    }

    #[test]
    fn flat_series_keeps_first_combination() {
        let mut strategy = MovingAverageCrossover::default();
        let grid = ParameterGrid::new()
            .with_axis("short_window", [5usize, 10])
            .with_axis("long_window", [20usize, 30]);
        let result =
            optimize_series(&mut strategy, &candles(&[100.0; 60]), &config(), &grid, Metric::TotalReturn)
                .unwrap();
        assert_eq!(result.num_combinations, 4);
        assert_eq!(result.trials.len(), 4);
        assert_eq!(result.failed_combinations, 0);
        for trial in &result.trials {
            assert_eq!(trial.metric_value, MetricValue::Number(0.0));
        }
        assert_eq!(
            result.best_parameters,
            Parameters::new().with("short_window", 5usize).with("long_window", 20usize)
        );
        assert_eq!(strategy.short_window, 5);
        assert_eq!(strategy.long_window, 20);
    }

    #[test]
    fn invalid_combinations_are_skipped() {
        let mut strategy = MovingAverageCrossover::default();
        // short >= long is rejected by the strategy
        let grid = ParameterGrid::new()
            .with_axis("short_window", [5usize, 40])
            .with_axis("long_window", [30usize]);
        let result =
            optimize_series(&mut strategy, &candles(&wave(80)), &config(), &grid, Metric::TotalReturn)
                .unwrap();
        assert_eq!(result.num_combinations, 2);
        assert_eq!(result.failed_combinations, 1);
        assert_eq!(result.trials.len(), 1);
        assert_eq!(strategy.short_window, 5);
    }

    #[test]
    fn nothing_viable_restores_parameters() {
        let mut strategy = MovingAverageCrossover::new(3, 9).unwrap();
        let grid = ParameterGrid::new().with_axis("short_window", [50usize, 60]);
        let err = optimize_series(&mut strategy, &candles(&wave(80)), &config(), &grid, Metric::TotalReturn)
            .unwrap_err();
        assert!(matches!(err, BacktestError::NoViableCombination { tried: 2 }));
        assert_eq!(strategy, MovingAverageCrossover::new(3, 9).unwrap());
    }

    #[test]
    fn best_is_strict_maximum() {
        let mut strategy = MovingAverageCrossover::default();
        let grid = ParameterGrid::new()
            .with_axis("short_window", [2usize, 3, 4])
            .with_axis("long_window", [8usize, 12]);
        let series = candles(&wave(120));
        let result =
            optimize_series(&mut strategy, &series, &config(), &grid, Metric::SharpeRatio).unwrap();
        let best = result.best_metric_value.as_f64();
        let first_max = result
            .trials
            .iter()
            .find(|t| t.metric_value.as_f64() == best)
            .unwrap();
        assert_eq!(first_max.parameters, result.best_parameters);
        assert!(result.trials.iter().all(|t| t.metric_value.as_f64() <= best));
        assert_eq!(strategy.parameters(), result.best_parameters);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_matches_sequential() {
        let grid = ParameterGrid::new()
            .with_axis("short_window", [2usize, 3, 5])
            .with_axis("long_window", [8usize, 13, 21]);
        let series = candles(&wave(150));

        let mut seq = MovingAverageCrossover::default();
        let a = optimize_series(&mut seq, &series, &config(), &grid, Metric::TotalReturn).unwrap();
        let mut par = MovingAverageCrossover::default();
        let b = optimize_series_parallel(&mut par, &series, &config(), &grid, Metric::TotalReturn)
            .unwrap();

        assert_eq!(a.best_parameters, b.best_parameters);
        assert_eq!(a.best_metric_value, b.best_metric_value);
        assert_eq!(a.trials.len(), b.trials.len());
        for (x, y) in a.trials.iter().zip(&b.trials) {
            assert_eq!(x.parameters, y.parameters);
            assert_eq!(x.metric_value, y.metric_value);
        }
        assert_eq!(seq, par);
    }

    #[test]
    fn result_serialises_without_full_backtest() {
        let mut strategy = MovingAverageCrossover::default();
        let grid = ParameterGrid::new()
            .with_axis("short_window", [3usize])
            .with_axis("long_window", [9usize]);
        let result =
            optimize_series(&mut strategy, &candles(&wave(50)), &config(), &grid, Metric::TotalReturn)
                .unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["metric"], "total_return");
        assert_eq!(json["num_combinations"], 1);
        assert_eq!(json["best_parameters"]["short_window"], 3);
        assert!(json.get("best_result").is_none());
    }
}
