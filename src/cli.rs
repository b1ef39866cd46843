//! CLI definition and dispatch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::adapters::csv_adapter::CsvPriceFeed;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::file_report_adapter::FileReportAdapter;
use crate::domain::backtest::{BacktestConfig, Backtester};
use crate::domain::error::BacktestError;
use crate::domain::metrics::Metric;
use crate::domain::optimizer::{OptimizationResult, ParameterGrid};
use crate::domain::strategy::{
    create_strategy, describe, ParamValue, Parameters, Strategy, StrategyKind,
};
use crate::domain::walk_forward::WalkForwardConfig;
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "backtester",
    about = "Single-instrument strategy backtester with grid search and walk-forward validation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest with the configured strategy parameters
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Grid-search strategy parameters
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Metric to maximise (overrides [optimize] metric)
        #[arg(short, long)]
        metric: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rolling train/test validation of the grid search
    WalkForward {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        metric: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a configuration file without running anything
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest { config, output } => run_backtest(&config, output.as_deref()),
        Command::Optimize {
            config,
            metric,
            output,
        } => run_optimize(&config, metric.as_deref(), output.as_deref()),
        Command::WalkForward {
            config,
            metric,
            output,
        } => run_walk_forward(&config, metric.as_deref(), output.as_deref()),
        Command::Validate { config } => run_validate(&config),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, BacktestError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDateTime>, BacktestError> {
    let Some(raw) = config.get_string("backtest", key) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(Some)
        .ok_or_else(|| BacktestError::ConfigInvalid {
            section: "backtest".into(),
            key: key.into(),
            reason: format!("invalid date '{}' (expected YYYY-MM-DD)", raw),
        })
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, BacktestError> {
    config
        .get_string(section, key)
        .ok_or_else(|| BacktestError::ConfigMissing {
            section: section.into(),
            key: key.into(),
        })
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, BacktestError> {
    let defaults = BacktestConfig::default();
    let start = parse_date(config, "start_date")?.ok_or_else(|| BacktestError::ConfigMissing {
        section: "backtest".into(),
        key: "start_date".into(),
    })?;
    let bt = BacktestConfig {
        symbol: require(config, "backtest", "symbol")?,
        timeframe: config
            .get_string("backtest", "timeframe")
            .unwrap_or(defaults.timeframe),
        start,
        end: parse_date(config, "end_date")?,
        initial_capital: config.get_double("backtest", "initial_capital", defaults.initial_capital),
        commission_pct: config.get_double("backtest", "commission_pct", defaults.commission_pct),
        risk_free_rate: config.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
        periods_per_year: config.get_double(
            "backtest",
            "periods_per_year",
            defaults.periods_per_year,
        ),
    };
    bt.validate()?;
    Ok(bt)
}

fn parse_value(section: &str, key: &str, raw: &str) -> Result<ParamValue, BacktestError> {
    raw.parse().map_err(|e: BacktestError| BacktestError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: e.to_string(),
    })
}

/// Strategy from `[strategy]`: `type` picks the kind, every other key is a
/// parameter applied on top of the defaults.
pub fn build_strategy(config: &dyn ConfigPort) -> Result<Box<dyn Strategy>, BacktestError> {
    let kind: StrategyKind = match config.get_string("strategy", "type") {
        Some(raw) => raw.parse().map_err(|e: BacktestError| BacktestError::ConfigInvalid {
            section: "strategy".into(),
            key: "type".into(),
            reason: e.to_string(),
        })?,
        None => StrategyKind::MovingAverage,
    };
    let mut parameters = Parameters::new();
    for key in config.keys("strategy") {
        if key == "type" {
            continue;
        }
        if let Some(raw) = config.get_string("strategy", &key) {
            parameters.insert(&key, parse_value("strategy", &key, &raw)?);
        }
    }
    create_strategy(kind, &parameters)
}

/// Grid from `[grid]`. Axes follow `[optimize] parameters` when given,
/// otherwise the order the keys appear in the file.
pub fn build_grid(config: &dyn ConfigPort) -> Result<ParameterGrid, BacktestError> {
    let names: Vec<String> = match config.get_string("optimize", "parameters") {
        Some(list) => list
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect(),
        None => config.keys("grid"),
    };
    let mut grid = ParameterGrid::new();
    for name in names {
        let raw = require(config, "grid", &name)?;
        let values = raw
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| parse_value("grid", &name, v))
            .collect::<Result<Vec<_>, _>>()?;
        grid.push_axis(&name, values);
    }
    grid.validate()?;
    Ok(grid)
}

/// Metric from the command line, then `[optimize] metric`, then total return.
pub fn resolve_metric(config: &dyn ConfigPort, flag: Option<&str>) -> Result<Metric, BacktestError> {
    match flag
        .map(str::to_string)
        .or_else(|| config.get_string("optimize", "metric"))
    {
        Some(name) => name.parse(),
        None => Ok(Metric::default()),
    }
}

pub fn build_walk_forward(
    config: &dyn ConfigPort,
    metric: Metric,
) -> Result<WalkForwardConfig, BacktestError> {
    let defaults = WalkForwardConfig::default();
    let window = config.get_int("walk_forward", "window_size", defaults.window_size.num_days());
    let step = config.get_int("walk_forward", "step_size", defaults.step_size.num_days());
    for (key, days) in [("window_size", window), ("step_size", step)] {
        let reason = if days <= 0 {
            format!("must be a positive number of days, got {}", days)
        } else if TimeDelta::try_days(days).is_none() {
            format!("{} days is out of range", days)
        } else {
            continue;
        };
        return Err(BacktestError::ConfigInvalid {
            section: "walk_forward".into(),
            key: key.into(),
            reason,
        });
    }
    WalkForwardConfig::days(window, step, metric)
}

fn price_feed(config: &dyn ConfigPort) -> CsvPriceFeed {
    CsvPriceFeed::new(config.get_string("data", "dir").unwrap_or_else(|| "data".to_string()))
}

fn reporter(config: &dyn ConfigPort, flag: Option<&Path>) -> Option<FileReportAdapter> {
    flag.map(Path::to_path_buf)
        .or_else(|| config.get_string("output", "dir").map(PathBuf::from))
        .map(FileReportAdapter::new)
}

fn print_written(paths: &[PathBuf]) {
    for path in paths {
        println!("Wrote {}", path.display());
    }
}

fn run_backtest(config_path: &Path, output: Option<&Path>) -> Result<(), BacktestError> {
    let config = load_config(config_path)?;
    let bt = build_backtest_config(&config)?;
    let strategy = build_strategy(&config)?;
    let backtester = Backtester::new(strategy, price_feed(&config));

    let result = backtester.run(&bt)?;
    print!("{}", result.summary());

    if let Some(reporter) = reporter(&config, output) {
        print_written(&reporter.write_backtest(&result)?);
    }
    Ok(())
}

#[cfg(feature = "parallel")]
fn optimize_with<F: crate::ports::data_port::PriceFeed>(
    backtester: &mut Backtester<F>,
    bt: &BacktestConfig,
    grid: &ParameterGrid,
    metric: Metric,
) -> Result<OptimizationResult, BacktestError> {
    backtester.optimize_parallel(bt, grid, metric)
}

#[cfg(not(feature = "parallel"))]
fn optimize_with<F: crate::ports::data_port::PriceFeed>(
    backtester: &mut Backtester<F>,
    bt: &BacktestConfig,
    grid: &ParameterGrid,
    metric: Metric,
) -> Result<OptimizationResult, BacktestError> {
    backtester.optimize(bt, grid, metric)
}

fn run_optimize(
    config_path: &Path,
    metric: Option<&str>,
    output: Option<&Path>,
) -> Result<(), BacktestError> {
    let config = load_config(config_path)?;
    let bt = build_backtest_config(&config)?;
    let metric = resolve_metric(&config, metric)?;
    let grid = build_grid(&config)?;
    let mut backtester = Backtester::new(build_strategy(&config)?, price_feed(&config));

    let result = optimize_with(&mut backtester, &bt, &grid, metric)?;
    println!(
        "Best parameters: {} ({} = {})",
        describe(backtester.strategy()),
        metric,
        result.best_metric_value
    );
    println!(
        "Combinations: {} evaluated, {} failed",
        result.num_combinations, result.failed_combinations
    );
    print!("{}", result.best_result.summary());

    if let Some(reporter) = reporter(&config, output) {
        print_written(&reporter.write_optimization(&result)?);
        print_written(&reporter.write_backtest(&result.best_result)?);
    }
    Ok(())
}

fn run_walk_forward(
    config_path: &Path,
    metric: Option<&str>,
    output: Option<&Path>,
) -> Result<(), BacktestError> {
    let config = load_config(config_path)?;
    let bt = build_backtest_config(&config)?;
    let metric = resolve_metric(&config, metric)?;
    let grid = build_grid(&config)?;
    let wf = build_walk_forward(&config, metric)?;
    let mut backtester = Backtester::new(build_strategy(&config)?, price_feed(&config));

    let report = backtester.walk_forward_test(&bt, &wf, &grid)?;
    println!(
        "Windows: {} of {} completed",
        report.completed_windows, report.num_windows
    );
    if !report.failed_windows.is_empty() {
        println!("Failed windows: {:?}", report.failed_windows);
    }
    for window in &report.windows {
        println!(
            "  #{} {} .. {}: {} -> ${:.2}",
            window.window.index + 1,
            window.window.test_start,
            window.window.test_end,
            window.train_parameters,
            window.ending_equity
        );
    }
    println!(
        "Final equity: ${:.2} ({:.2}%)",
        report.final_equity, report.total_return_pct
    );
    print!("{}", report.consolidated.summary());

    if let Some(reporter) = reporter(&config, output) {
        print_written(&reporter.write_walk_forward(&report)?);
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), BacktestError> {
    let config = load_config(config_path)?;
    let bt = build_backtest_config(&config)?;
    let strategy = build_strategy(&config)?;
    println!("Strategy: {}", describe(strategy.as_ref()));
    println!(
        "Market: {} {} from {}{}",
        bt.symbol,
        bt.timeframe,
        bt.start,
        bt.end.map(|end| format!(" to {}", end)).unwrap_or_default()
    );

    if !config.keys("grid").is_empty() {
        let metric = resolve_metric(&config, None)?;
        let grid = build_grid(&config)?;
        let wf = build_walk_forward(&config, metric)?;
        println!(
            "Grid: {} combinations over {} parameters, metric {}",
            grid.len(),
            grid.axes().len(),
            metric
        );
        println!(
            "Walk-forward: {}-day training, {}-day step",
            wf.window_size.num_days(),
            wf.step_size.num_days()
        );
    }
    println!("Configuration is valid");
    Ok(())
}
