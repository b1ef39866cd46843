//! JSON and CSV report writer implementing ReportPort.
//!
//! Every file is named `<strategy>_<symbol>_<timeframe>_<suffix>`, with
//! spaces in the strategy name turned into `_` and `/` in the symbol into `-`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::domain::error::BacktestError;
use crate::domain::optimizer::OptimizationResult;
use crate::domain::result::BacktestResult;
use crate::domain::walk_forward::WalkForwardReport;
use crate::ports::report_port::ReportPort;

const TRADE_HEADER: [&str; 12] = [
    "symbol",
    "side",
    "entry_time",
    "entry_price",
    "exit_time",
    "exit_price",
    "size",
    "commission",
    "profit",
    "profit_pct",
    "duration",
    "exit_reason",
];

const EQUITY_HEADER: [&str; 3] = ["timestamp", "equity", "drawdown_pct"];

pub struct FileReportAdapter {
    output_dir: PathBuf,
}

impl FileReportAdapter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn path_for(&self, strategy: &str, symbol: &str, timeframe: &str, suffix: &str) -> PathBuf {
        let stem = format!(
            "{}_{}_{}",
            strategy.replace(' ', "_"),
            symbol.replace('/', "-"),
            timeframe
        );
        self.output_dir.join(format!("{}_{}", stem, suffix))
    }

    fn ensure_dir(&self) -> Result<(), BacktestError> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), BacktestError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Rows serialise with their own header; an empty table still gets `header`.
fn write_csv<T: Serialize>(path: &Path, rows: &[T], header: &[&str]) -> Result<(), BacktestError> {
    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

impl ReportPort for FileReportAdapter {
    fn write_backtest(&self, result: &BacktestResult) -> Result<Vec<PathBuf>, BacktestError> {
        self.ensure_dir()?;
        let name = |suffix| {
            self.path_for(
                result.strategy_name(),
                result.symbol(),
                result.timeframe(),
                suffix,
            )
        };

        let metrics_path = name("metrics.json");
        write_json(&metrics_path, &result.to_summary())?;
        let trades_path = name("trades.csv");
        write_csv(&trades_path, &result.trade_records(), &TRADE_HEADER)?;
        let equity_path = name("equity.csv");
        write_csv(&equity_path, &result.equity_records(), &EQUITY_HEADER)?;

        info!(dir = %self.output_dir.display(), "backtest results saved");
        Ok(vec![metrics_path, trades_path, equity_path])
    }

    fn write_optimization(
        &self,
        result: &OptimizationResult,
    ) -> Result<Vec<PathBuf>, BacktestError> {
        self.ensure_dir()?;
        let path = self.path_for(
            &result.strategy,
            &result.symbol,
            &result.timeframe,
            "optimization.json",
        );
        write_json(&path, result)?;
        info!(path = %path.display(), "optimization results saved");
        Ok(vec![path])
    }

    fn write_walk_forward(
        &self,
        report: &WalkForwardReport,
    ) -> Result<Vec<PathBuf>, BacktestError> {
        self.ensure_dir()?;
        let name = |suffix| self.path_for(&report.strategy, &report.symbol, &report.timeframe, suffix);

        let report_path = name("walk_forward.json");
        write_json(&report_path, report)?;
        let equity_path = name("walk_forward_equity.csv");
        write_csv(&equity_path, &report.equity_curve, &EQUITY_HEADER)?;

        info!(dir = %self.output_dir.display(), "walk-forward results saved");
        Ok(vec![report_path, equity_path])
    }
}
