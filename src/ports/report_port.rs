//! Report output port trait.

use std::path::PathBuf;

use crate::domain::error::BacktestError;
use crate::domain::optimizer::OptimizationResult;
use crate::domain::result::BacktestResult;
use crate::domain::walk_forward::WalkForwardReport;

/// Port for persisting run results. Each method returns the paths it wrote.
pub trait ReportPort {
    fn write_backtest(&self, result: &BacktestResult) -> Result<Vec<PathBuf>, BacktestError>;

    fn write_optimization(
        &self,
        result: &OptimizationResult,
    ) -> Result<Vec<PathBuf>, BacktestError>;

    fn write_walk_forward(
        &self,
        report: &WalkForwardReport,
    ) -> Result<Vec<PathBuf>, BacktestError>;
}
