//! Completed backtest: trades, equity curve and the derived metrics.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::backtest::BacktestConfig;
use super::metrics::{self, format_duration, MetricValue, Metrics};
use super::portfolio::EquityPoint;
use super::position::Trade;
use super::strategy::Parameters;

/// Outcome of one simulation. Metrics are computed once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    strategy_name: String,
    parameters: Parameters,
    symbol: String,
    timeframe: String,
    initial_capital: f64,
    trades: Vec<Trade>,
    equity_curve: Vec<EquityPoint>,
    metrics: Metrics,
}

/// One row of the trade table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: &'static str,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub size: f64,
    pub commission: f64,
    pub profit: f64,
    pub profit_pct: f64,
    pub duration: String,
    pub exit_reason: &'static str,
}

/// One row of the equity table. `drawdown_pct` is in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityRecord {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
    pub drawdown_pct: f64,
}

/// Headline record for logging and persistence.
#[derive(Debug, Clone, Serialize)]
pub struct ResultSummary {
    pub strategy: String,
    pub parameters: Parameters,
    pub symbol: String,
    pub timeframe: String,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub metrics: BTreeMap<String, MetricValue>,
}

impl BacktestResult {
    pub fn new(
        strategy_name: impl Into<String>,
        parameters: Parameters,
        config: &BacktestConfig,
        trades: Vec<Trade>,
        equity_curve: Vec<EquityPoint>,
    ) -> Self {
        let metrics = Metrics::compute(
            config.initial_capital,
            &equity_curve,
            &trades,
            config.risk_free_rate,
            config.periods_per_year,
        );
        BacktestResult {
            strategy_name: strategy_name.into(),
            parameters,
            symbol: config.symbol.clone(),
            timeframe: config.timeframe.clone(),
            initial_capital: config.initial_capital,
            trades,
            equity_curve,
            metrics,
        }
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Last equity value, or the starting capital when nothing was recorded.
    pub fn final_equity(&self) -> f64 {
        self.metrics.final_equity
    }

    pub fn metrics_record(&self) -> BTreeMap<String, MetricValue> {
        self.metrics.record()
    }

    pub fn trade_records(&self) -> Vec<TradeRecord> {
        self.trades
            .iter()
            .map(|t| TradeRecord {
                symbol: t.symbol.clone(),
                side: t.side.as_str(),
                entry_time: t.entry_time,
                entry_price: t.entry_price,
                exit_time: t.exit_time,
                exit_price: t.exit_price,
                size: t.size,
                commission: t.commission,
                profit: t.profit,
                profit_pct: t.profit_pct,
                duration: format_duration(t.duration()),
                exit_reason: t.exit_reason.as_str(),
            })
            .collect()
    }

    pub fn equity_records(&self) -> Vec<EquityRecord> {
        let values: Vec<f64> = self.equity_curve.iter().map(|p| p.equity).collect();
        let drawdowns = metrics::drawdown_series(&values);
        self.equity_curve
            .iter()
            .zip(drawdowns)
            .map(|(point, dd)| EquityRecord {
                timestamp: point.timestamp,
                equity: point.equity,
                drawdown_pct: dd * 100.0,
            })
            .collect()
    }

    pub fn to_summary(&self) -> ResultSummary {
        ResultSummary {
            strategy: self.strategy_name.clone(),
            parameters: self.parameters.clone(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.clone(),
            initial_capital: self.initial_capital,
            final_equity: self.final_equity(),
            metrics: self.metrics_record(),
        }
    }

    /// Human-readable report block.
    pub fn summary(&self) -> String {
        let m = &self.metrics;
        let rule = "=".repeat(50);
        let thin = "-".repeat(50);
        let mut out = String::new();
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(
            out,
            "BACKTEST SUMMARY: {} - {} - {}",
            self.strategy_name, self.symbol, self.timeframe
        );
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Initial Capital: ${:.2}", self.initial_capital);
        let _ = writeln!(out, "Final Equity: ${:.2}", m.final_equity);
        let _ = writeln!(
            out,
            "Total Return: ${:.2} ({:.2}%)",
            m.total_return, m.total_return_pct
        );
        let _ = writeln!(out, "Annualized Return: {:.2}%", m.annualized_return * 100.0);
        let _ = writeln!(out, "{}", thin);
        let _ = writeln!(out, "Number of Trades: {}", m.num_trades);
        let _ = writeln!(out, "Win Rate: {:.2}%", m.win_rate * 100.0);
        let _ = writeln!(out, "Profit Factor: {}", MetricValue::Number(m.profit_factor));
        let _ = writeln!(
            out,
            "Average Trade: ${:.2} ({:.2}%)",
            m.avg_profit_per_trade,
            m.avg_profit_pct_per_trade * 100.0
        );
        let _ = writeln!(out, "Best Trade: ${:.2}", m.best_trade);
        let _ = writeln!(out, "Worst Trade: ${:.2}", m.worst_trade);
        let _ = writeln!(out, "Average Duration: {}", format_duration(m.avg_trade_duration));
        let _ = writeln!(out, "{}", thin);
        let _ = writeln!(out, "Maximum Drawdown: {:.2}%", m.max_drawdown * 100.0);
        let _ = writeln!(out, "Sharpe Ratio: {:.2}", m.sharpe_ratio);
        let _ = writeln!(out, "Sortino Ratio: {:.2}", m.sortino_ratio);
        let _ = writeln!(out, "{}", rule);
        out
    }
}
