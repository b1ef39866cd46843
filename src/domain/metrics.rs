//! Performance metrics and statistics.
//!
//! Every function here is pure. Ratios that would come out NaN (zero
//! variance, no trades) are reported as `0.0`; only profit factor, calmar
//! and recovery factor may be `+inf`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Serialize, Serializer};

use super::error::BacktestError;
use super::portfolio::EquityPoint;
use super::position::Trade;

pub const DAYS_PER_YEAR: f64 = 365.0;

fn nan_to_zero(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1). `None` below two observations.
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Simple per-period returns of an equity series.
pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| {
            let prev = w[0];
            let curr = w[1];
            if prev > 0.0 { (curr - prev) / prev } else { 0.0 }
        })
        .collect()
}

/// Annual rate converted to an equivalent per-period rate.
pub fn per_period_rate(annual_rate: f64, periods_per_year: f64) -> f64 {
    (1.0 + annual_rate).powf(1.0 / periods_per_year) - 1.0
}

/// Fractional decline from the running peak at each point.
pub fn drawdown_series(equity: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    equity
        .iter()
        .map(|&value| {
            peak = peak.max(value);
            if peak > 0.0 {
                nan_to_zero((peak - value) / peak)
            } else {
                0.0
            }
        })
        .collect()
}

/// Largest peak-to-trough decline as a fraction of the peak.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    drawdown_series(equity).into_iter().fold(0.0, f64::max)
}

/// Annualised Sharpe ratio of per-period returns.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    let rf = per_period_rate(risk_free_rate, periods_per_year);
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    match (mean(&excess), sample_std(&excess)) {
        (Some(m), Some(sd)) if sd > 0.0 => nan_to_zero(m / sd * periods_per_year.sqrt()),
        _ => 0.0,
    }
}

/// Annualised Sortino ratio: excess mean over the deviation of the negative
/// excess returns only.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let rf = per_period_rate(risk_free_rate, periods_per_year);
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let downside: Vec<f64> = excess.iter().copied().filter(|r| *r < 0.0).collect();
    match (mean(&excess), sample_std(&downside)) {
        (Some(m), Some(dd)) if dd > 0.0 => nan_to_zero(m / dd * periods_per_year.sqrt()),
        _ => 0.0,
    }
}

/// Annualised standard deviation of per-period returns.
pub fn volatility(returns: &[f64], periods_per_year: f64) -> f64 {
    sample_std(returns)
        .map(|sd| nan_to_zero(sd * periods_per_year.sqrt()))
        .unwrap_or(0.0)
}

/// Compound `total_return` (a fraction) to a yearly rate over `days`.
///
/// A zero-length period returns `total_return` unchanged.
pub fn annualized_return(total_return: f64, days: i64) -> f64 {
    if days <= 0 {
        return nan_to_zero(total_return);
    }
    nan_to_zero((1.0 + total_return).powf(DAYS_PER_YEAR / days as f64) - 1.0)
}

pub fn calmar_ratio(annualized_return: f64, max_drawdown: f64) -> f64 {
    if max_drawdown == 0.0 {
        if annualized_return > 0.0 { f64::INFINITY } else { 0.0 }
    } else {
        nan_to_zero(annualized_return / max_drawdown)
    }
}

/// Net profit over the largest drawdown expressed in currency.
pub fn recovery_factor(net_profit: f64, max_drawdown: f64, start_equity: f64) -> f64 {
    let drawdown_amount = max_drawdown * start_equity;
    if drawdown_amount == 0.0 {
        if net_profit > 0.0 { f64::INFINITY } else { 0.0 }
    } else {
        nan_to_zero(net_profit / drawdown_amount)
    }
}

pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.profit > 0.0).count() as f64 / trades.len() as f64
}

pub fn profit_factor(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades.iter().filter(|t| t.profit > 0.0).map(|t| t.profit).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.profit < 0.0)
        .map(|t| t.profit.abs())
        .sum();
    if gross_loss == 0.0 {
        if gross_profit > 0.0 { f64::INFINITY } else { 0.0 }
    } else {
        nan_to_zero(gross_profit / gross_loss)
    }
}

/// `win_rate * avg_win / avg_loss - (1 - win_rate)`. Needs at least one
/// winning and one losing trade.
pub fn expectancy(trades: &[Trade]) -> f64 {
    let wins: Vec<f64> = trades.iter().filter(|t| t.profit > 0.0).map(|t| t.profit).collect();
    let losses: Vec<f64> = trades
        .iter()
        .filter(|t| t.profit < 0.0)
        .map(|t| t.profit.abs())
        .collect();
    let (Some(avg_win), Some(avg_loss)) = (mean(&wins), mean(&losses)) else {
        return 0.0;
    };
    if avg_loss == 0.0 {
        return 0.0;
    }
    let rate = wins.len() as f64 / trades.len() as f64;
    nan_to_zero(rate * avg_win / avg_loss - (1.0 - rate))
}

/// Longest run of trades with non-positive profit.
pub fn max_consecutive_losses(trades: &[Trade]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for trade in trades {
        if trade.profit <= 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Mean profit and mean profit fraction per trade.
pub fn average_trade(trades: &[Trade]) -> (f64, f64) {
    if trades.is_empty() {
        return (0.0, 0.0);
    }
    let n = trades.len() as f64;
    let profit = trades.iter().map(|t| t.profit).sum::<f64>() / n;
    let profit_pct = trades.iter().map(|t| t.profit_pct).sum::<f64>() / n;
    (profit, profit_pct)
}

pub fn average_trade_duration(trades: &[Trade]) -> TimeDelta {
    if trades.is_empty() {
        return TimeDelta::zero();
    }
    let total_ms: i64 = trades.iter().map(|t| t.duration().num_milliseconds()).sum();
    TimeDelta::milliseconds(total_ms / trades.len() as i64)
}

/// Full performance report for one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    /// Net profit in currency.
    pub total_return: f64,
    /// Net profit as a percentage of starting capital.
    pub total_return_pct: f64,
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub volatility: f64,
    pub recovery_factor: f64,
    pub num_trades: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub max_consecutive_losses: usize,
    pub avg_trade_duration: TimeDelta,
    pub avg_profit_per_trade: f64,
    pub avg_profit_pct_per_trade: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub final_equity: f64,
}

impl Metrics {
    pub fn compute(
        initial_capital: f64,
        equity_curve: &[EquityPoint],
        trades: &[Trade],
        risk_free_rate: f64,
        periods_per_year: f64,
    ) -> Self {
        let equity: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
        let final_equity = equity.last().copied().unwrap_or(initial_capital);

        let total_return = final_equity - initial_capital;
        let total_return_frac = if initial_capital > 0.0 {
            total_return / initial_capital
        } else {
            0.0
        };

        let days = match (equity_curve.first(), equity_curve.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_days(),
            _ => 0,
        };
        let annualized = annualized_return(total_return_frac, days);

        let max_dd = max_drawdown(&equity);
        let returns = period_returns(&equity);
        let (avg_profit, avg_profit_pct) = average_trade(trades);

        Metrics {
            total_return,
            total_return_pct: total_return_frac * 100.0,
            annualized_return: annualized,
            max_drawdown: max_dd,
            sharpe_ratio: sharpe_ratio(&returns, risk_free_rate, periods_per_year),
            sortino_ratio: sortino_ratio(&returns, risk_free_rate, periods_per_year),
            calmar_ratio: calmar_ratio(annualized, max_dd),
            volatility: volatility(&returns, periods_per_year),
            recovery_factor: recovery_factor(total_return, max_dd, initial_capital),
            num_trades: trades.len(),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            expectancy: expectancy(trades),
            max_consecutive_losses: max_consecutive_losses(trades),
            avg_trade_duration: average_trade_duration(trades),
            avg_profit_per_trade: avg_profit,
            avg_profit_pct_per_trade: avg_profit_pct,
            best_trade: trades.iter().map(|t| t.profit).reduce(f64::max).unwrap_or(0.0),
            worst_trade: trades.iter().map(|t| t.profit).reduce(f64::min).unwrap_or(0.0),
            final_equity,
        }
    }

    /// Flat name -> value record.
    pub fn record(&self) -> BTreeMap<String, MetricValue> {
        let mut out = BTreeMap::new();
        let mut put = |name: &str, value: MetricValue| {
            out.insert(name.to_string(), value);
        };
        put("total_return", MetricValue::Number(self.total_return));
        put("total_return_pct", MetricValue::Number(self.total_return_pct));
        put("annualized_return", MetricValue::Number(self.annualized_return));
        put("max_drawdown", MetricValue::Number(self.max_drawdown));
        put("sharpe_ratio", MetricValue::Number(self.sharpe_ratio));
        put("sortino_ratio", MetricValue::Number(self.sortino_ratio));
        put("calmar_ratio", MetricValue::Number(self.calmar_ratio));
        put("volatility", MetricValue::Number(self.volatility));
        put("recovery_factor", MetricValue::Number(self.recovery_factor));
        put("num_trades", MetricValue::Count(self.num_trades));
        put("win_rate", MetricValue::Number(self.win_rate));
        put("profit_factor", MetricValue::Number(self.profit_factor));
        put("expectancy", MetricValue::Number(self.expectancy));
        put(
            "max_consecutive_losses",
            MetricValue::Count(self.max_consecutive_losses),
        );
        put(
            "avg_trade_duration",
            MetricValue::Duration(self.avg_trade_duration),
        );
        put("avg_profit_per_trade", MetricValue::Number(self.avg_profit_per_trade));
        put(
            "avg_profit_pct_per_trade",
            MetricValue::Number(self.avg_profit_pct_per_trade),
        );
        put("best_trade", MetricValue::Number(self.best_trade));
        put("worst_trade", MetricValue::Number(self.worst_trade));
        put("final_equity", MetricValue::Number(self.final_equity));
        out
    }
}

/// One entry of a metrics record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Count(usize),
    Duration(TimeDelta),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Number(v) => v,
            MetricValue::Count(n) => n as f64,
            MetricValue::Duration(d) => d.num_milliseconds() as f64 / 1000.0,
        }
    }
}

/// Renders a duration as `"2 days, 3:00:00"`.
pub fn format_duration(duration: TimeDelta) -> String {
    let micros = duration
        .num_microseconds()
        .unwrap_or_else(|| duration.num_milliseconds().saturating_mul(1000));
    let total_secs = micros.div_euclid(1_000_000);
    let frac = micros.rem_euclid(1_000_000);
    let days = total_secs.div_euclid(86_400);
    let rem = total_secs.rem_euclid(86_400);

    let mut out = String::new();
    if days != 0 {
        let unit = if days.abs() == 1 { "day" } else { "days" };
        out.push_str(&format!("{} {}, ", days, unit));
    }
    out.push_str(&format!("{}:{:02}:{:02}", rem / 3600, rem % 3600 / 60, rem % 60));
    if frac != 0 {
        out.push_str(&format!(".{:06}", frac));
    }
    out
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(v) if v.is_infinite() => {
                write!(f, "{}", if *v > 0.0 { "inf" } else { "-inf" })
            }
            MetricValue::Number(v) => write!(f, "{:.4}", v),
            MetricValue::Count(n) => write!(f, "{}", n),
            MetricValue::Duration(d) => write!(f, "{}", format_duration(*d)),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            MetricValue::Number(v) if v.is_finite() => serializer.serialize_f64(v),
            MetricValue::Number(v) if v > 0.0 => serializer.serialize_str("inf"),
            MetricValue::Number(v) if v < 0.0 => serializer.serialize_str("-inf"),
            MetricValue::Number(_) => serializer.serialize_f64(0.0),
            MetricValue::Count(n) => serializer.serialize_u64(n as u64),
            MetricValue::Duration(d) => serializer.serialize_str(&format_duration(d)),
        }
    }
}

/// Objective an optimizer can rank runs by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Metric {
    #[default]
    TotalReturn,
    TotalReturnPct,
    AnnualizedReturn,
    SharpeRatio,
    SortinoRatio,
    CalmarRatio,
    RecoveryFactor,
    ProfitFactor,
    WinRate,
    Expectancy,
    AvgProfitPerTrade,
    FinalEquity,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::TotalReturn,
        Metric::TotalReturnPct,
        Metric::AnnualizedReturn,
        Metric::SharpeRatio,
        Metric::SortinoRatio,
        Metric::CalmarRatio,
        Metric::RecoveryFactor,
        Metric::ProfitFactor,
        Metric::WinRate,
        Metric::Expectancy,
        Metric::AvgProfitPerTrade,
        Metric::FinalEquity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::TotalReturn => "total_return",
            Metric::TotalReturnPct => "total_return_pct",
            Metric::AnnualizedReturn => "annualized_return",
            Metric::SharpeRatio => "sharpe_ratio",
            Metric::SortinoRatio => "sortino_ratio",
            Metric::CalmarRatio => "calmar_ratio",
            Metric::RecoveryFactor => "recovery_factor",
            Metric::ProfitFactor => "profit_factor",
            Metric::WinRate => "win_rate",
            Metric::Expectancy => "expectancy",
            Metric::AvgProfitPerTrade => "avg_profit_per_trade",
            Metric::FinalEquity => "final_equity",
        }
    }

    pub fn value(&self, metrics: &Metrics) -> f64 {
        match self {
            Metric::TotalReturn => metrics.total_return,
            Metric::TotalReturnPct => metrics.total_return_pct,
            Metric::AnnualizedReturn => metrics.annualized_return,
            Metric::SharpeRatio => metrics.sharpe_ratio,
            Metric::SortinoRatio => metrics.sortino_ratio,
            Metric::CalmarRatio => metrics.calmar_ratio,
            Metric::RecoveryFactor => metrics.recovery_factor,
            Metric::ProfitFactor => metrics.profit_factor,
            Metric::WinRate => metrics.win_rate,
            Metric::Expectancy => metrics.expectancy,
            Metric::AvgProfitPerTrade => metrics.avg_profit_per_trade,
            Metric::FinalEquity => metrics.final_equity,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Metric::ALL.iter().map(|m| m.name()).collect();
                BacktestError::invalid_parameters(format!(
                    "unknown metric '{}' (available: {})",
                    s.trim(),
                    known.join(", ")
                ))
            })
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}
