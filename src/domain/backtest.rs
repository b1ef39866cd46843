//! Backtest engine and event loop.
//!
//! [`simulate`] replays an in-memory candle series against one strategy.
//! [`Backtester`] pairs a strategy with a [`PriceFeed`] and adds fetching,
//! logging and the batch operations (optimization, walk-forward).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use chrono::NaiveDateTime;
use tracing::{debug, error, info};

use super::error::BacktestError;
use super::execution::{enter_long, exit_long, EntryResult};
use super::ohlcv::{check_ordering, Candle};
use super::portfolio::SimulationState;
use super::position::ExitReason;
use super::result::BacktestResult;
use super::strategy::{describe, Signal, Strategy};
use crate::ports::data_port::PriceFeed;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbol: String,
    pub timeframe: String,
    pub start: NaiveDateTime,
    /// Exclusive. `None` runs to the end of the available data.
    pub end: Option<NaiveDateTime>,
    pub initial_capital: f64,
    /// Percent of notional charged on each leg.
    pub commission_pct: f64,
    /// Annual rate used by Sharpe and Sortino.
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            symbol: "BTC/USDT".to_string(),
            timeframe: "1d".to_string(),
            start: NaiveDateTime::default(),
            end: None,
            initial_capital: 10_000.0,
            commission_pct: 0.1,
            risk_free_rate: 0.0,
            periods_per_year: 252.0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(BacktestError::invalid_parameters(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if !self.commission_pct.is_finite() || self.commission_pct < 0.0 {
            return Err(BacktestError::invalid_parameters(format!(
                "commission_pct must be non-negative, got {}",
                self.commission_pct
            )));
        }
        if !self.periods_per_year.is_finite() || self.periods_per_year <= 0.0 {
            return Err(BacktestError::invalid_parameters(format!(
                "periods_per_year must be positive, got {}",
                self.periods_per_year
            )));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(BacktestError::invalid_parameters("risk_free_rate must be finite"));
        }
        if let Some(end) = self.end {
            if end <= self.start {
                return Err(BacktestError::invalid_parameters(format!(
                    "end {} is not after start {}",
                    end, self.start
                )));
            }
        }
        Ok(())
    }
}

fn at_candle(err: BacktestError, timestamp: NaiveDateTime) -> BacktestError {
    match err {
        BacktestError::Simulation {
            timestamp: None,
            reason,
        } => BacktestError::simulation(Some(timestamp), reason),
        err @ BacktestError::Simulation { .. } => err,
        other => BacktestError::simulation(Some(timestamp), other.to_string()),
    }
}

/// Replay `candles` against `strategy`.
///
/// The strategy sees a growing prefix of the prepared frame, never a later
/// candle. Candles before the warm-up length are skipped and get no equity
/// point. An open position is closed at the last close when the data ends.
///
/// A panic raised by the strategy is caught and reported as a
/// [`BacktestError::Simulation`] for this run only.
pub fn simulate(
    strategy: &dyn Strategy,
    candles: &[Candle],
    config: &BacktestConfig,
) -> Result<BacktestResult, BacktestError> {
    panic::catch_unwind(AssertUnwindSafe(|| replay(strategy, candles, config))).unwrap_or_else(
        |payload| {
            let reason = panic_message(payload.as_ref());
            error!(strategy = strategy.name(), %reason, "strategy panicked");
            Err(BacktestError::simulation(
                None,
                format!("strategy panicked: {}", reason),
            ))
        },
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn replay(
    strategy: &dyn Strategy,
    candles: &[Candle],
    config: &BacktestConfig,
) -> Result<BacktestResult, BacktestError> {
    config.validate()?;
    if candles.is_empty() {
        return Err(BacktestError::NoData {
            symbol: config.symbol.clone(),
            timeframe: config.timeframe.clone(),
        });
    }
    check_ordering(candles)?;
    strategy.validate()?;

    let frame = strategy
        .prepare(candles)
        .map_err(|e| BacktestError::simulation(None, format!("prepare failed: {}", e)))?;
    if frame.len() != candles.len() {
        return Err(BacktestError::simulation(
            None,
            format!(
                "prepare returned {} rows for {} candles",
                frame.len(),
                candles.len()
            ),
        ));
    }

    let warmup = strategy.min_required_candles().max(1);
    let commission_pct = config.commission_pct;
    let mut state = SimulationState::new(config.initial_capital);

    for (i, candle) in candles.iter().enumerate() {
        if i + 1 < warmup {
            continue;
        }
        let ts = candle.timestamp;
        let close = candle.close;
        if !close.is_finite() || close <= 0.0 {
            return Err(BacktestError::simulation(
                Some(ts),
                format!("invalid close price {}", close),
            ));
        }
        let view = frame.view(i + 1);

        if let Some(position) = state.position.as_mut() {
            if let Some(stop) = strategy.update_stop_loss(&view, position.stop_loss) {
                position.stop_loss = Some(stop);
            }
            if position.should_stop_loss(close) {
                if let Some(trade) = exit_long(&mut state, close, ts, ExitReason::StopLoss, commission_pct)
                {
                    debug!(time = %ts, price = close, profit = trade.profit, "stop-loss exit");
                }
                state.record_equity(ts, close);
                continue;
            }
        }

        let signal = strategy
            .generate_signal(&view)
            .map_err(|e| at_candle(e, ts))?;

        match signal {
            Signal::Buy if state.is_flat() => {
                let fraction = strategy.risk_adjustment(&view);
                if let EntryResult::Entered { size, commission, .. } =
                    enter_long(&mut state, &config.symbol, close, ts, fraction, commission_pct)
                {
                    debug!(time = %ts, price = close, size, commission, "entered long");
                }
            }
            Signal::Sell if !state.is_flat() => {
                if let Some(trade) = exit_long(&mut state, close, ts, ExitReason::Signal, commission_pct) {
                    debug!(time = %ts, price = close, profit = trade.profit, "exited long");
                }
            }
            _ => {}
        }

        state.record_equity(ts, close);
    }

    if let (false, Some(last)) = (state.is_flat(), candles.last()) {
        if let Some(trade) = exit_long(
            &mut state,
            last.close,
            last.timestamp,
            ExitReason::EndOfData,
            commission_pct,
        ) {
            info!(
                time = %last.timestamp,
                price = last.close,
                profit = trade.profit,
                "closed open position at end of data"
            );
        }
        // the final point reflects the realized close
        let equity = state.cash;
        if let Some(point) = state.equity_curve.last_mut() {
            point.equity = equity;
        }
    }

    Ok(BacktestResult::new(
        strategy.name(),
        strategy.parameters(),
        config,
        state.trades,
        state.equity_curve,
    ))
}

/// A strategy bound to a price feed.
pub struct Backtester<F> {
    strategy: Box<dyn Strategy>,
    feed: F,
}

impl<F: PriceFeed> Backtester<F> {
    pub fn new(strategy: Box<dyn Strategy>, feed: F) -> Self {
        Backtester { strategy, feed }
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn strategy_mut(&mut self) -> &mut dyn Strategy {
        self.strategy.as_mut()
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Load the candles for `config`'s symbol and range.
    ///
    /// Feed failures and empty answers are reported as missing data.
    pub fn fetch(&self, config: &BacktestConfig) -> Result<Vec<Candle>, BacktestError> {
        let candles = self
            .feed
            .fetch_ohlcv(&config.symbol, &config.timeframe, config.start, config.end)
            .map_err(|e| {
                if e.is_data_unavailable() {
                    e
                } else {
                    BacktestError::FeedUnavailable {
                        reason: e.to_string(),
                    }
                }
            })?;
        if candles.is_empty() {
            return Err(BacktestError::NoData {
                symbol: config.symbol.clone(),
                timeframe: config.timeframe.clone(),
            });
        }
        check_ordering(&candles)?;
        Ok(candles)
    }

    /// Fetch data and run one simulation.
    ///
    /// Every failure is logged and returned; a partial result is never
    /// produced.
    pub fn run(&self, config: &BacktestConfig) -> Result<BacktestResult, BacktestError> {
        info!(
            strategy = %describe(self.strategy()),
            symbol = %config.symbol,
            timeframe = %config.timeframe,
            "running backtest"
        );
        let outcome = self
            .fetch(config)
            .and_then(|candles| simulate(self.strategy(), &candles, config));
        match &outcome {
            Ok(result) => info!(
                trades = result.metrics().num_trades,
                final_equity = result.final_equity(),
                "backtest completed"
            ),
            Err(e) => error!(error = %e, symbol = %config.symbol, "backtest failed"),
        }
        outcome
    }
}
