#![allow(dead_code)]

use backtester::domain::backtest::BacktestConfig;
use backtester::domain::error::BacktestError;
use backtester::domain::ohlcv::Candle;
use backtester::domain::strategy::{Frame, FrameView, Parameters, Signal, Strategy};
use backtester::ports::data_port::PriceFeed;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

pub const SYMBOL: &str = "BTC/USDT";
pub const TIMEFRAME: &str = "1d";

/// Midnight `i` days after 2024-01-01.
pub fn day(i: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + TimeDelta::days(i)
}

pub fn make_candle(i: i64, close: f64) -> Candle {
    Candle {
        timestamp: day(i),
        open: close,
        high: close,
        low: close,
        close,
        volume: 1_000.0,
    }
}

/// One daily candle per close, starting 2024-01-01.
pub fn series(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_candle(i as i64, close))
        .collect()
}

pub fn flat_series(n: usize, price: f64) -> Vec<Candle> {
    series(&vec![price; n])
}

/// Deterministic oscillating series with a slow drift, long enough for
/// crossovers of short windows.
pub fn wave_series(n: usize) -> Vec<Candle> {
    let closes: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + 0.05 * t + 8.0 * (t / 6.0).sin() + 3.0 * (t / 2.5).cos()
        })
        .collect();
    series(&closes)
}

pub fn sample_config(capital: f64, commission_pct: f64) -> BacktestConfig {
    BacktestConfig {
        symbol: SYMBOL.to_string(),
        timeframe: TIMEFRAME.to_string(),
        start: day(0),
        end: None,
        initial_capital: capital,
        commission_pct,
        ..BacktestConfig::default()
    }
}

/// Plays back a fixed signal per candle index; `Hold` past the script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStrategy {
    pub signals: Vec<Signal>,
    pub warmup: usize,
}

impl ScriptedStrategy {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self { signals, warmup: 1 }
    }

    pub fn always_hold() -> Self {
        Self::new(Vec::new())
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with("warmup", self.warmup)
    }

    fn apply(&mut self, parameters: &Parameters) -> Result<(), BacktestError> {
        match parameters.get("warmup").and_then(|v| v.as_usize()) {
            Some(warmup) => {
                self.warmup = warmup;
                Ok(())
            }
            None => Err(BacktestError::invalid_parameters("warmup must be a count")),
        }
    }

    fn min_required_candles(&self) -> usize {
        self.warmup
    }

    fn prepare(&self, candles: &[Candle]) -> Result<Frame, BacktestError> {
        Ok(Frame::new(candles))
    }

    fn generate_signal(&self, data: &FrameView<'_>) -> Result<Signal, BacktestError> {
        Ok(self
            .signals
            .get(data.len() - 1)
            .copied()
            .unwrap_or(Signal::Hold))
    }

    fn boxed_clone(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}

/// Fails every signal request at or after candle `fail_at`.
#[derive(Debug, Clone)]
pub struct ExplodingStrategy {
    pub fail_at: usize,
}

impl Strategy for ExplodingStrategy {
    fn name(&self) -> &str {
        "Exploding"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with("fail_at", self.fail_at)
    }

    fn apply(&mut self, parameters: &Parameters) -> Result<(), BacktestError> {
        if let Some(v) = parameters.get("fail_at").and_then(|v| v.as_usize()) {
            self.fail_at = v;
        }
        Ok(())
    }

    fn min_required_candles(&self) -> usize {
        1
    }

    fn prepare(&self, candles: &[Candle]) -> Result<Frame, BacktestError> {
        Ok(Frame::new(candles))
    }

    fn generate_signal(&self, data: &FrameView<'_>) -> Result<Signal, BacktestError> {
        if data.len() > self.fail_at {
            return Err(BacktestError::simulation(None, "signal generator failed"));
        }
        Ok(Signal::Hold)
    }

    fn boxed_clone(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}

/// Panics while generating the signal for candle `panic_at`.
#[derive(Debug, Clone)]
pub struct PanickingStrategy {
    pub panic_at: usize,
}

impl Strategy for PanickingStrategy {
    fn name(&self) -> &str {
        "Panicking"
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with("panic_at", self.panic_at)
    }

    fn apply(&mut self, parameters: &Parameters) -> Result<(), BacktestError> {
        if let Some(v) = parameters.get("panic_at").and_then(|v| v.as_usize()) {
            self.panic_at = v;
        }
        Ok(())
    }

    fn min_required_candles(&self) -> usize {
        1
    }

    fn prepare(&self, candles: &[Candle]) -> Result<Frame, BacktestError> {
        Ok(Frame::new(candles))
    }

    fn generate_signal(&self, data: &FrameView<'_>) -> Result<Signal, BacktestError> {
        if data.len() == self.panic_at + 1 {
            panic!("index {} out of range", self.panic_at);
        }
        Ok(Signal::Hold)
    }

    fn boxed_clone(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}

/// Feed that can never be reached.
pub struct DownFeed;

impl PriceFeed for DownFeed {
    fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: &str,
        _start: NaiveDateTime,
        _end: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, BacktestError> {
        Err(BacktestError::Io(std::io::Error::other("connection refused")))
    }
}
