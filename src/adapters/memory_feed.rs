//! In-memory price feed for tests and embedding.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::domain::error::BacktestError;
use crate::domain::ohlcv::{check_ordering, slice_range, Candle};
use crate::ports::data_port::PriceFeed;

/// Series keyed by `(symbol, timeframe)`. Unknown series yield no candles.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeed {
    series: BTreeMap<(String, String), Vec<Candle>>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a series, sorted by timestamp.
    pub fn insert(
        &mut self,
        symbol: &str,
        timeframe: &str,
        mut candles: Vec<Candle>,
    ) -> Result<(), BacktestError> {
        candles.sort_by_key(|c| c.timestamp);
        check_ordering(&candles)?;
        self.series
            .insert((symbol.to_string(), timeframe.to_string()), candles);
        Ok(())
    }

    pub fn with_series(
        mut self,
        symbol: &str,
        timeframe: &str,
        candles: Vec<Candle>,
    ) -> Result<Self, BacktestError> {
        self.insert(symbol, timeframe, candles)?;
        Ok(self)
    }
}

impl PriceFeed for InMemoryFeed {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, BacktestError> {
        let key = (symbol.to_string(), timeframe.to_string());
        Ok(self
            .series
            .get(&key)
            .map(|candles| slice_range(candles, Some(start), end).to_vec())
            .unwrap_or_default())
    }
}
