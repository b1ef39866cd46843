//! Price feed port trait.

use chrono::NaiveDateTime;

use crate::domain::error::BacktestError;
use crate::domain::ohlcv::Candle;

/// Source of historical candles for one symbol and timeframe.
///
/// Implementations return candles with `start <= timestamp < end`, ordered
/// by timestamp. An empty series is a valid answer; the engine reports it
/// as missing data.
pub trait PriceFeed {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, BacktestError>;
}

impl<T: PriceFeed + ?Sized> PriceFeed for &T {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, BacktestError> {
        (**self).fetch_ohlcv(symbol, timeframe, start, end)
    }
}
