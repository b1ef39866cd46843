//! OHLCV candle representation and series helpers.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::error::BacktestError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Check that timestamps are strictly increasing.
pub fn check_ordering(candles: &[Candle]) -> Result<(), BacktestError> {
    for (i, pair) in candles.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(BacktestError::InvalidSeries {
                reason: format!(
                    "timestamp {} at index {} does not follow {}",
                    pair[1].timestamp,
                    i + 1,
                    pair[0].timestamp
                ),
            });
        }
    }
    Ok(())
}

/// Sub-slice covering the half-open range `[start, end)`.
///
/// `None` bounds are open. The input must already be ordered.
pub fn slice_range(
    candles: &[Candle],
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
) -> &[Candle] {
    let lo = match start {
        Some(start) => candles.partition_point(|c| c.timestamp < start),
        None => 0,
    };
    let hi = match end {
        Some(end) => candles.partition_point(|c| c.timestamp < end),
        None => candles.len(),
    };
    if lo >= hi { &[] } else { &candles[lo..hi] }
}
