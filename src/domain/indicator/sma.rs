//! Simple Moving Average of closes.
//!
//! SMA[i] = mean(C[i-n+1..=i]). Warmup: first (n-1) bars are undefined.

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Candle;

pub fn calculate_sma(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Sma(period),
            values: vec![None; candles.len()],
        };
    }

    // Summed per window: a running sum drifts on long series.
    let values = (0..candles.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                let sum: f64 = candles[i + 1 - period..=i].iter().map(|c| c.close).sum();
                Some(sum / period as f64)
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}
