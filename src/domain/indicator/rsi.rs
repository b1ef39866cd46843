//! RSI (Relative Strength Index) indicator.
//!
//! Average gain/loss are simple rolling means over the last n price changes:
//! - avg_gain = mean(max(ΔC, 0)), avg_loss = mean(max(-ΔC, 0))
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0 and avg_gain > 0: RSI = 100.
//! If both are zero the value is undefined.
//!
//! Warmup: first n bars are undefined (need n price changes).

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::Candle;

pub fn calculate_rsi(candles: &[Candle], period: usize) -> IndicatorSeries {
    if period == 0 || candles.len() < 2 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Rsi(period),
            values: vec![None; candles.len()],
        };
    }

    let mut gains: Vec<f64> = Vec::with_capacity(candles.len() - 1);
    let mut losses: Vec<f64> = Vec::with_capacity(candles.len() - 1);

    for pair in candles.windows(2) {
        let change = pair[1].close - pair[0].close;
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let mut values = Vec::with_capacity(candles.len());
    values.push(None);

    for i in 1..candles.len() {
        // gains[i - 1] is the change into bar i
        if i < period {
            values.push(None);
            continue;
        }
        let window = i - period..i;
        let avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[window].iter().sum::<f64>() / period as f64;

        let rsi = if avg_loss == 0.0 {
            if avg_gain == 0.0 { None } else { Some(100.0) }
        } else {
            Some(100.0 - (100.0 / (1.0 + avg_gain / avg_loss)))
        };
        values.push(rsi);
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_candle(day: u32, close: f64) -> Candle {
        Candle {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    fn make_candles(prices: &[f64]) -> Vec<Candle> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| make_candle(i as u32 + 1, p))
            .collect()
    }

    #[test]
    fn rsi_empty() {
        let series = calculate_rsi(&[], 14);
        assert!(series.values.is_empty());
    }

    #[test]
    fn rsi_single_candle() {
        let series = calculate_rsi(&make_candles(&[100.0]), 14);
        assert_eq!(series.values, vec![None]);
    }

    #[test]
    fn rsi_warmup_period() {
        let candles = make_candles(&[10.0, 11.0, 10.5, 11.5, 12.0]);
        let series = calculate_rsi(&candles, 3);
        assert_eq!(series.values.len(), 5);
        assert!(series.values[0].is_none());
        assert!(series.values[1].is_none());
        assert!(series.values[2].is_none());
        assert!(series.values[3].is_some());
        assert!(series.values[4].is_some());
    }

    #[test]
    fn rsi_known_value() {
        // changes: +1, -0.5, +1 -> gain 2/3, loss 0.5/3 -> rs = 4 -> rsi = 80
        let candles = make_candles(&[10.0, 11.0, 10.5, 11.5]);
        let series = calculate_rsi(&candles, 3);
        assert!((series.values[3].unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_rolls_forward() {
        // window at index 4 covers changes -0.5, +1, +0.5
        let candles = make_candles(&[10.0, 11.0, 10.5, 11.5, 12.0]);
        let series = calculate_rsi(&candles, 3);
        let expected = 100.0 - 100.0 / (1.0 + (1.5 / 3.0) / (0.5 / 3.0));
        assert!((series.values[4].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0]);
        let series = calculate_rsi(&candles, 3);
        assert_eq!(series.values[3], Some(100.0));
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let candles = make_candles(&[4.0, 3.0, 2.0, 1.0]);
        let series = calculate_rsi(&candles, 3);
        assert!(series.values[3].unwrap().abs() < 1e-9);
    }

    #[test]
    fn rsi_flat_is_undefined() {
        let candles = make_candles(&[5.0, 5.0, 5.0, 5.0]);
        let series = calculate_rsi(&candles, 3);
        assert_eq!(series.valid_count(), 0);
    }

    #[test]
    fn rsi_period_zero() {
        let candles = make_candles(&[1.0, 2.0]);
        let series = calculate_rsi(&candles, 0);
        assert_eq!(series.values, vec![None, None]);
    }
}
