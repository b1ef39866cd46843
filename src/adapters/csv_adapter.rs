//! CSV file price feed.
//!
//! One file per series, named `<symbol>_<timeframe>.csv` with `/` in the
//! symbol replaced by `-` (so `BTC/USDT` at `1d` reads `BTC-USDT_1d.csv`).
//! The header must carry `timestamp` (or `date`), `open`, `high`, `low`,
//! `close` and optionally `volume`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::debug;

use crate::domain::error::BacktestError;
use crate::domain::ohlcv::{check_ordering, Candle};
use crate::ports::data_port::PriceFeed;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "date")]
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Parse a timestamp cell: ISO date-time, plain date, or epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub struct CsvPriceFeed {
    base_path: PathBuf,
}

impl CsvPriceFeed {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn csv_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.base_path
            .join(format!("{}_{}.csv", symbol.replace('/', "-"), timeframe))
    }

    fn read_all(&self, path: &Path) -> Result<Vec<Candle>, BacktestError> {
        let file = File::open(path).map_err(|e| BacktestError::FeedUnavailable {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));

        let mut candles = Vec::new();
        for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row?;
            let timestamp =
                parse_timestamp(&row.timestamp).ok_or_else(|| BacktestError::InvalidSeries {
                    reason: format!(
                        "{}: unparseable timestamp '{}' on row {}",
                        path.display(),
                        row.timestamp,
                        line + 1
                    ),
                })?;
            candles.push(Candle {
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }
        Ok(candles)
    }
}

impl PriceFeed for CsvPriceFeed {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Candle>, BacktestError> {
        let path = self.csv_path(symbol, timeframe);
        let mut candles = self.read_all(&path)?;
        candles.retain(|c| c.timestamp >= start && end.is_none_or(|end| c.timestamp < end));
        candles.sort_by_key(|c| c.timestamp);
        check_ordering(&candles)?;
        debug!(
            path = %path.display(),
            candles = candles.len(),
            "loaded price series"
        );
        Ok(candles)
    }
}
