//! Open position and completed trade records.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Signal => "signal",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

/// The single long position a simulation may hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub size: f64,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub entry_commission: f64,
    pub stop_loss: Option<f64>,
}

impl Position {
    pub fn entry_notional(&self) -> f64 {
        self.size * self.entry_price
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.size * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.size * (price - self.entry_price)
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        match self.stop_loss {
            Some(stop) => price <= stop,
            None => false,
        }
    }
}

/// A closed round trip. Commission covers both legs and `profit` is net of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub side: Side,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub size: f64,
    pub commission: f64,
    pub profit: f64,
    pub profit_pct: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn duration(&self) -> TimeDelta {
        self.exit_time - self.entry_time
    }

    pub fn is_win(&self) -> bool {
        self.profit > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn sample_position() -> Position {
        Position {
            symbol: "BTC/USDT".into(),
            size: 2.0,
            entry_price: 50.0,
            entry_time: at(15, 0),
            entry_commission: 0.1,
            stop_loss: Some(45.0),
        }
    }

    #[test]
    fn valuation() {
        let pos = sample_position();
        assert!((pos.entry_notional() - 100.0).abs() < f64::EPSILON);
        assert!((pos.market_value(55.0) - 110.0).abs() < f64::EPSILON);
        assert!((pos.unrealized_pnl(45.0) - (-10.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn stop_loss_triggered_at_or_below() {
        let pos = sample_position();
        assert!(pos.should_stop_loss(44.0));
        assert!(pos.should_stop_loss(45.0));
        assert!(!pos.should_stop_loss(46.0));
    }

    #[test]
    fn stop_loss_disabled() {
        let mut pos = sample_position();
        pos.stop_loss = None;
        assert!(!pos.should_stop_loss(0.0));
    }

    #[test]
    fn trade_duration_and_serialisation() {
        let trade = Trade {
            symbol: "BTC/USDT".into(),
            side: Side::Buy,
            entry_time: at(1, 0),
            entry_price: 100.0,
            exit_time: at(3, 3),
            exit_price: 110.0,
            size: 1.0,
            commission: 0.21,
            profit: 9.79,
            profit_pct: 0.0979,
            exit_reason: ExitReason::StopLoss,
        };
        assert_eq!(trade.duration(), TimeDelta::hours(51));
        assert!(trade.is_win());
        let json = serde_json::to_value(&trade).unwrap();
        assert_eq!(json["side"], "buy");
        assert_eq!(json["exit_reason"], "stop_loss");
    }
}
