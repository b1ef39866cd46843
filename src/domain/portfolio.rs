//! Simulation state and equity tracking.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::position::{Position, Trade};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Mutable state of one simulation run. Owned by a single call to
/// `simulate` and dropped when it returns.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub cash: f64,
    pub initial_capital: f64,
    pub position: Option<Position>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl SimulationState {
    pub fn new(initial_capital: f64) -> Self {
        SimulationState {
            cash: initial_capital,
            initial_capital,
            position: None,
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Cash plus the mark-to-market value of the open position.
    pub fn equity(&self, price: f64) -> f64 {
        let position_value = self
            .position
            .as_ref()
            .map(|pos| pos.market_value(price))
            .unwrap_or(0.0);
        self.cash + position_value
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, price: f64) {
        let equity = self.equity(price);
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }
}
