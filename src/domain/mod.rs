//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod strategy;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod metrics;
pub mod result;
pub mod backtest;
pub mod optimizer;
pub mod walk_forward;
pub mod error;
