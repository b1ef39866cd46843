//! backtester: single-instrument trading strategy backtester.
//!
//! Replays OHLCV candles against a [`domain::strategy::Strategy`], scores the
//! run with a metric report, grid-searches parameters and validates them
//! walk-forward.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
