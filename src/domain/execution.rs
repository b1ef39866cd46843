//! Fill simulation: commissions, long entry and exit.
//!
//! Fills happen at the candle close. Commission is a flat percentage of the
//! notional, charged independently on each leg.

use chrono::NaiveDateTime;

use super::portfolio::SimulationState;
use super::position::{ExitReason, Position, Side, Trade};

/// Commission for one leg: `notional * pct / 100`.
pub fn calculate_commission(notional: f64, commission_pct: f64) -> f64 {
    notional * commission_pct / 100.0
}

/// Result of an entry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryResult {
    Entered {
        size: f64,
        price: f64,
        notional: f64,
        commission: f64,
    },
    /// Nothing to invest (no cash or a zero risk fraction).
    Skipped,
}

/// Open a long position with `cash * fraction` at `price`.
///
/// `fraction` is clamped to `[0, 1]`. Cash is debited by the notional plus
/// the entry commission, so a fully invested entry leaves cash at minus the
/// commission.
pub fn enter_long(
    state: &mut SimulationState,
    symbol: &str,
    price: f64,
    time: NaiveDateTime,
    fraction: f64,
    commission_pct: f64,
) -> EntryResult {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let budget = state.cash * fraction;
    if budget <= 0.0 || state.position.is_some() {
        return EntryResult::Skipped;
    }

    let size = budget / price;
    let notional = size * price;
    let commission = calculate_commission(notional, commission_pct);
    state.cash -= notional + commission;

    state.position = Some(Position {
        symbol: symbol.to_string(),
        size,
        entry_price: price,
        entry_time: time,
        entry_commission: commission,
        stop_loss: None,
    });

    EntryResult::Entered {
        size,
        price,
        notional,
        commission,
    }
}

/// Close the open position at `price` and record the trade.
///
/// Returns `None` when flat.
pub fn exit_long(
    state: &mut SimulationState,
    price: f64,
    time: NaiveDateTime,
    reason: ExitReason,
    commission_pct: f64,
) -> Option<Trade> {
    let position = state.position.take()?;

    let entry_notional = position.entry_notional();
    let exit_notional = position.size * price;
    let exit_commission = calculate_commission(exit_notional, commission_pct);
    state.cash += exit_notional - exit_commission;

    let profit = exit_notional - entry_notional - position.entry_commission - exit_commission;
    let profit_pct = if entry_notional > 0.0 {
        profit / entry_notional
    } else {
        0.0
    };

    let trade = Trade {
        symbol: position.symbol,
        side: Side::Buy,
        entry_time: position.entry_time,
        entry_price: position.entry_price,
        exit_time: time,
        exit_price: price,
        size: position.size,
        commission: position.entry_commission + exit_commission,
        profit,
        profit_pct,
        exit_reason: reason,
    };
    state.record_trade(trade.clone());
    Some(trade)
}
