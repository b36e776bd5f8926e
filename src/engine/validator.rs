// =============================================================================
// Alignment Validator — is this trade consistent with its bar series?
// =============================================================================
//
// A pure function of (trade, bar table, tolerances). It judges two things
// per leg: how far the execution timestamp sits from the bar that was
// active at the time, and whether the execution price is plausible against
// that bar's range. Verdicts are diagnostic flags, never errors — even an
// empty table only means every trade gets flagged.

use crate::engine::bar_table::BarTable;
use crate::engine::trade_mapper::Trade;
use crate::types::DiagnosticFlag;

/// Skew tolerance when the table has too few bars to infer an interval:
/// zero, so anything not exactly on a bar is surfaced.
const FALLBACK_MAX_SKEW_SECS: i64 = 0;

/// Default skew tolerance for `table`: half the inferred bar interval
/// (median delta between consecutive bar times). Computed from the data,
/// never hard-coded, since datasets use different bar intervals.
pub fn default_max_skew(table: &BarTable) -> i64 {
    table
        .median_interval()
        .map(|interval| interval / 2)
        .unwrap_or(FALLBACK_MAX_SKEW_SECS)
}

/// Validate one trade against the bar table.
///
/// Returns an order-stable, duplicate-free flag set. Checks are kind-level,
/// not leg-level: if both legs skew, `TIME_SKEW` still appears once.
pub fn validate(
    trade: &Trade,
    table: &BarTable,
    max_skew_secs: i64,
    price_epsilon: f64,
) -> Vec<DiagnosticFlag> {
    let entry = check_leg(trade.entry_time, trade.entry_price, table, max_skew_secs, price_epsilon);
    let exit = check_leg(trade.exit_time, trade.exit_price, table, max_skew_secs, price_epsilon);

    let mut flags = Vec::with_capacity(2);
    if entry.skewed || exit.skewed {
        flags.push(DiagnosticFlag::TimeSkew);
    }
    if entry.price_out || exit.price_out {
        flags.push(DiagnosticFlag::PriceOutOfRange);
    }
    flags
}

struct LegVerdict {
    skewed: bool,
    price_out: bool,
}

fn check_leg(
    time: i64,
    price: f64,
    table: &BarTable,
    max_skew_secs: i64,
    price_epsilon: f64,
) -> LegVerdict {
    match table.nearest_bar(time) {
        Some(bar) => LegVerdict {
            skewed: (time - bar.time).abs() > max_skew_secs,
            price_out: price < bar.low - price_epsilon || price > bar.high + price_epsilon,
        },
        // No bars to validate against is itself a data-quality signal.
        None => LegVerdict {
            skewed: true,
            price_out: true,
        },
    }
}
