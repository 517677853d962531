//! Plain-text rendering of the targets report.

use rust_decimal::Decimal;
use std::fmt::Write;

use crate::types::TargetDelta;

/// Render target deltas as a fixed-width table.
///
/// A positive delta is the USD needed to reach target; a negative one is
/// the amount by which a symbol is overweight.
pub fn format_targets_table(deltas: &[TargetDelta]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<8} {:>8} {:>14} {:>14} {:>14}",
        "SYMBOL", "WEIGHT", "CURRENT", "TARGET", "DELTA"
    );

    for d in deltas {
        let _ = writeln!(
            out,
            "{:<8} {:>7.2}% {:>14} {:>14} {:>14}",
            d.symbol.as_str(),
            d.weight * Decimal::ONE_HUNDRED,
            usd(d.current_value_usd),
            usd(d.target_value_usd),
            signed_usd(d.delta_usd),
        );
    }

    let current: Decimal = deltas.iter().map(|d| d.current_value_usd).sum();
    let _ = writeln!(
        out,
        "{:<8} {:>8} {:>14} {:>14} {:>14}",
        "TOTAL",
        "",
        usd(current),
        usd(deltas.iter().map(|d| d.target_value_usd).sum()),
        ""
    );
    out
}

fn usd(amount: Decimal) -> String {
    format!("${:.2}", amount)
}

fn signed_usd(amount: Decimal) -> String {
    if amount.is_sign_negative() && !amount.is_zero() {
        format!("-${:.2}", amount.abs())
    } else {
        format!("+${:.2}", amount)
    }
}
