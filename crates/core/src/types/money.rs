//! Money helpers over [`rust_decimal::Decimal`].
//!
//! The shop service prices everything in a single currency and sends amounts
//! as JSON decimals. Amounts stay `Decimal` end to end so `9.99` is never
//! rounded through a float.

use rust_decimal::{Decimal, RoundingStrategy};

/// Price of `quantity` units at `unit_price`.
#[must_use]
pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Format an amount for display (e.g., `$19.99`).
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}
