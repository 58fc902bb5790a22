//! Money display helpers.
//!
//! Cart amounts travel as `rust_decimal::Decimal` so the client never loses
//! precision on values the server computed. Formatting is presentation only.

use rust_decimal::{Decimal, RoundingStrategy};

/// Format a decimal amount as a dollar price string (e.g. `$19.99`).
///
/// # Example
///
/// ```rust
/// use rust_decimal::Decimal;
/// use shopfront_core::format_money;
///
/// assert_eq!(format_money(Decimal::new(1999, 2)), "$19.99");
/// assert_eq!(format_money(Decimal::ZERO), "$0.00");
/// ```
#[must_use]
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}
