//! Fixed two-decimal money helpers.
//!
//! Amounts travel through the service as [`Decimal`] and are persisted as
//! integer cents, so every sum is computed exactly.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round to two decimal places, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert an amount to integer cents after rounding. `None` on overflow.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    round_money(amount)
        .checked_mul(Decimal::ONE_HUNDRED)?
        .to_i64()
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// `part / whole` rounded to four decimals, `None` when `whole` is zero.
pub fn ratio(part_cents: i64, whole_cents: i64) -> Option<Decimal> {
    if whole_cents == 0 {
        return None;
    }
    Decimal::from(part_cents)
        .checked_div(Decimal::from(whole_cents))
        .map(|value| value.round_dp(4))
}

/// True when `part / whole >= threshold`, compared exactly in cents.
/// Always false when `whole` is not positive.
pub fn reaches(part_cents: i64, whole_cents: i64, threshold: Decimal) -> bool {
    whole_cents > 0
        && threshold
            .checked_mul(Decimal::from(whole_cents))
            .is_some_and(|limit| Decimal::from(part_cents) >= limit)
}
