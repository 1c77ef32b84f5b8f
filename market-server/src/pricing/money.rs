//! Money helpers
//!
//! All amounts are `Decimal`; anything derived by multiplication is rounded
//! to 2 decimal places, half away from zero.

use rust_decimal::prelude::*;

const DECIMAL_PLACES: u32 = 2;

/// Round to 2 decimal places (half-up)
#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// `unit × quantity`, rounded
#[inline]
pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

/// `amount × percent / 100`, rounded
#[inline]
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}
