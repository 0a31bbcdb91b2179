//! Money lives in the store as integer cents and crosses the API boundary as
//! a two-place `Decimal`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{ServiceError, ServiceResult};

/// Lowest accepted menu price (2.00).
pub const MIN_PRICE_CENTS: i64 = 200;

pub fn to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Converts a client-supplied amount to cents, rejecting sub-cent precision.
pub fn to_cents(field: &'static str, value: Decimal) -> ServiceResult<i64> {
    if value.normalize().scale() > 2 {
        return Err(ServiceError::invalid(
            field,
            "must have at most 2 decimal places",
        ));
    }
    value
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.trunc().to_i64())
        .ok_or_else(|| ServiceError::invalid(field, "amount is out of range"))
}

pub fn line_total(unit_price_cents: i64, quantity: i32) -> ServiceResult<i64> {
    unit_price_cents
        .checked_mul(i64::from(quantity))
        .ok_or_else(|| ServiceError::invalid("quantity", "line total is out of range"))
}

pub fn sum_cents<I>(values: I) -> ServiceResult<i64>
where
    I: IntoIterator<Item = i64>,
{
    values
        .into_iter()
        .try_fold(0i64, |acc, value| acc.checked_add(value))
        .ok_or_else(|| ServiceError::invalid("total", "total is out of range"))
}

/// Price including the flat 10% tax, rounded half away from zero.
pub fn after_tax(cents: i64) -> Decimal {
    (to_decimal(cents) * Decimal::new(110, 2))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn cents_render_with_two_places() {
        assert_eq!(to_decimal(3000).to_string(), "30.00");
        assert_eq!(to_decimal(205).to_string(), "2.05");
    }

    #[test]
    fn to_cents_accepts_whole_and_two_place_amounts() {
        assert_eq!(to_cents("price", dec("10")).unwrap(), 1000);
        assert_eq!(to_cents("price", dec("10.5")).unwrap(), 1050);
        assert_eq!(to_cents("price", dec("10.500")).unwrap(), 1050);
    }

    #[test]
    fn to_cents_rejects_sub_cent_precision() {
        let err = to_cents("price", dec("1.005")).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { field: "price", .. }));
    }

    #[test]
    fn after_tax_rounds_to_cents() {
        assert_eq!(after_tax(1000).to_string(), "11.00");
        assert_eq!(after_tax(255).to_string(), "2.81");
    }

    #[test]
    fn totals_are_checked() {
        assert_eq!(line_total(1000, 3).unwrap(), 3000);
        assert!(line_total(i64::MAX, 2).is_err());
        assert_eq!(sum_cents([100, 250, 3000]).unwrap(), 3350);
        assert!(sum_cents([i64::MAX, 1]).is_err());
    }
}
