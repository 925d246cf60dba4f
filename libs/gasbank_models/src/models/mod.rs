//! Row types for the gas bank tables and their conversion to ledger types.
//!
//! Amounts are stored as BIGINT counts of the smallest token unit
//! (10^8 per token).

pub mod accounts;
pub mod approvals;
pub mod dead_letters;
pub mod schedules;
pub mod settlement_attempts;
pub mod transactions;

use std::str::FromStr;

use gasbank::types::ParseEnumError;
use gasbank::{StoreError, StoreResult};
use rust_decimal::Decimal;

pub const AMOUNT_SCALE: u32 = 8;

/// Fails instead of rounding when `amount` is finer than one smallest unit.
pub fn to_units(amount: Decimal) -> StoreResult<i64> {
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(StoreError::backend(format!(
            "amount {amount} has more than {AMOUNT_SCALE} decimal places"
        )));
    }
    let mut scaled = amount;
    scaled.rescale(AMOUNT_SCALE);
    if scaled.scale() != AMOUNT_SCALE {
        return Err(StoreError::backend(format!("amount {amount} out of range")));
    }
    i64::try_from(scaled.mantissa())
        .map_err(|_| StoreError::backend(format!("amount {amount} out of range")))
}

pub fn from_units(units: i64) -> Decimal {
    Decimal::new(units, AMOUNT_SCALE)
}

pub(crate) fn to_count(value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::backend(format!("count {value} out of range")))
}

pub(crate) fn from_count(value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::backend(format!("negative count {value} in row")))
}

pub(crate) fn parse_column<T>(value: &str) -> StoreResult<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    value.parse().map_err(|err: ParseEnumError| StoreError::backend(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn amounts_convert_to_smallest_units() {
        assert_eq!(to_units(dec!(1)).unwrap(), 100_000_000);
        assert_eq!(to_units(dec!(0.00000001)).unwrap(), 1);
        assert_eq!(to_units(dec!(12.5)).unwrap(), 1_250_000_000);
        assert_eq!(from_units(1_250_000_000), dec!(12.5));
        assert_eq!(from_units(to_units(dec!(3.14159265)).unwrap()), dec!(3.14159265));
    }

    #[test]
    fn sub_unit_amounts_are_not_rounded() {
        assert!(to_units(dec!(0.000000001)).is_err());
        assert!(to_units(dec!(1.123456789)).is_err());
        assert_eq!(to_units(dec!(1.1234567800)).unwrap(), 112_345_678);
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        assert!(to_units(Decimal::MAX).is_err());
        assert!(from_count(-1).is_err());
    }
}
