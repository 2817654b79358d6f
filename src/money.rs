//! Decimal arithmetic shared by the fiscal calculations.
//!
//! Amounts are stored in SQLite as text so that no precision is lost to
//! floating point conversion.

use std::str::FromStr;

use rusqlite::{Row, types::Type};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// The VAT rate applied once an owner becomes subject to VAT, as a percentage.
pub const STANDARD_VAT_RATE: Decimal = dec!(20);

/// `rate` percent of `amount`, unrounded.
pub fn percent_of(amount: Decimal, rate: Decimal) -> Decimal {
    amount * rate / dec!(100)
}

/// Round to the nearest cent, halves away from zero.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// The VAT due on a tax-exclusive `amount`.
pub fn vat_amount(amount: Decimal, vat_rate: Decimal) -> Decimal {
    round_cents(percent_of(amount, vat_rate))
}

/// Convert an amount that was collected tax-inclusive at the standard rate
/// into its tax-exclusive part.
pub fn exclude_standard_vat(amount_including_vat: Decimal) -> Decimal {
    round_cents(amount_including_vat / (Decimal::ONE + percent_of(Decimal::ONE, STANDARD_VAT_RATE)))
}

/// Read a decimal stored as text from column `index` of `row`.
pub fn read_decimal(row: &Row, index: usize) -> Result<Decimal, rusqlite::Error> {
    let text: String = row.get(index)?;

    Decimal::from_str(&text).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
    })
}

/// Read a nullable decimal stored as text from column `index` of `row`.
pub fn read_optional_decimal(row: &Row, index: usize) -> Result<Option<Decimal>, rusqlite::Error> {
    let text: Option<String> = row.get(index)?;

    text.map(|text| {
        Decimal::from_str(&text).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::{exclude_standard_vat, round_cents, vat_amount};

    #[test]
    fn excludes_vat_from_tax_inclusive_amount() {
        assert_eq!(exclude_standard_vat(dec!(120)), dec!(100));
        assert_eq!(exclude_standard_vat(dec!(100)), dec!(83.33));
    }

    #[test]
    fn vat_amount_is_rounded_to_cents() {
        assert_eq!(vat_amount(dec!(100), dec!(20)), dec!(20));
        assert_eq!(vat_amount(dec!(10.05), dec!(5.5)), dec!(0.55));
    }

    #[test]
    fn rounds_halves_away_from_zero() {
        assert_eq!(round_cents(dec!(0.125)), dec!(0.13));
        assert_eq!(round_cents(dec!(-0.125)), dec!(-0.13));
    }
}
