//! Exact currency arithmetic and presentation rounding.
//!
//! Amounts are kept as [Decimal] from the moment they are read from the store
//! so that sums of values with two decimal places never drift. Rounding only
//! happens when a value leaves the crate in a view model.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

/// The number of decimal places shown for currency values.
pub const CURRENCY_DECIMAL_PLACES: u32 = 2;

/// Round `amount` to two decimal places, with ties rounded away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(
        CURRENCY_DECIMAL_PLACES,
        RoundingStrategy::MidpointAwayFromZero,
    )
}

/// Parse an amount from the textual form the store uses for numeric columns.
///
/// Returns `None` if `text` is not a plain decimal number. Scientific notation
/// is accepted since JSON encoders may emit very small or large floats that way.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let text = text.trim();

    if text.is_empty() {
        return None;
    }

    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Parse an amount from a JSON value, accepting both numbers and strings.
pub fn amount_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(number) => parse_amount(&number.to_string()),
        serde_json::Value::String(text) => parse_amount(text),
        _ => None,
    }
}

/// A currency value rounded for display.
///
/// Serializes as a string with exactly two decimal places, e.g. `"333.33"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    /// The rounded value.
    pub fn value(self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        let mut rounded = round_currency(amount);
        rounded.rescale(CURRENCY_DECIMAL_PLACES);
        Self(rounded)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::{Money, amount_from_json, parse_amount, round_currency};

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_currency(dec!(0.125)), dec!(0.13));
        assert_eq!(round_currency(dec!(0.124)), dec!(0.12));
        assert_eq!(round_currency(dec!(-0.125)), dec!(-0.13));
        assert_eq!(round_currency(dec!(1000) / dec!(3)), dec!(333.33));
    }

    #[test]
    fn sums_do_not_drift() {
        let total: Decimal = std::iter::repeat_n(dec!(0.10), 10).sum();

        assert_eq!(total, dec!(1.00));
    }

    #[test]
    fn parses_plain_and_scientific_amounts() {
        assert_eq!(parse_amount("-1000"), Some(dec!(-1000)));
        assert_eq!(parse_amount(" 12.50 "), Some(dec!(12.50)));
        assert_eq!(parse_amount("1e3"), Some(dec!(1000)));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn parses_json_numbers_without_float_noise() {
        assert_eq!(amount_from_json(&json!(1000.1)), Some(dec!(1000.1)));
        assert_eq!(amount_from_json(&json!(-3)), Some(dec!(-3)));
        assert_eq!(amount_from_json(&json!("42.42")), Some(dec!(42.42)));
        assert_eq!(amount_from_json(&json!(null)), None);
    }

    #[test]
    fn money_serializes_with_two_decimal_places() {
        let money = Money::from(dec!(1000) / dec!(3));

        assert_eq!(serde_json::to_string(&money).unwrap(), "\"333.33\"");
        assert_eq!(
            serde_json::to_string(&Money::from(dec!(5))).unwrap(),
            "\"5.00\""
        );
    }
}
