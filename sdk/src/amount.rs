use derive_more::{Display, From, Into};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use thiserror::Error;

/// USDC and most bridged stablecoins.
pub const USDC_DECIMALS: u8 = 6;

/// Highest `decimals` value for which `10^decimals` fits into a `u128`.
const MAX_DECIMALS: u8 = 38;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("`{0}` is not a decimal number")]
    Malformed(String),
    #[error("`{value}` has more than {decimals} fractional digits")]
    TooPrecise { value: String, decimals: u8 },
    #[error("amount does not fit into 128 bits")]
    Overflow,
    #[error("{0} decimals are not supported")]
    UnsupportedDecimals(u8),
}

/// A token amount in base units (e.g. `100000` is 0.1 USDC). Always exact.
///
/// Serialized as a decimal string, which is how the backend exchanges amounts.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, From, Into)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub const fn new(base_units: u128) -> Self {
        Self(base_units)
    }

    pub fn base_units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parses a human readable amount such as `"0.1"` into base units.
    pub fn from_decimal_str(value: &str, decimals: u8) -> Result<Self, AmountError> {
        let scale = scale(decimals)?;
        let (whole, fraction) = match value.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (value, ""),
        };
        let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
            return Err(AmountError::Malformed(value.to_string()));
        }
        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > usize::from(decimals) {
            return Err(AmountError::TooPrecise {
                value: value.to_string(),
                decimals,
            });
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole.parse::<u128>().map_err(|_| AmountError::Overflow)?
        };
        let fraction_units = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<width$}", width = usize::from(decimals));
            padded.parse::<u128>().map_err(|_| AmountError::Overflow)?
        };

        whole_units
            .checked_mul(scale)
            .and_then(|units| units.checked_add(fraction_units))
            .map(TokenAmount)
            .ok_or(AmountError::Overflow)
    }

    /// Formats the amount in whole token units without trailing zeros, e.g. `"0.1"`.
    pub fn to_decimal_string(&self, decimals: u8) -> Result<String, AmountError> {
        let scale = scale(decimals)?;
        let whole = self.0 / scale;
        let fraction = self.0 % scale;
        if fraction == 0 {
            return Ok(whole.to_string());
        }
        let fraction = format!("{fraction:0>width$}", width = usize::from(decimals));
        Ok(format!("{whole}.{}", fraction.trim_end_matches('0')))
    }

    pub fn checked_add(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(other.0).map(TokenAmount)
    }
}

fn scale(decimals: u8) -> Result<u128, AmountError> {
    if decimals > MAX_DECIMALS {
        return Err(AmountError::UnsupportedDecimals(decimals));
    }
    Ok(10u128.pow(u32::from(decimals)))
}

impl FromStr for TokenAmount {
    type Err = AmountError;

    /// Parses base units, e.g. `"100000"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(AmountError::Malformed(s.to_string()));
        }
        s.parse::<u128>()
            .map(TokenAmount)
            .map_err(|_| AmountError::Overflow)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Repr::Number(number) => Ok(TokenAmount(u128::from(number))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_usdc_base_units_format_exactly() {
        let amount: TokenAmount = "100000".parse().unwrap();
        assert_eq!(amount.to_decimal_string(USDC_DECIMALS).unwrap(), "0.1");
        assert_eq!(
            amount,
            TokenAmount::from_decimal_str("0.1", USDC_DECIMALS).unwrap()
        );
    }

    #[rstest]
    #[case("1", 6, 1_000_000)]
    #[case("1.5", 6, 1_500_000)]
    #[case(".25", 2, 25)]
    #[case("0.000001", 6, 1)]
    #[case("12.340000", 6, 12_340_000)]
    #[case("1", 18, 1_000_000_000_000_000_000)]
    fn test_from_decimal_str(#[case] input: &str, #[case] decimals: u8, #[case] expected: u128) {
        assert_eq!(
            TokenAmount::from_decimal_str(input, decimals).unwrap(),
            TokenAmount::new(expected)
        );
    }

    #[rstest]
    #[case(1_000_000, 6, "1")]
    #[case(1_500_000, 6, "1.5")]
    #[case(1, 6, "0.000001")]
    #[case(0, 6, "0")]
    #[case(42, 0, "42")]
    fn test_to_decimal_string(#[case] units: u128, #[case] decimals: u8, #[case] expected: &str) {
        assert_eq!(
            TokenAmount::new(units).to_decimal_string(decimals).unwrap(),
            expected
        );
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("1.2.3")]
    #[case("-1")]
    #[case("1e6")]
    fn test_malformed_decimal(#[case] input: &str) {
        assert!(matches!(
            TokenAmount::from_decimal_str(input, 6),
            Err(AmountError::Malformed(_))
        ));
    }

    #[test]
    fn test_too_precise() {
        assert_eq!(
            TokenAmount::from_decimal_str("0.0000001", 6),
            Err(AmountError::TooPrecise {
                value: "0.0000001".to_string(),
                decimals: 6
            })
        );
    }

    #[test]
    fn test_serde_accepts_string_and_number() {
        let from_string: TokenAmount = serde_json::from_str("\"100000\"").unwrap();
        let from_number: TokenAmount = serde_json::from_str("100000").unwrap();
        assert_eq!(from_string, from_number);
        assert_eq!(serde_json::to_string(&from_string).unwrap(), "\"100000\"");
    }
}
