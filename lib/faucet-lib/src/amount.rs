use crate::ValidationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Number of decimal places the ledger accepts for transfers.
pub const DECIMALS: u32 = 3;

/// Hard upper bound for a single claim, whatever the tier.
pub const MAX_CLAIM: Amount = Amount::milli(10);

/// A positive token amount with at most [`DECIMALS`] decimal places.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// `n` thousandths of a token.
    pub const fn milli(n: u32) -> Self {
        Self(Decimal::from_parts(n, 0, 0, false, DECIMALS))
    }

    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount);
        }
        let value = value.normalize();
        if value.scale() > DECIMALS {
            return Err(ValidationError::TooPrecise { max: DECIMALS });
        }
        Ok(Self(value))
    }

    /// Validates a requested claim amount, including the global maximum.
    pub fn for_claim(value: Decimal) -> Result<Self, ValidationError> {
        let amount = Self::new(value)?;
        if amount > MAX_CLAIM {
            return Err(ValidationError::AboveMaximum {
                amount: amount.to_string(),
                max: MAX_CLAIM.to_string(),
            });
        }
        Ok(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Ledger asset notation, e.g. `0.002 STEEM`.
    pub fn to_asset_string(&self, symbol: &str) -> String {
        format!("{:.3} {}", self.0, symbol)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|error| ValidationError::InvalidAmount(error.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.normalize(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("0.002".parse::<Amount>().unwrap(), Amount::milli(2));
        assert_eq!("0.0020".parse::<Amount>().unwrap(), Amount::milli(2));
        assert_eq!(
            "0.0025".parse::<Amount>(),
            Err(ValidationError::TooPrecise { max: 3 })
        );
        assert_eq!("0".parse::<Amount>(), Err(ValidationError::NonPositiveAmount));
        assert_eq!(
            "-0.001".parse::<Amount>(),
            Err(ValidationError::NonPositiveAmount)
        );
        assert!(matches!(
            "abc".parse::<Amount>(),
            Err(ValidationError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_claim_maximum() {
        assert!(Amount::for_claim(Decimal::new(10, 3)).is_ok());
        assert!(matches!(
            Amount::for_claim(Decimal::new(11, 3)),
            Err(ValidationError::AboveMaximum { .. })
        ));
    }

    #[test]
    fn test_json() {
        let a: Amount = serde_json::from_str("0.002").unwrap();
        assert_eq!(a, Amount::milli(2));
        let a: Amount = serde_json::from_str(r#""0.005""#).unwrap();
        assert_eq!(a, Amount::milli(5));
        assert_eq!(serde_json::to_string(&a).unwrap(), r#""0.005""#);
    }

    #[test]
    fn test_asset_string() {
        assert_eq!(Amount::milli(2).to_asset_string("STEEM"), "0.002 STEEM");
        assert_eq!(Amount::milli(10).to_asset_string("STEEM"), "0.010 STEEM");
    }
}
