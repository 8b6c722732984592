use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const MIN_LENGTH: usize = 3;
pub const MAX_LENGTH: usize = 16;

/// Name of an account on the token ledger.
///
/// Follows the Steem naming rules: 3 to 16 characters, made of dot separated
/// segments. Each segment is at least 3 characters long, starts with a
/// lowercase letter, ends with a letter or digit and otherwise contains only
/// lowercase letters, digits and hyphens.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName(String);

fn invalid(name: &str, reason: &'static str) -> ValidationError {
    ValidationError::InvalidAccountName {
        name: name.to_owned(),
        reason,
    }
}

fn check_segment(name: &str, segment: &str) -> Result<(), ValidationError> {
    let bytes = segment.as_bytes();
    if bytes.len() < MIN_LENGTH {
        return Err(invalid(name, "segment is shorter than 3 characters"));
    }
    if !bytes[0].is_ascii_lowercase() {
        return Err(invalid(name, "segment must start with a lowercase letter"));
    }
    let last = bytes[bytes.len() - 1];
    if !(last.is_ascii_lowercase() || last.is_ascii_digit()) {
        return Err(invalid(name, "segment must end with a letter or digit"));
    }
    if !bytes
        .iter()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'-')
    {
        return Err(invalid(name, "only lowercase letters, digits and '-' are allowed"));
    }
    Ok(())
}

impl AccountName {
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.len() < MIN_LENGTH {
            return Err(invalid(name, "too short"));
        }
        if name.len() > MAX_LENGTH {
            return Err(invalid(name, "too long"));
        }
        for segment in name.split('.') {
            check_segment(name, segment)?;
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccountName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AccountName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<AccountName> for String {
    fn from(value: AccountName) -> Self {
        value.0
    }
}

impl AsRef<str> for AccountName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["abc", "faucet.cur8", "steem-user1", "a1b.c-d.efg"] {
            assert_eq!(AccountName::new(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in [
            "ab",
            "thisnameiswaytoolong",
            "1abc",
            "abc-",
            "ab.cde",
            "Alice",
            "abc..def",
            "abc_def",
        ] {
            assert!(AccountName::new(name).is_err(), "{name} should be invalid");
        }
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<AccountName>(r#""faucet.cur8""#).is_ok());
        assert!(serde_json::from_str::<AccountName>(r#""NOPE""#).is_err());
    }
}
