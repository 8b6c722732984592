use thiserror::Error as ThisError;

/// Malformed input, rejected before any state is read.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("amount has more than {max} decimal places")]
    TooPrecise { max: u32 },
    #[error("amount {amount} is above the maximum of {max}")]
    AboveMaximum { amount: String, max: String },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid account name {name:?}: {reason}")]
    InvalidAccountName { name: String, reason: &'static str },
    #[error("no account name given and none linked")]
    MissingAccountName,
}
