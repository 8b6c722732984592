use faucet_lib::{ClaimId, Denial, LedgerError, ValidationError};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum ClaimError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("claim denied: {0}")]
    Denied(#[from] Denial),
    #[error("lost a race with another request: {0}")]
    Conflict(&'static str),
    #[error("ledger unavailable: {0}")]
    ExternalUnavailable(#[from] LedgerError),
    #[error("claim not found: {0}")]
    NotFound(ClaimId),
    #[error("inconsistent state: {0}")]
    FatalState(String),
    #[error(transparent)]
    Store(db::Error),
}

impl From<db::Error<Denial>> for ClaimError {
    fn from(error: db::Error<Denial>) -> Self {
        match error {
            db::Error::LogicError(denial) => ClaimError::Denied(denial),
            other => other.map_logic(anyhow::Error::new).into(),
        }
    }
}

impl From<db::Error> for ClaimError {
    fn from(error: db::Error) -> Self {
        match error {
            db::Error::Conflict { context } => ClaimError::Conflict(context),
            db::Error::ResourceNotFound { .. } => {
                tracing::error!("{}", error);
                ClaimError::FatalState(error.to_string())
            }
            error => ClaimError::Store(error),
        }
    }
}
