use actix_web::{
    HttpResponse, ResponseError,
    http::{StatusCode, header},
};
use faucet::ClaimError;
use serde::Serialize;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error("{}", msg)]
    Custom { status: StatusCode, msg: String },
}

impl Error {
    pub fn custom<T: std::fmt::Display>(status: StatusCode, msg: T) -> Self {
        Error::Custom {
            status,
            msg: msg.to_string(),
        }
    }

    fn reason(&self) -> Option<&'static str> {
        match self {
            Error::Claim(e) => Some(match e {
                ClaimError::Unauthenticated => "unauthenticated",
                ClaimError::Validation(_) => "validation",
                ClaimError::Denied(denial) => denial.reason(),
                ClaimError::Conflict(_) => "conflict",
                ClaimError::ExternalUnavailable(_) => "external_unavailable",
                ClaimError::NotFound(_) => "not_found",
                ClaimError::FatalState(_) | ClaimError::Store(_) => "internal",
            }),
            Error::Custom { .. } => None,
        }
    }

    fn remaining_secs(&self) -> Option<u64> {
        match self {
            Error::Claim(ClaimError::Denied(denial)) => denial.remaining_secs(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
}

impl ErrorBody {
    pub fn build<E: ResponseError>(e: &E) -> HttpResponse {
        HttpResponse::build(e.status_code()).json(ErrorBody {
            error: e.to_string(),
            reason: None,
            remaining_secs: None,
        })
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Claim(e) => match e {
                ClaimError::Unauthenticated => StatusCode::UNAUTHORIZED,
                ClaimError::Validation(_) => StatusCode::BAD_REQUEST,
                ClaimError::Denied(denial) if denial.remaining_secs().is_some() => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                ClaimError::Denied(_) => StatusCode::FORBIDDEN,
                ClaimError::Conflict(_) => StatusCode::CONFLICT,
                ClaimError::ExternalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ClaimError::NotFound(_) => StatusCode::NOT_FOUND,
                ClaimError::FatalState(_) | ClaimError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Error::Custom { status, .. } => *status,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        let remaining_secs = self.remaining_secs();
        let mut resp = HttpResponse::build(status);
        if let Some(secs) = remaining_secs {
            resp.insert_header((header::RETRY_AFTER, secs));
        }
        resp.json(ErrorBody {
            error: self.to_string(),
            reason: self.reason(),
            remaining_secs,
        })
    }
}

#[derive(ThisError, Debug)]
#[error("invalid admin key")]
pub struct AdminKey;

impl ResponseError for AdminKey {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        ErrorBody::build(self)
    }
}
