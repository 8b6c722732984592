//! Bearer token verification.
//!
//! Access tokens are HS256 JWTs issued by the identity provider. Only the
//! `sub` claim is trusted as the user id; `role` decides whether the session
//! counts as authenticated.

use crate::error::ErrorBody;
use actix_web::{
    FromRequest, HttpRequest, HttpResponse, ResponseError,
    http::{
        StatusCode,
        header::{AUTHORIZATION, HeaderName},
    },
    web::{self, ServiceConfig},
};
use chrono::Utc;
use faucet_lib::{Session, UserId};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::{
    future::{Ready, ready},
    ops::Deref,
};
use thiserror::Error as ThisError;

const AUTHENTICATED_ROLE: &str = "authenticated";

fn rsplit(b: &[u8]) -> Option<(&[u8], &[u8])> {
    let dot = b.iter().rposition(|c| *c == b'.')?;
    Some((&b[..dot], &b[dot + 1..]))
}

#[derive(Deserialize)]
struct Payload {
    exp: i64,
    sub: UserId,
    #[serde(default)]
    role: Option<String>,
}

#[derive(ThisError, Debug)]
#[error("unauthenticated")]
pub enum AuthError {
    NotConfigured,
    NoHeader(HeaderName),
    InvalidFormat,
    HmacFailed,
    InvalidPayload,
    Expired,
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AuthError::NotConfigured = self {
            tracing::error!("request needs a session but jwt_key is not configured");
        }
        ErrorBody::build(self)
    }
}

/// Verifies an `Authorization` header value.
pub fn verify_jwt(hmac: &Hmac<Sha256>, http_header: &[u8], now: i64) -> Result<Session, AuthError> {
    let token = http_header
        .strip_prefix(b"Bearer ")
        .ok_or(AuthError::InvalidFormat)?;
    let (header_payload, signature) = rsplit(token).ok_or(AuthError::InvalidFormat)?;
    let (_, payload) = rsplit(header_payload).ok_or(AuthError::InvalidFormat)?;

    let signature = base64::decode_config(signature, base64::URL_SAFE_NO_PAD)
        .map_err(|_| AuthError::InvalidFormat)?;
    let mut hmac = hmac.clone();
    hmac.update(header_payload);
    hmac.verify_slice(&signature)
        .map_err(|_| AuthError::HmacFailed)?;

    let bytes = base64::decode_config(payload, base64::URL_SAFE_NO_PAD)
        .map_err(|_| AuthError::InvalidPayload)?;
    let payload =
        serde_json::from_slice::<Payload>(&bytes).map_err(|_| AuthError::InvalidPayload)?;
    if payload.exp <= now {
        return Err(AuthError::Expired);
    }

    Ok(Session {
        user_id: payload.sub,
        is_authenticated: payload.role.as_deref() == Some(AUTHENTICATED_ROLE),
    })
}

#[derive(Clone)]
struct AuthState {
    hmac: Hmac<Sha256>,
}

/// Registers the token secret; without `jwt_key` every user route answers
/// 500.
pub fn configure(cfg: &mut ServiceConfig, server_config: &crate::Config) {
    let Some(jwt_key) = server_config.jwt_key.as_ref() else {
        tracing::warn!("jwt_key is not set, user routes are disabled");
        return;
    };
    match Hmac::<Sha256>::new_from_slice(jwt_key.as_bytes()) {
        Ok(hmac) => {
            cfg.app_data(web::ThinData(AuthState { hmac }));
        }
        Err(error) => tracing::error!("invalid jwt_key: {}", error),
    }
}

/// Session of the request's bearer token.
pub struct Auth(Session);

impl Auth {
    pub fn into_inner(self) -> Session {
        self.0
    }
}

impl Deref for Auth {
    type Target = Session;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequest for Auth {
    type Error = AuthError;
    type Future = Ready<Result<Self, AuthError>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(extract(req))
    }
}

fn extract(req: &HttpRequest) -> Result<Auth, AuthError> {
    let auth = req
        .app_data::<web::ThinData<AuthState>>()
        .ok_or(AuthError::NotConfigured)?;
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::NoHeader(AUTHORIZATION))?;
    verify_jwt(&auth.hmac, header.as_bytes(), Utc::now().timestamp()).map(Auth)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    fn encode(b: &[u8]) -> String {
        base64::encode_config(b, base64::URL_SAFE_NO_PAD)
    }

    /// Signs an HS256 token carrying `claims`.
    pub fn sign(key: &str, claims: &serde_json::Value) -> String {
        let header = encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = encode(claims.to_string().as_bytes());
        let header_payload = format!("{header}.{payload}");
        let mut hmac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).unwrap();
        hmac.update(header_payload.as_bytes());
        let signature = encode(&hmac.finalize().into_bytes());
        format!("{header_payload}.{signature}")
    }

    pub fn bearer(key: &str, user_id: UserId) -> String {
        let claims = serde_json::json!({
            "sub": user_id,
            "role": AUTHENTICATED_ROLE,
            "exp": Utc::now().timestamp() + 3600,
        });
        format!("Bearer {}", sign(key, &claims))
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::sign, *};

    const KEY: &str = "test-secret";

    fn hmac() -> Hmac<Sha256> {
        Hmac::new_from_slice(KEY.as_bytes()).unwrap()
    }

    #[test]
    fn test_verify_jwt() {
        let user_id = UserId::new_v4();
        let now = 1_700_000_000;
        let token = sign(
            KEY,
            &serde_json::json!({ "sub": user_id, "role": "authenticated", "exp": now + 60 }),
        );
        let session = verify_jwt(&hmac(), format!("Bearer {token}").as_bytes(), now).unwrap();
        assert_eq!(session, Session::authenticated(user_id));

        let anon = sign(
            KEY,
            &serde_json::json!({ "sub": user_id, "role": "anon", "exp": now + 60 }),
        );
        let session = verify_jwt(&hmac(), format!("Bearer {anon}").as_bytes(), now).unwrap();
        assert!(!session.is_authenticated);
    }

    #[test]
    fn test_reject_bad_tokens() {
        let user_id = UserId::new_v4();
        let now = 1_700_000_000;
        let claims = serde_json::json!({ "sub": user_id, "role": "authenticated", "exp": now });
        let expired = sign(KEY, &claims);
        assert!(matches!(
            verify_jwt(&hmac(), format!("Bearer {expired}").as_bytes(), now),
            Err(AuthError::Expired)
        ));

        let forged = sign("other-secret", &claims);
        assert!(matches!(
            verify_jwt(&hmac(), format!("Bearer {forged}").as_bytes(), now - 10),
            Err(AuthError::HmacFailed)
        ));

        assert!(matches!(
            verify_jwt(&hmac(), expired.as_bytes(), now - 10),
            Err(AuthError::InvalidFormat)
        ));
    }
}
