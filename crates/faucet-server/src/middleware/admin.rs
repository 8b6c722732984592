//! `x-admin-key` check for the `/admin` scope.

use crate::{X_ADMIN_KEY, error};
use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web::{self, ServiceConfig},
};

#[derive(Clone)]
struct AdminKeyState {
    key: String,
}

/// Registers the admin key, returns `false` when none is configured and the
/// admin routes must not be mounted.
pub fn configure(cfg: &mut ServiceConfig, server_config: &crate::Config) -> bool {
    let Some(key) = server_config.admin_key() else {
        tracing::info!("admin_key is not set, admin routes are disabled");
        return false;
    };
    cfg.app_data(web::ThinData(AdminKeyState {
        key: key.to_owned(),
    }));
    true
}

pub async fn require_admin_key(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let matches = match (
        req.app_data::<web::ThinData<AdminKeyState>>(),
        req.headers().get(&X_ADMIN_KEY),
    ) {
        (Some(state), Some(value)) => state.key.as_bytes() == value.as_bytes(),
        _ => false,
    };
    if !matches {
        return Err(error::AdminKey.into());
    }
    next.call(req).await
}
