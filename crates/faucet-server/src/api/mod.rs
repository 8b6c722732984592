pub mod get_user;
pub mod link_account;

pub mod claim_history;
pub mod get_claim;
pub mod list_pending;
pub mod recent_claims;
pub mod submit_claim;

pub mod get_stats;

pub mod recompute_stats;
pub mod settle;

pub mod prelude {
    pub use crate::{Config, error::Error, middleware::auth::Auth};
    pub use actix_web::{dev::HttpServiceFactory, http::StatusCode, web};
    pub use chrono::Utc;
    pub use faucet::{Faucet, Settlement};
    pub use faucet_lib::{Claim, ClaimId};
    pub use serde::{Deserialize, Serialize};

    /// `?limit=` of list routes.
    #[derive(Deserialize)]
    pub struct Limit {
        pub limit: Option<usize>,
    }

    pub struct Success;

    impl Serialize for Success {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            use serde::ser::SerializeStruct;
            let mut s = s.serialize_struct("Success", 1)?;
            s.serialize_field("success", &true)?;
            s.end()
        }
    }
}

use crate::middleware::{admin, auth};
use actix_web::middleware::from_fn;
use prelude::*;

pub fn healthcheck() -> impl HttpServiceFactory + 'static {
    web::resource("/healthcheck").route(web::get().to(|| async { web::Json(Success) }))
}

/// Mounts every route. Handlers read [`Faucet`] and [`Settlement`] from app
/// data.
pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    auth::configure(cfg, config);
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|e, _| Error::custom(StatusCode::BAD_REQUEST, e).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|e, _| Error::custom(StatusCode::BAD_REQUEST, e).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|e, _| Error::custom(StatusCode::NOT_FOUND, e).into()),
    );

    let user = web::scope("/user")
        .service(get_user::service(config))
        .service(link_account::service(config));
    // static paths before `/{id}`
    let claims = web::scope("/claims")
        .service(submit_claim::service(config))
        .service(list_pending::service(config))
        .service(claim_history::service(config))
        .service(recent_claims::service(config))
        .service(get_claim::service(config));

    cfg.service(healthcheck())
        .service(user)
        .service(claims)
        .service(get_stats::service(config));

    if admin::configure(cfg, config) {
        cfg.service(
            web::scope("/admin")
                .wrap(from_fn(admin::require_admin_key))
                .service(settle::service())
                .service(recompute_stats::service()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{X_ADMIN_KEY, middleware::auth::testing::bearer};
    use actix_web::{App, http::header::AUTHORIZATION, test};
    use chrono::Duration;
    use db::{DbPool, LocalStorage};
    use faucet_lib::{
        AccountInfo, AccountName, Decimal, LedgerError, UserId, ledger::memory::MemoryLedger,
    };
    use serde_json::{Value, json};
    use std::sync::Arc;

    const JWT_KEY: &str = "jwt-secret";
    const ADMIN_KEY: &str = "admin-secret";

    struct Env {
        _dir: tempfile::TempDir,
        config: Config,
        ledger: Arc<MemoryLedger>,
        services: crate::Services,
    }

    fn account(name: &str, age_days: i64) -> AccountInfo {
        AccountInfo {
            name: AccountName::new(name).unwrap(),
            created_at: Utc::now() - Duration::days(age_days),
            balance: Decimal::ONE,
        }
    }

    fn env(admin_key: Option<&str>) -> Env {
        tracing_subscriber::fmt::try_init().ok();
        let dir = tempfile::tempdir().unwrap();
        let db = DbPool::Local(LocalStorage::new(dir.path().join("db")).unwrap());
        let ledger = Arc::new(
            MemoryLedger::new()
                .with_account(account("alice", 10))
                .with_account(account("newbie", 2)),
        );
        let config = Config {
            jwt_key: Some(JWT_KEY.to_owned()),
            admin_key: admin_key.map(str::to_owned),
            ..Config::default()
        };
        let services = config.services_with_ledger(db, ledger.clone()).unwrap();
        Env {
            _dir: dir,
            config,
            ledger,
            services,
        }
    }

    macro_rules! app {
        ($env:expr) => {{
            let config = $env.config.clone();
            test::init_service(
                App::new()
                    .app_data(web::Data::new($env.services.faucet.clone()))
                    .app_data(web::Data::new($env.services.settlement.clone()))
                    .configure(move |cfg| configure(cfg, &config)),
            )
            .await
        }};
    }

    fn auth(user_id: UserId) -> (actix_web::http::header::HeaderName, String) {
        (AUTHORIZATION, bearer(JWT_KEY, user_id))
    }

    #[actix_web::test]
    async fn test_claim_lifecycle() {
        let env = env(Some(ADMIN_KEY));
        env.ledger.set_tx_id(Some("tx-123"));
        let app = app!(env);
        let user_id = UserId::new_v4();

        let req = test::TestRequest::post()
            .uri("/claims")
            .insert_header(auth(user_id))
            .set_json(json!({ "account_name": "alice", "amount": "0.002" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "pending");
        let claim_id = body["claim_id"].as_str().unwrap().to_owned();

        // cooldown already advanced by the admission
        let req = test::TestRequest::post()
            .uri("/claims")
            .insert_header(auth(user_id))
            .set_json(json!({ "account_name": "alice", "amount": "0.001" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["reason"], "cooldown");
        assert!(body["remaining_secs"].as_u64().unwrap() > 86_000);

        let req = test::TestRequest::get()
            .uri("/claims/pending")
            .insert_header(auth(user_id))
            .to_request();
        let pending: Vec<Claim> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(pending.len(), 1);

        let req = test::TestRequest::get()
            .uri(&format!("/claims/{claim_id}"))
            .insert_header(auth(UserId::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/admin/settle")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/admin/settle")
            .insert_header((X_ADMIN_KEY, "wrong"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "invalid admin key");

        let req = test::TestRequest::post()
            .uri("/admin/settle?max=5")
            .insert_header((X_ADMIN_KEY, ADMIN_KEY))
            .to_request();
        let report: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["selected"], 1);
        assert_eq!(report["completed"], 1);

        let req = test::TestRequest::get()
            .uri(&format!("/claims/{claim_id}"))
            .insert_header(auth(user_id))
            .to_request();
        let claim: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(claim["status"], "completed");
        assert_eq!(claim["transaction_id"], "tx-123");

        let req = test::TestRequest::get().uri("/stats").to_request();
        let stats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats["total_distributed"], "0.002");
        assert_eq!(stats["total_users"], 1);

        let req = test::TestRequest::post()
            .uri("/admin/stats/recompute")
            .insert_header((X_ADMIN_KEY, ADMIN_KEY))
            .to_request();
        let stats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats["total_users"], 1);

        let req = test::TestRequest::get()
            .uri("/claims/history?limit=500")
            .insert_header(auth(user_id))
            .to_request();
        let history: Vec<Claim> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(history.len(), 1);
        assert!(!history[0].is_pending());

        let req = test::TestRequest::get().uri("/claims/recent").to_request();
        let recent: Vec<Claim> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(recent.len(), 1);
    }

    #[actix_web::test]
    async fn test_denials_and_validation() {
        let env = env(None);
        let app = app!(env);
        let user_id = UserId::new_v4();

        let cases = [
            (json!({ "account_name": "alice", "amount": "0.003" }), StatusCode::FORBIDDEN, "amount_exceeds_tier_cap"),
            (json!({ "account_name": "newbie", "amount": "0.001" }), StatusCode::FORBIDDEN, "account_too_young"),
            (json!({ "account_name": "ghost", "amount": "0.001" }), StatusCode::FORBIDDEN, "account_not_found"),
            (json!({ "account_name": "alice", "amount": "0.0015" }), StatusCode::BAD_REQUEST, "validation"),
            (json!({ "account_name": "Alice!", "amount": "0.001" }), StatusCode::BAD_REQUEST, "validation"),
            (json!({ "amount": "0.001" }), StatusCode::BAD_REQUEST, "validation"),
        ];
        for (params, status, reason) in cases {
            let req = test::TestRequest::post()
                .uri("/claims")
                .insert_header(auth(user_id))
                .set_json(&params)
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), status, "{params}");
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["reason"], reason, "{params}");
        }

        let req = test::TestRequest::post()
            .uri("/claims")
            .insert_header(auth(user_id))
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"amount\":")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // nothing was admitted
        let req = test::TestRequest::get()
            .uri("/claims/pending")
            .insert_header(auth(user_id))
            .to_request();
        let pending: Vec<Claim> = test::call_and_read_body_json(&app, req).await;
        assert!(pending.is_empty());
    }

    #[actix_web::test]
    async fn test_ledger_unavailable_at_admission() {
        let env = env(None);
        let app = app!(env);
        let user_id = UserId::new_v4();

        env.ledger.fail_lookups(Some(LedgerError::Timeout));
        let req = test::TestRequest::post()
            .uri("/claims")
            .insert_header(auth(user_id))
            .set_json(json!({ "account_name": "alice", "amount": "0.001" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["reason"], "external_unavailable");
        assert!(body["remaining_secs"].is_null());

        // the cooldown was not consumed
        env.ledger.fail_lookups(None);
        let req = test::TestRequest::get()
            .uri("/user")
            .insert_header(auth(user_id))
            .to_request();
        let user: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(user["consecutive_claims"], 0);
        assert!(user["cooldown_remaining_secs"].is_null());

        let req = test::TestRequest::post()
            .uri("/claims")
            .insert_header(auth(user_id))
            .set_json(json!({ "account_name": "alice", "amount": "0.001" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_link_account_then_claim() {
        let env = env(None);
        let app = app!(env);
        let user_id = UserId::new_v4();

        let req = test::TestRequest::get()
            .uri("/user")
            .insert_header(auth(user_id))
            .to_request();
        let user: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(user["tier"], 1);
        assert_eq!(user["consecutive_claims"], 0);
        assert!(user["cooldown_remaining_secs"].is_null());

        let req = test::TestRequest::post()
            .uri("/user/account")
            .insert_header(auth(user_id))
            .set_json(json!({ "account_name": "ghost" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::post()
            .uri("/user/account")
            .insert_header(auth(user_id))
            .set_json(json!({ "account_name": "alice" }))
            .to_request();
        let linked: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(linked["user"]["account_name"], "alice");
        assert_eq!(linked["account"]["name"], "alice");

        let req = test::TestRequest::post()
            .uri("/claims")
            .insert_header(auth(user_id))
            .set_json(json!({ "amount": 0.002 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["claim"]["account_name"], "alice");

        let req = test::TestRequest::get()
            .uri("/user")
            .insert_header(auth(user_id))
            .to_request();
        let user: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(user["consecutive_claims"], 1);
        assert!(user["cooldown_remaining_secs"].as_u64().unwrap() > 0);
    }

    #[actix_web::test]
    async fn test_sessions_and_admin_routes() {
        let env = env(None);
        let app = app!(env);

        let req = test::TestRequest::get().uri("/healthcheck").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/claims/pending").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let anon = crate::middleware::auth::testing::sign(
            JWT_KEY,
            &json!({ "sub": UserId::new_v4(), "role": "anon", "exp": Utc::now().timestamp() + 60 }),
        );
        let req = test::TestRequest::post()
            .uri("/claims")
            .insert_header((AUTHORIZATION, format!("Bearer {anon}")))
            .set_json(json!({ "account_name": "alice", "amount": "0.001" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get().uri("/stats").to_request();
        let stats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats["total_users"], 0);

        let req = test::TestRequest::post()
            .uri("/admin/settle")
            .insert_header((X_ADMIN_KEY, ADMIN_KEY))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
