// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::ApiError,
    reconcile::DepositStatus,
    state::AppState,
    storage::{
        CustodialProviderState, Deposit, DepositOrigin, Destination, EventSource,
        FiatProviderState, Money, ReportedAmount, TimelineEntry,
    },
};

pub mod custodial_webhook;
pub mod deposits;
pub mod fiat_webhook;
pub mod health;
pub mod session;
pub mod user_tags;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.fiat.allowed_origins);

    let v1_routes = Router::new()
        .route("/user-tag", post(user_tags::create_user_tag))
        .route("/deposits", get(deposits::list_deposits))
        .route("/deposits/{deposit_id}", get(deposits::get_deposit));

    let api = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route(
            "/session",
            post(session::create_session).fallback(method_not_allowed),
        )
        .route(
            "/webhooks/fiat",
            post(fiat_webhook::receive_fiat_event)
                .get(health::webhook_ping)
                .fallback(method_not_allowed),
        )
        .route(
            "/webhooks/custodial",
            post(custodial_webhook::receive_custodial_event)
                .get(health::webhook_ping)
                .fallback(method_not_allowed),
        )
        .nest("/v1", v1_routes)
        .with_state(state);

    Router::new()
        .merge(api)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

/// Any origin when the allowlist is empty, otherwise only listed origins.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if allowed_origins.is_empty() {
        return base.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        session::create_session,
        fiat_webhook::receive_fiat_event,
        custodial_webhook::receive_custodial_event,
        user_tags::create_user_tag,
        deposits::list_deposits,
        deposits::get_deposit
    ),
    components(
        schemas(
            Deposit,
            DepositStatus,
            DepositOrigin,
            Destination,
            Money,
            ReportedAmount,
            FiatProviderState,
            CustodialProviderState,
            TimelineEntry,
            EventSource,
            session::CreateSessionRequest,
            session::CreateSessionResponse,
            fiat_webhook::FiatWebhookResponse,
            custodial_webhook::CustodialWebhookResponse,
            user_tags::UserTagResponse,
            deposits::DepositListResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Deposits", description = "Purchase sessions, destination tags and deposit records"),
        (name = "Webhooks", description = "Fiat and custodial provider callbacks"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::extractor::test_support::create_test_jwt;
    use crate::providers::{TokenCache, TransakClient};
    use crate::state::test_state_with;
    use axum::{
        body::{to_bytes, Body},
        extract::State as AxumState,
        http::{Request, StatusCode},
        Json,
    };
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const WEBHOOK_SECRET: &str = "whsec_test";

    fn base_env(name: &str) -> Option<String> {
        let value = match name {
            "TRANSAK_WEBHOOK_SECRET" => WEBHOOK_SECRET,
            "FIREBLOCKS_API_KEY" => "fb-key",
            "FIREBLOCKS_API_PRIVATE_KEY" => "fb-private",
            "FIREBLOCKS_BASE_URL" => "https://sandbox-api.fireblocks.io",
            _ => return None,
        };
        Some(value.to_string())
    }

    fn app() -> (Router, AppState, TempDir) {
        let (state, dir) = test_state_with(base_env);
        (router(state.clone()), state, dir)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    fn fiat_webhook(body: &Value) -> Request<Body> {
        let raw = body.to_string();
        let signature = fiat_webhook::sign_hex(WEBHOOK_SECRET, raw.as_bytes());
        Request::post("/webhooks/fiat")
            .header("content-type", "application/json")
            .header("x-transak-signature", signature)
            .body(Body::from(raw))
            .unwrap()
    }

    fn custodial_webhook(body: &Value) -> Request<Body> {
        Request::post("/webhooks/custodial")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn authed(method: Method, uri: &str, user: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", create_test_jwt(user)))
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    fn session_deposit(user: &str, session_id: &str, tag: &str, crypto: Option<f64>) -> Deposit {
        Deposit::initiated(
            user.to_string(),
            "XRP".to_string(),
            "STAGING".to_string(),
            Money {
                currency: "USD".to_string(),
                amount: 100.0,
            },
            crypto.map(|amount| Money {
                currency: "XRP".to_string(),
                amount,
            }),
            Destination {
                address: Some("rAddress".to_string()),
                tag: Some(tag.to_string()),
            },
            FiatProviderState {
                session_id: Some(session_id.to_string()),
                status: Some("SESSION_CREATED".to_string()),
                ..FiatProviderState::default()
            },
        )
    }

    #[tokio::test]
    async fn liveness_and_readiness() {
        let (app, _state, _dir) = app();

        let (status, body) = send(&app, Request::get("/health/live").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["database"], "ok");
        assert!(body["checks"].get("jwks").is_none());
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (app, _state, _dir) = app();
        let (status, body) = send(&app, Request::get("/api-doc/openapi.json").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"].get("/webhooks/custodial").is_some());
        assert!(body["paths"].get("/v1/deposits/{deposit_id}").is_some());
    }

    #[tokio::test]
    async fn webhook_method_rules() {
        let (app, _state, _dir) = app();
        for uri in ["/webhooks/fiat", "/webhooks/custodial"] {
            let (status, body) = send(&app, Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, Value::String("ok".to_string()));

            let (status, body) = send(&app, Request::put(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(body, json!({ "ok": false, "error": "method_not_allowed" }));
        }
    }

    #[tokio::test]
    async fn fiat_webhook_requires_secret() {
        let (state, _dir) = test_state_with(|_| None);
        let app = router(state);
        let (status, body) = send(&app, fiat_webhook(&json!({ "data": { "id": "o1" } }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "webhook_secret_missing");
    }

    #[tokio::test]
    async fn fiat_webhook_rejects_bad_signature() {
        let (app, state, _dir) = app();
        state.deposits.insert_deposit(&session_deposit("user-1", "sess-1", "11111111", None)).unwrap();

        let request = Request::post("/webhooks/fiat")
            .header("x-transak-signature", "00ff")
            .body(Body::from(json!({ "data": { "sessionId": "sess-1", "status": "COMPLETED" } }).to_string()))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_signature");

        let unsigned = Request::post("/webhooks/fiat").body(Body::from("{}")).unwrap();
        let (status, _) = send(&app, unsigned).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn fiat_webhook_malformed_json_is_400() {
        let (app, _state, _dir) = app();
        let raw = "{not json";
        let request = Request::post("/webhooks/fiat")
            .header("x-transak-signature", fiat_webhook::sign_hex(WEBHOOK_SECRET, raw.as_bytes()))
            .body(Body::from(raw))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_json");
    }

    #[tokio::test]
    async fn fiat_webhook_unknown_order_is_accepted() {
        let (app, state, _dir) = app();
        let (status, body) = send(&app, fiat_webhook(&json!({ "data": { "id": "ord-x", "status": "COMPLETED" } }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, json!({ "ok": false, "error": "deposit_not_found" }));
        assert_eq!(state.deposits.count_deposits().unwrap(), 0);
    }

    #[tokio::test]
    async fn purchase_to_settlement_flow() {
        let (app, state, _dir) = app();
        let deposit = session_deposit("user-1", "sess-1", "12345678", Some(25.0));
        let deposit_id = deposit.deposit_id.clone();
        state.deposits.insert_deposit(&deposit).unwrap();

        let (status, body) = send(
            &app,
            fiat_webhook(&json!({
                "eventID": "ORDER_COMPLETED",
                "data": {
                    "id": "ord-1",
                    "sessionId": "sess-1",
                    "status": "COMPLETED",
                    "cryptoAmount": 25.0,
                    "walletAddressTag": "12345678"
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["depositId"], deposit_id.as_str());
        assert_eq!(body["status"], "AWAITING_SETTLEMENT");
        assert_eq!(body["statusApplied"], true);

        let (status, body) = send(
            &app,
            custodial_webhook(&json!({
                "type": "TRANSACTION_STATUS_UPDATED",
                "data": {
                    "id": "fb-tx-1",
                    "status": "COMPLETED",
                    "assetId": "XRP",
                    "amount": 25.00005,
                    "txHash": "ABCDEF",
                    "numConfirmations": 1,
                    "destination": { "tag": "12345678" }
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "depositId": deposit_id }));

        let (status, body) = send(
            &app,
            authed(Method::GET, &format!("/v1/deposits/{deposit_id}"), "user-1", Body::empty()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "SETTLED");
        assert_eq!(body["fiatProvider"]["orderId"], "ord-1");
        assert_eq!(body["custodialProvider"]["transactionId"], "fb-tx-1");
        assert_eq!(body["custodialProvider"]["environment"], "SANDBOX");
        assert_eq!(body["timeline"].as_array().unwrap().len(), 2);

        // A late fiat event cannot pull a settled deposit back.
        let (status, body) = send(
            &app,
            fiat_webhook(&json!({ "data": { "id": "ord-1", "status": "AWAITING_DELIVERY" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "SETTLED");
        assert_eq!(body["statusApplied"], false);
    }

    #[tokio::test]
    async fn custodial_webhook_records_unmatched_and_ambiguous() {
        let (app, state, _dir) = app();

        let (status, body) = send(&app, custodial_webhook(&json!({ "data": { "id": "t1", "status": "COMPLETED" } }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["unmatched"], true);
        assert_eq!(body["note"], "no_destination_tag");

        let (status, body) = send(
            &app,
            custodial_webhook(&json!({ "id": "t2", "status": "COMPLETED", "amount": "5", "destination": { "tag": "999" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["unmatched"], true);
        assert!(body.get("note").is_none());

        state.deposits.insert_deposit(&session_deposit("user-1", "s-a", "777", None)).unwrap();
        state.deposits.insert_deposit(&session_deposit("user-1", "s-b", "777", None)).unwrap();
        let (status, body) = send(
            &app,
            custodial_webhook(&json!({ "data": { "id": "t3", "status": "CONFIRMED", "amount": 5, "txInfo": { "destinationTag": "777" } } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ambiguous"], true);

        let record_id = body["recordId"].as_str().unwrap().to_string();
        let record = state.deposits.get_deposit(&record_id).unwrap().unwrap();
        assert_eq!(record.status, DepositStatus::AmbiguousCustodial);
        assert_eq!(record.custodial_provider.candidate_deposit_ids.len(), 2);
    }

    #[tokio::test]
    async fn custodial_webhook_errors() {
        let (app, _state, _dir) = app();
        let request = Request::post("/webhooks/custodial").body(Body::from("nope")).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_json");

        let (state, _dir2) = test_state_with(|_| None);
        let unconfigured = router(state);
        let (status, body) = send(&unconfigured, custodial_webhook(&json!({ "data": {} }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "custodial_secrets_missing");
    }

    #[tokio::test]
    async fn deposit_reads_are_owner_scoped() {
        let (app, state, _dir) = app();
        let deposit = session_deposit("user-1", "sess-1", "123", None);
        let deposit_id = deposit.deposit_id.clone();
        state.deposits.insert_deposit(&deposit).unwrap();

        let (status, body) = send(&app, authed(Method::GET, "/v1/deposits", "user-1", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["deposits"][0]["id"], deposit_id.as_str());

        let (status, body) = send(&app, authed(Method::GET, "/v1/deposits", "user-2", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);

        let (status, body) = send(
            &app,
            authed(Method::GET, &format!("/v1/deposits/{deposit_id}"), "user-2", Body::empty()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let (status, body) = send(&app, authed(Method::GET, "/v1/deposits/missing", "user-1", Body::empty())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "deposit_not_found");

        let (status, body) = send(&app, Request::get("/v1/deposits").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn user_tag_endpoint_is_idempotent() {
        let (app, _state, _dir) = app();

        let (status, first) = send(&app, authed(Method::POST, "/v1/user-tag", "user-1", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["existed"], false);

        let (status, second) = send(&app, authed(Method::POST, "/v1/user-tag", "user-1", Body::empty())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["existed"], true);
        assert_eq!(first["userTag"], second["userTag"]);
    }

    // -------------------------------------------------------------------------
    // Session creation against a local fake provider
    // -------------------------------------------------------------------------

    #[derive(Clone, Default)]
    struct FakeGateway {
        fail_session: bool,
        last_params: Arc<Mutex<Option<Value>>>,
    }

    async fn fake_refresh() -> Json<Value> {
        Json(json!({ "data": { "accessToken": "opaque-token", "expiresAt": 4_102_444_800i64 } }))
    }

    async fn fake_session(AxumState(fake): AxumState<FakeGateway>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        *fake.last_params.lock().unwrap() = body.get("widgetParams").cloned();
        if fake.fail_session {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad params" })));
        }
        (
            StatusCode::OK,
            Json(json!({ "data": { "sessionId": "sess-777", "widgetUrl": "https://global-stg.transak.com/?sessionId=sess-777" } })),
        )
    }

    async fn session_app(fake: FakeGateway, extra: &'static [(&'static str, &'static str)]) -> (Router, AppState, TempDir) {
        let provider = Router::new()
            .route("/partners/api/v2/refresh-token", post(fake_refresh))
            .route("/api/v2/auth/session", post(fake_session))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, provider).await.unwrap();
        });

        let (state, dir) = test_state_with(move |name| {
            if let Some((_, value)) = extra.iter().find(|(key, _)| *key == name) {
                return Some(value.to_string());
            }
            match name {
                "TRANSAK_API_KEY" => Some("pk".to_string()),
                "TRANSAK_API_SECRET" => Some("sk".to_string()),
                "TRANSAK_API_BASE_URL" | "TRANSAK_GATEWAY_BASE_URL" => Some(base.clone()),
                other => base_env(other),
            }
        });
        let client = TransakClient::from_config(&state.config.fiat, Arc::new(TokenCache::new())).unwrap();
        let state = state.with_transak(client);
        (router(state.clone()), state, dir)
    }

    fn session_request(user: &str, body: Value) -> Request<Body> {
        authed(Method::POST, "/session", user, Body::from(body.to_string()))
    }

    #[tokio::test]
    async fn session_creates_initiated_deposit() {
        let fake = FakeGateway::default();
        let (app, state, _dir) = session_app(fake.clone(), &[]).await;

        let (status, body) = send(
            &app,
            session_request("user-1", json!({ "fiatAmount": "150.5", "fiatCurrency": "eur", "cryptoAmount": 40 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["ok"], true);
        assert_eq!(body["sessionId"], "sess-777");
        assert_eq!(body["environment"], "STAGING");
        let tag = body["destination"]["tag"].as_str().unwrap().to_string();
        assert_eq!(state.deposits.user_tag("user-1").unwrap().as_deref(), Some(tag.as_str()));

        let params = fake.last_params.lock().unwrap().clone().unwrap();
        assert_eq!(params["partnerCustomerId"], "user-1");
        assert_eq!(params["fiatCurrency"], "EUR");
        assert_eq!(params["defaultFiatAmount"], "150.5");
        assert_eq!(params["walletAddressTag"], tag.as_str());
        assert_eq!(params["referrerDomain"], "localhost");

        let deposit_id = body["depositId"].as_str().unwrap();
        let deposit = state.deposits.get_deposit(deposit_id).unwrap().unwrap();
        assert_eq!(deposit.status, DepositStatus::Initiated);
        assert_eq!(deposit.expected_crypto_amount(), Some(40.0));
        assert_eq!(deposit.fiat_provider.session_id.as_deref(), Some("sess-777"));
        assert_eq!(deposit.timeline().len(), 1);
        assert_eq!(deposit.timeline()[0].status, "SESSION_CREATED");
    }

    #[tokio::test]
    async fn session_uses_pinned_tag() {
        let (app, state, _dir) = session_app(FakeGateway::default(), &[("DEPOSIT_PINNED_TAG", "123456")]).await;

        let (status, body) = send(&app, session_request("user-1", json!({ "fiatAmount": 20 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["destination"]["tag"], "123456");
        assert_eq!(state.deposits.user_tag("user-1").unwrap(), None);
    }

    #[tokio::test]
    async fn session_rejects_invalid_amount() {
        let (app, state, _dir) = session_app(FakeGateway::default(), &[]).await;

        for body in [json!({}), json!({ "fiatAmount": "10.999" }), json!({ "fiatAmount": -1 })] {
            let (status, response) = send(&app, session_request("user-1", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response["error"], "invalid_amount");
        }

        let (status, _) = send(&app, session_request("user-1", json!({ "defaultFiatAmount": 12 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.deposits.count_deposits().unwrap(), 1);
    }

    #[tokio::test]
    async fn session_provider_failure_persists_nothing() {
        let fake = FakeGateway {
            fail_session: true,
            ..FakeGateway::default()
        };
        let (app, state, _dir) = session_app(fake, &[]).await;

        let (status, body) = send(&app, session_request("user-1", json!({ "fiatAmount": 50 }))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "transak_session_failed");
        assert_eq!(state.deposits.count_deposits().unwrap(), 0);
    }

    #[tokio::test]
    async fn session_enforces_origin_allowlist() {
        let (app, _state, _dir) =
            session_app(FakeGateway::default(), &[("TRANSAK_ALLOWED_ORIGINS", "https://app.example.com")]).await;

        let mut request = session_request("user-1", json!({ "fiatAmount": 50 }));
        request.headers_mut().insert("origin", HeaderValue::from_static("https://evil.example.com"));
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "origin_not_allowed");

        let mut request = session_request("user-1", json!({ "fiatAmount": 50 }));
        request.headers_mut().insert("origin", HeaderValue::from_static("https://app.example.com"));
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn session_requires_identity_and_credentials() {
        let (app, _state, _dir) = app();

        let anonymous = Request::post("/session").body(Body::from(r#"{"fiatAmount":10}"#)).unwrap();
        let (status, body) = send(&app, anonymous).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, body) = send(&app, session_request("user-1", json!({ "fiatAmount": 10 }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "transak_credentials_missing");
    }
}
