use crate::{
    auth::{caller_from_headers, hs256_generate, hs256_validate, AuthFailure, DEPOSIT_HEADER, SECRET_ENV},
    http::{self, health, version},
    metrics::{self, MetricsLayer},
    state::AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    routing::get,
    Router,
};
use fleetcore::platform::{AccountId, Balance};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceExt;

static ENV_GUARD: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const SECRET: &str = "test-secret";
const KEY: &str = "ed25519:6E8sCci9badyRkXb3JoRpBj5p8C6Tw41ELDZoiihKEtp";
const FIVE_NEAR: &str = "5000000000000000000000000";

fn app(state: &AppState) -> Router {
    http::router().with_state(state.clone()).layer(MetricsLayer)
}

fn fresh_state() -> AppState {
    AppState::in_memory(AccountId::parse("fleet.testnet").unwrap())
}

fn token(sub: &str) -> String {
    hs256_generate(sub, KEY).unwrap()
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    caller: Option<&str>,
    deposit: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(sub) = caller {
        builder = builder.header("authorization", format!("Bearer {}", token(sub)));
    }
    if let Some(amount) = deposit {
        builder = builder.header(DEPOSIT_HEADER, amount);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), 256 * 1024).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn initialized(app: &Router) {
    let (status, body) = call(
        app,
        "POST",
        "/registry/initialize",
        Some("alice"),
        Some(FIVE_NEAR),
        Some(json!({"name": "Garage", "owners": ["alice"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

fn car1() -> Value {
    json!({"id": "car1", "title": "My Car", "data": "...", "category": "car", "owner": "alice"})
}

#[tokio::test]
async fn health_ok() {
    fleetcore::init_tracing();
    let app = Router::new().route("/health", get(health));
    let res = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), 16 * 1024).await.unwrap();
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["status"], "ok");
}

#[tokio::test]
async fn version_endpoint_has_build_info() {
    fleetcore::init_tracing();
    let app = Router::new().route("/version", get(version));
    let res = app
        .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = to_bytes(res.into_body(), 16 * 1024).await.unwrap();
    let v: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        v["service"].as_str().unwrap(),
        fleetcore::config().service_name.as_str()
    );
    for key in ["version", "git_sha", "build_ts"] {
        assert!(
            !v[key].as_str().unwrap_or_default().is_empty(),
            "empty field {:?}: {}",
            key,
            v
        );
    }
}

#[tokio::test]
async fn openapi_lists_routes_and_bearer_scheme() {
    let state = fresh_state();
    let (status, v) = call(&app(&state), "GET", "/api-docs/openapi.json", None, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(v["components"]["securitySchemes"].get("BearerAuth").is_some());
    assert!(v["paths"].get("/registry/vehicles").is_some());
    assert!(v["paths"].get("/registry/vehicles/{id}").is_some());
}

#[tokio::test]
async fn metrics_exports_http_and_registry_counters() {
    let _guard = ENV_GUARD.lock().await;
    std::env::set_var(SECRET_ENV, SECRET);
    let state = fresh_state();
    let app = app(&state);
    initialized(&app).await;
    call(&app, "POST", "/registry/vehicles", Some("alice"), Some(FIVE_NEAR), Some(car1())).await;
    state.platform.pump();

    let res = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let body = to_bytes(res.into_body(), 256 * 1024).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("gateway_http_requests_total"), "{text}");
    assert!(text.contains("vehicle_provision_confirmed"), "{text}");
}

#[tokio::test]
async fn reads_before_initialize_are_precondition_failures() {
    let state = fresh_state();
    let (status, body) = call(&app(&state), "GET", "/registry", None, None, None).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"], "not_initialized");
}

#[tokio::test]
async fn mutations_require_a_valid_token() {
    let _guard = ENV_GUARD.lock().await;
    std::env::set_var(SECRET_ENV, SECRET);
    let state = fresh_state();
    let app = app(&state);
    let (status, _) = call(
        &app,
        "POST",
        "/registry/initialize",
        None,
        Some(FIVE_NEAR),
        Some(json!({"name": "Garage", "owners": ["alice"]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/registry/membership/self")
        .header("authorization", "Bearer not.a.token")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(request).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn initialize_twice_conflicts() {
    let _guard = ENV_GUARD.lock().await;
    std::env::set_var(SECRET_ENV, SECRET);
    let state = fresh_state();
    let app = app(&state);
    initialized(&app).await;
    let (status, body) = call(
        &app,
        "POST",
        "/registry/initialize",
        Some("bob"),
        Some(FIVE_NEAR),
        Some(json!({"name": "Other", "owners": ["bob"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_initialized");
    let (_, registry) = call(&app, "GET", "/registry", None, None, None).await;
    assert_eq!(registry["name"], "Garage");
    assert_eq!(registry["owners"], json!(["alice"]));
}

#[tokio::test]
async fn vehicle_lifecycle_through_http() {
    let _guard = ENV_GUARD.lock().await;
    std::env::set_var(SECRET_ENV, SECRET);
    let state = fresh_state();
    let app = app(&state);
    initialized(&app).await;

    let (status, ticket) = call(
        &app,
        "POST",
        "/registry/vehicles",
        Some("alice"),
        Some(FIVE_NEAR),
        Some(car1()),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{ticket}");
    assert_eq!(ticket["state"], "dispatched");
    assert_eq!(ticket["address"], "car1.fleet.testnet");

    let (_, vehicle) = call(&app, "GET", "/registry/vehicles/car1", None, None, None).await;
    assert_eq!(vehicle["registered"], false);

    state.platform.pump();
    let (_, vehicle) = call(&app, "GET", "/registry/vehicles/car1", None, None, None).await;
    assert_eq!(vehicle["registered"], true);
    let (_, count) = call(&app, "GET", "/registry/vehicles/count", None, None, None).await;
    assert_eq!(count["count"], 1);

    let (status, body) = call(
        &app,
        "POST",
        "/registry/vehicles",
        Some("alice"),
        Some(FIVE_NEAR),
        Some(car1()),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, ticket) =
        call(&app, "DELETE", "/registry/vehicles/car1", Some("alice"), None, None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(ticket["state"], "dispatched");
    state.platform.pump();
    let (_, vehicles) = call(&app, "GET", "/registry/vehicles", None, None, None).await;
    assert_eq!(vehicles, json!([]));

    let (_, diag) = call(&app, "GET", "/diagnostics", None, None, None).await;
    assert_eq!(diag["counters"]["vehicle_decommission_removed"], 1);
    assert!(!diag["recent_events"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn vehicle_request_errors_map_to_statuses() {
    let _guard = ENV_GUARD.lock().await;
    std::env::set_var(SECRET_ENV, SECRET);
    let state = fresh_state();
    let app = app(&state);
    initialized(&app).await;

    let (status, _) = call(&app, "POST", "/registry/vehicles", Some("bob"), Some(FIVE_NEAR), Some(car1())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, "POST", "/registry/vehicles", Some("alice"), Some("1"), Some(car1())).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "insufficient_funds");

    let mut boat = car1();
    boat["category"] = json!("boat");
    let (status, _) = call(&app, "POST", "/registry/vehicles", Some("alice"), Some(FIVE_NEAR), Some(boat)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, "POST", "/registry/vehicles", Some("alice"), Some("lots"), Some(car1())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_deposit");

    assert_eq!(state.platform.host().pending_chains(), 0);
}

#[tokio::test]
async fn membership_routes_follow_role_rules() {
    let _guard = ENV_GUARD.lock().await;
    std::env::set_var(SECRET_ENV, SECRET);
    let state = fresh_state();
    let app = app(&state);
    initialized(&app).await;

    let (status, _) = call(
        &app,
        "POST",
        "/registry/owners",
        Some("bob"),
        None,
        Some(json!({"account_id": "bob"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, change) = call(&app, "POST", "/registry/membership/self", Some("bob"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change, json!({"account_id": "bob", "changed": true}));
    let (_, roles) = call(&app, "GET", "/registry/roles/bob", None, None, None).await;
    assert_eq!(roles["contributor"], true);
    assert_eq!(roles["owner"], false);
    assert_eq!(roles["roles"], "contributor");

    let (status, change) = call(
        &app,
        "POST",
        "/registry/contributors",
        Some("alice"),
        None,
        Some(json!({"account_id": "carol"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["changed"], true);
    let (_, contributors) = call(&app, "GET", "/registry/contributors", None, None, None).await;
    assert_eq!(contributors, json!(["bob", "carol"]));

    let (status, _) = call(&app, "DELETE", "/registry/contributors/carol", Some("bob"), None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "DELETE", "/registry/membership/self", Some("bob"), None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, change) = call(&app, "DELETE", "/registry/owners/alice", Some("alice"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["changed"], true);
    let (_, owners) = call(&app, "GET", "/registry/owners", None, None, None).await;
    assert_eq!(owners, json!([]));
}

#[test]
fn normalize_path_collapses_ids() {
    assert_eq!(metrics::normalize_path("/registry/vehicles"), "/registry/vehicles");
    assert_eq!(metrics::normalize_path("/registry/vehicles/count"), "/registry/vehicles/count");
    assert_eq!(metrics::normalize_path("/registry/vehicles/car1"), "/registry/vehicles/:id");
    assert_eq!(
        metrics::normalize_path("/registry/owners/alice.testnet"),
        "/registry/owners/:account"
    );
}

#[test]
fn hs256_roundtrip() {
    let _guard = ENV_GUARD.blocking_lock();
    std::env::set_var(SECRET_ENV, SECRET);
    let token = hs256_generate("alice", KEY).unwrap();
    assert!(hs256_validate(&token).unwrap());
    assert!(hs256_generate("Not An Account", KEY).is_err());
    std::env::set_var(SECRET_ENV, "other-secret");
    assert!(!hs256_validate(&token).unwrap());
    std::env::remove_var(SECRET_ENV);
    assert!(hs256_generate("alice", KEY).is_err());
}

#[test]
fn caller_context_reads_token_and_deposit() {
    let _guard = ENV_GUARD.blocking_lock();
    std::env::set_var(SECRET_ENV, SECRET);
    let mut headers = HeaderMap::new();
    assert_eq!(
        caller_from_headers(&headers).unwrap_err(),
        AuthFailure::MissingToken
    );
    let bearer = format!("Bearer {}", hs256_generate("alice.testnet", KEY).unwrap());
    headers.insert("authorization", HeaderValue::from_str(&bearer).unwrap());
    let ctx = caller_from_headers(&headers).unwrap();
    assert_eq!(ctx.predecessor.as_str(), "alice.testnet");
    assert_eq!(ctx.signer_public_key.as_str(), KEY);
    assert_eq!(ctx.attached_deposit, Balance::ZERO);

    headers.insert(DEPOSIT_HEADER, HeaderValue::from_static(FIVE_NEAR));
    let ctx = caller_from_headers(&headers).unwrap();
    assert_eq!(ctx.attached_deposit, Balance::from_millinear(5_000));
}
