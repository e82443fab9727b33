use crate::{
    AccountRole, AuthClient, AuthResult, ChangeReason, ErrorDetails, LoginRequest,
    RegisterRequest, SessionStore, NETWORK_ERROR,
};
use kindearth_http::endpoints::{CSRF_TOKEN, LOGIN, LOGOUT, REFRESH_TOKEN, REGISTER};
use kindearth_http::mock::{ScriptedResponse, ScriptedTransport};
use kindearth_http::{standard_pipeline, CsrfStore};
use kindearth_storage::{KeyValueStore, MemoryStorage, StorageKeys, StorageResult};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone, Default)]
struct SharedStore(Arc<MemoryStorage>);

impl KeyValueStore for SharedStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.0.set(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.0.get(key)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        self.0.delete(key)
    }
}

struct Fixture {
    transport: Arc<ScriptedTransport>,
    store: Arc<SessionStore>,
    durable: SharedStore,
    client: AuthClient,
}

fn fixture() -> Fixture {
    let transport = Arc::new(ScriptedTransport::new());
    let durable = SharedStore::default();
    let store = Arc::new(SessionStore::new(
        Box::new(durable.clone()),
        Box::new(MemoryStorage::new()),
    ));
    let pipeline = Arc::new(standard_pipeline(
        transport.clone(),
        Arc::new(CsrfStore::new()),
        store.clone(),
    ));

    Fixture {
        transport,
        store,
        durable,
        client: AuthClient::new(pipeline),
    }
}

fn credentials() -> LoginRequest {
    LoginRequest::new("ana@kindearth.shop", "Str0ng!pass")
}

fn user_json() -> serde_json::Value {
    json!({
        "id": "u-1",
        "email": "ana@kindearth.shop",
        "firstName": "Ana",
        "lastName": "Lima",
        "roles": ["Customer"]
    })
}

fn registration() -> RegisterRequest {
    RegisterRequest {
        email: "ana@kindearth.shop".to_string(),
        password: "Str0ng!pass".to_string(),
        first_name: "Ana".to_string(),
        last_name: "Lima".to_string(),
        phone: "+5511999998888".to_string(),
        role: Some(AccountRole::Customer),
        store_name: None,
    }
}

#[tokio::test]
async fn test_login_401_without_body() {
    let f = fixture();
    f.transport.push(LOGIN, ScriptedResponse::status(401));

    let result = f.client.login(&credentials()).await;

    let failure = result.failure_ref().unwrap();
    assert_eq!(failure.error, "Invalid email or password");
    assert_eq!(failure.status, Some(401));
    assert_eq!(f.transport.count(REFRESH_TOKEN), 0);
    assert_eq!(f.transport.count(LOGIN), 1);
}

#[tokio::test]
async fn test_login_success_then_remember() {
    let f = fixture();
    f.transport
        .push(LOGIN, ScriptedResponse::json(200, json!({ "data": user_json() })));

    let user = f.client.login(&credentials()).await.into_result().unwrap();
    assert_eq!(user.id, "u-1");

    f.store.set_user(Some(user), true).unwrap();
    assert!(f.store.is_remembered());
    assert!(f.durable.get(StorageKeys::REMEMBERED_USER).unwrap().is_some());

    let sent = f.transport.requests_to(LOGIN);
    assert_eq!(sent[0].body.as_ref().unwrap()["email"], "ana@kindearth.shop");
}

#[tokio::test]
async fn test_login_too_many_attempts() {
    let f = fixture();
    f.transport.push(LOGIN, ScriptedResponse::status(429));

    let result = f.client.login(&credentials()).await;
    assert_eq!(
        result.failure_ref().unwrap().error,
        "Too many login attempts. Please try again later."
    );
}

#[tokio::test]
async fn test_login_network_error() {
    let f = fixture();
    f.transport.push(LOGIN, ScriptedResponse::connect_error());

    let result = f.client.login(&credentials()).await;

    let failure = result.failure_ref().unwrap();
    assert_eq!(failure.error, NETWORK_ERROR);
    assert_eq!(failure.status, None);
}

#[tokio::test]
async fn test_login_undecodable_success_is_a_failure() {
    let f = fixture();
    f.transport
        .push(LOGIN, ScriptedResponse::text(200, "<html>maintenance</html>"));

    let result = f.client.login(&credentials()).await;
    assert!(!result.is_success());
    assert!(result.failure_ref().unwrap().error.starts_with("JSON error"));
}

#[tokio::test]
async fn test_register_409() {
    let f = fixture();
    f.transport.push(REGISTER, ScriptedResponse::status(409));

    let result = f.client.register(&registration()).await;

    let failure = result.failure_ref().unwrap();
    assert_eq!(failure.error, "Email already exists");
    assert_eq!(failure.status, Some(409));
}

#[tokio::test]
async fn test_register_success() {
    let f = fixture();
    f.transport.push(
        REGISTER,
        ScriptedResponse::json(
            201,
            json!({
                "success": true,
                "message": "User registered",
                "data": "u-42",
                "timestamp": "2026-10-16T10:00:00Z"
            }),
        ),
    );

    let response = f.client.register(&registration()).await.into_result().unwrap();

    assert!(response.success);
    assert_eq!(response.user_id().as_deref(), Some("u-42"));
    let sent = f.transport.requests_to(REGISTER);
    assert_eq!(sent[0].body.as_ref().unwrap()["role"], "Customer");
}

#[tokio::test]
async fn test_register_validation_details() {
    let f = fixture();
    f.transport.push(
        REGISTER,
        ScriptedResponse::json(
            400,
            json!({
                "success": false,
                "message": "Validation failed",
                "errors": { "phone": ["Phone is invalid"] }
            }),
        ),
    );

    let result = f.client.register(&registration()).await;

    let failure = result.failure_ref().unwrap();
    assert_eq!(failure.error, "Validation failed");
    assert!(matches!(failure.details, Some(ErrorDetails::Fields(_))));
    assert_eq!(
        failure.display_message(),
        "Validation failed phone: Phone is invalid"
    );
}

#[tokio::test]
async fn test_sign_out_clears_locally_whatever_the_backend_says() {
    let f = fixture();
    f.store
        .set_user(Some(serde_json::from_value(user_json()).unwrap()), true)
        .unwrap();
    f.transport.push(LOGOUT, ScriptedResponse::status(500));

    let result = f.client.sign_out(&f.store).await;

    assert_eq!(result.failure_ref().unwrap().error, "Logout failed (500)");
    assert!(f.store.user().is_none());
    assert!(f.durable.get(StorageKeys::REMEMBERED_USER).unwrap().is_none());
}

#[tokio::test]
async fn test_sign_out_offline_still_clears() {
    let f = fixture();
    f.store
        .set_user(Some(serde_json::from_value(user_json()).unwrap()), false)
        .unwrap();
    f.transport.push(LOGOUT, ScriptedResponse::timeout());

    let result = f.client.sign_out(&f.store).await;

    assert_eq!(result.failure_ref().unwrap().error, NETWORK_ERROR);
    assert!(!f.store.is_authenticated());
}

#[tokio::test]
async fn test_failed_refresh_signs_the_user_out() {
    let f = fixture();
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = reasons.clone();
    f.store
        .set_callback(Box::new(move |change| sink.lock().push(change.reason)));
    f.store
        .set_user(Some(serde_json::from_value(user_json()).unwrap()), true)
        .unwrap();

    f.transport.push("/api/orders", ScriptedResponse::status(401));
    f.transport.push(REFRESH_TOKEN, ScriptedResponse::status(401));

    let response = f.client.pipeline().get("/api/orders").await.unwrap();

    assert_eq!(response.status.as_u16(), 401);
    assert!(f.store.user().is_none());
    assert_eq!(
        *reasons.lock(),
        vec![ChangeReason::SignedIn, ChangeReason::Expired]
    );
}

#[tokio::test]
async fn test_refresh_token_operation() {
    let f = fixture();
    f.transport.push(REFRESH_TOKEN, ScriptedResponse::status(401));
    f.transport
        .push(REFRESH_TOKEN, ScriptedResponse::json(200, json!({ "ok": true })));

    let failed = f.client.refresh_token().await;
    assert_eq!(
        failed.failure_ref().unwrap().error,
        "Token refresh failed (401)"
    );

    let ok = f.client.refresh_token().await;
    assert_eq!(ok.data().unwrap()["ok"], true);
    assert_eq!(f.transport.count(REFRESH_TOKEN), 2);
}

#[tokio::test]
async fn test_get_csrf_operation() {
    let f = fixture();
    f.transport
        .push(CSRF_TOKEN, ScriptedResponse::json(200, json!({ "token": "t-1" })));
    f.transport.push(CSRF_TOKEN, ScriptedResponse::status(503));

    let ok = f.client.get_csrf().await;
    assert_eq!(ok.data().unwrap()["token"], "t-1");

    let failed = f.client.get_csrf().await;
    assert_eq!(
        failed.failure_ref().unwrap().error,
        "CSRF token fetch failed (503)"
    );
}

#[tokio::test]
async fn test_results_serialize_to_wire_shape() {
    let f = fixture();
    f.transport.push(REGISTER, ScriptedResponse::status(409));

    let result: AuthResult<_> = f.client.register(&registration()).await;
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({ "success": false, "error": "Email already exists", "status": 409 })
    );
}
