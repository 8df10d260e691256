use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use tower::ServiceExt;

use rosterd::api::AppState;
use rosterd::config::Config;
use rosterd::entities::accounts;
use rosterd::hashing::{CredentialVerifier, LegacyHasher, SecureHasher};

/// Seeded by the initial migration (must match m20240101_create_accounts.rs)
const ADMIN_PASSWORD: &str = "ChangeMe123!";

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // A pooled in-memory SQLite is one database per connection; keep the
    // pool at a single connection so every query sees the same data.
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.server.secure_cookies = false;
    config
}

async fn spawn_app_with(config: Config) -> (Router, Arc<AppState>) {
    let state = rosterd::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    let app = rosterd::api::router(state.clone()).await;
    (app, state)
}

async fn spawn_app() -> (Router, Arc<AppState>) {
    spawn_app_with(test_config()).await
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn login_request(username: &str, password: &str) -> Request<Body> {
    json_request(
        "POST",
        "/api/auth/login",
        serde_json::json!({ "username": username, "password": password }),
    )
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_legacy_account(state: &AppState, username: &str, secret: &str) {
    let now = chrono::Utc::now().to_rfc3339();
    accounts::ActiveModel {
        username: Set(username.to_string()),
        display_name: Set("Legacy User".to_string()),
        legacy_hash: Set(Some(LegacyHasher.hash(secret))),
        secure_hash: Set(None),
        migrated: Set(false),
        role: Set("standard".to_string()),
        active: Set(true),
        failed_attempts: Set(0),
        locked_until: Set(None),
        last_login_at: Set(None),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.store().conn)
    .await
    .expect("Failed to seed legacy account");
}

async fn seed_inactive_account(state: &AppState, username: &str, secret: &str) {
    let secure_hash = SecureHasher::new(&test_config().security)
        .hash(secret)
        .unwrap();

    let now = chrono::Utc::now().to_rfc3339();
    accounts::ActiveModel {
        username: Set(username.to_string()),
        display_name: Set("Disabled User".to_string()),
        legacy_hash: Set(None),
        secure_hash: Set(Some(secure_hash)),
        migrated: Set(true),
        role: Set("standard".to_string()),
        active: Set(false),
        failed_attempts: Set(0),
        locked_until: Set(None),
        last_login_at: Set(None),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&state.store().conn)
    .await
    .expect("Failed to seed inactive account");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/system/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn seeded_admin_can_log_in_and_reach_protected_routes() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(login_request("admin", ADMIN_PASSWORD))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get("set-cookie")
        .expect("login should set a session cookie")
        .to_str()
        .unwrap()
        .to_string();

    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], "admin");
    assert_eq!(body["data"]["role"], "privileged");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/system/status")
                .header("Cookie", cookie.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header("Cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], "admin");
    assert_eq!(body["data"]["display_name"], "Administrator");
}

#[tokio::test]
async fn wrong_password_is_rejected_with_a_generic_message() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(login_request("admin", "WrongPass1!"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid username or password");
}

#[tokio::test]
async fn logout_ends_the_session() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(login_request("admin", ADMIN_PASSWORD))
        .await
        .unwrap();
    let cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header("Cookie", cookie.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header("Cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_creates_a_standard_account_even_with_a_role_payload() {
    // Scenario: the caller tries to elevate itself at signup.
    let (app, state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "username": "a@x.com",
                "display_name": "Alice",
                "password": "Secret1!",
                "confirm_password": "Secret1!",
                "role": "privileged"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let record = state
        .store()
        .find_credential("a@x.com")
        .await
        .unwrap()
        .expect("account should exist");
    assert_eq!(record.account.role.as_str(), "standard");
    assert!(record.account.migrated);
    assert!(record.legacy_hash.is_none());

    let response = app
        .clone()
        .oneshot(login_request("a@x.com", "Secret1!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["role"], "standard");
}

#[tokio::test]
async fn registration_rejects_duplicate_usernames_case_insensitively() {
    let (app, _state) = spawn_app().await;

    let payload = serde_json::json!({
        "username": "Bob",
        "display_name": "Bob",
        "password": "Secret1!",
        "confirm_password": "Secret1!"
    });
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/auth/register", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let payload = serde_json::json!({
        "username": "bob",
        "display_name": "Other Bob",
        "password": "Secret1!",
        "confirm_password": "Secret1!"
    });
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/auth/register", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn registration_enforces_the_complexity_policy() {
    let (app, _state) = spawn_app().await;

    for bad in ["short1!", "alllower1!", "ALLUPPER1!", "NoDigits!!", "NoSymbol11"] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                serde_json::json!({
                    "username": "carol",
                    "display_name": "Carol",
                    "password": bad,
                    "confirm_password": bad
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "accepted {bad:?}");
    }
}

#[tokio::test]
async fn registration_rejects_mismatched_confirmation() {
    let (app, state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "username": "dave",
                "display_name": "Dave",
                "password": "Secret1!",
                "confirm_password": "Different1!"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.store().find_credential("dave").await.unwrap().is_none());
}

#[tokio::test]
async fn legacy_account_is_migrated_on_first_successful_login() {
    // Scenario: a pre-existing record that only has the old unsalted hash.
    let mut config = test_config();
    config.rate_limit.login_limit = 100;
    let security = config.security.clone();
    let (app, state) = spawn_app_with(config).await;

    seed_legacy_account(&state, "legacy.user", "OldPass1!").await;

    let response = app
        .clone()
        .oneshot(login_request("legacy.user", "OldPass1!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let record = state
        .store()
        .find_credential("legacy.user")
        .await
        .unwrap()
        .unwrap();
    assert!(record.account.migrated);
    let secure_hash = record.secure_hash.expect("migration must store a secure hash");
    assert!(SecureHasher::new(&security).verify(&secure_hash, "OldPass1!"));

    // Second login takes the secure path and leaves the hash untouched.
    let response = app
        .clone()
        .oneshot(login_request("legacy.user", "OldPass1!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let record = state
        .store()
        .find_credential("legacy.user")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.secure_hash, Some(secure_hash));
}

#[tokio::test]
async fn wrong_legacy_password_does_not_migrate() {
    let (app, state) = spawn_app().await;
    seed_legacy_account(&state, "legacy.user", "OldPass1!").await;

    let response = app
        .clone()
        .oneshot(login_request("legacy.user", "WrongPass1!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let record = state
        .store()
        .find_credential("legacy.user")
        .await
        .unwrap()
        .unwrap();
    assert!(!record.account.migrated);
    assert!(record.secure_hash.is_none());
    assert_eq!(record.account.failed_attempts, 1);
}

#[tokio::test]
async fn concurrent_logins_against_a_legacy_account_migrate_exactly_once() {
    let mut config = test_config();
    config.rate_limit.login_limit = 100;
    let security = config.security.clone();
    let (app, state) = spawn_app_with(config).await;

    seed_legacy_account(&state, "legacy.user", "OldPass1!").await;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let app = app.clone();
        tasks.spawn(async move {
            let response = app
                .oneshot(login_request("legacy.user", "OldPass1!"))
                .await
                .unwrap();
            response.status()
        });
    }

    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    let record = state
        .store()
        .find_credential("legacy.user")
        .await
        .unwrap()
        .unwrap();
    assert!(record.account.migrated);
    let secure_hash = record.secure_hash.expect("exactly one migration must have won");
    assert!(SecureHasher::new(&security).verify(&secure_hash, "OldPass1!"));
    assert_eq!(record.account.failed_attempts, 0);
}

#[tokio::test]
async fn four_failures_then_a_success_resets_the_counter() {
    let mut config = test_config();
    config.rate_limit.login_limit = 100;
    let (app, state) = spawn_app_with(config).await;

    for _ in 0..4 {
        let response = app
            .clone()
            .oneshot(login_request("admin", "WrongPass1!"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .clone()
        .oneshot(login_request("admin", ADMIN_PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let record = state.store().find_credential("admin").await.unwrap().unwrap();
    assert_eq!(record.account.failed_attempts, 0);
    assert!(record.account.locked_until.is_none());
    assert!(record.account.last_login_at.is_some());
}

#[tokio::test]
async fn five_failures_lock_the_account_even_for_the_correct_password() {
    let mut config = test_config();
    config.rate_limit.login_limit = 100;
    let (app, state) = spawn_app_with(config).await;

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(login_request("admin", "WrongPass1!"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let record = state.store().find_credential("admin").await.unwrap().unwrap();
    assert_eq!(record.account.failed_attempts, 5);
    let locked_until = record
        .account
        .locked_until
        .expect("fifth failure must set the lockout");
    let until = chrono::DateTime::parse_from_rfc3339(&locked_until).unwrap();
    let remaining = until.signed_duration_since(chrono::Utc::now());
    assert!(remaining.num_seconds() > 0);
    assert!(remaining.num_seconds() <= 30 * 60);

    // Sixth attempt with the correct password: locked, not authenticated.
    let response = app
        .clone()
        .oneshot(login_request("admin", ADMIN_PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response
        .headers()
        .get("retry-after")
        .expect("lockout must carry Retry-After")
        .to_str()
        .unwrap()
        .parse::<u64>()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 30 * 60);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("locked"));
}

#[tokio::test]
async fn login_rate_limit_rejects_the_sixth_attempt_in_a_minute() {
    // Scenario: default login budget, same client key throughout.
    let (app, _state) = spawn_app().await;

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(login_request("nobody", "Whatever1!"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .clone()
        .oneshot(login_request("nobody", "Whatever1!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("retry-after").is_some());
}

#[tokio::test]
async fn registration_rate_limit_rejects_the_fourth_attempt_in_an_hour() {
    let (app, _state) = spawn_app().await;

    for i in 0..3 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/auth/register",
                serde_json::json!({
                    "username": format!("user{i}"),
                    "display_name": "User",
                    "password": "Secret1!",
                    "confirm_password": "Secret1!"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "username": "user3",
                "display_name": "User",
                "password": "Secret1!",
                "confirm_password": "Secret1!"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn inactive_account_gets_the_same_generic_rejection() {
    // Scenario: correct password against a disabled account.
    let (app, state) = spawn_app().await;
    seed_inactive_account(&state, "gone.user", "Secret1!").await;

    let response = app
        .clone()
        .oneshot(login_request("gone.user", "Secret1!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let inactive_body = body_json(response).await;

    let response = app
        .clone()
        .oneshot(login_request("admin", "WrongPass1!"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let wrong_password_body = body_json(response).await;

    assert_eq!(inactive_body["error"], wrong_password_body["error"]);
}

#[tokio::test]
async fn usernames_resolve_case_insensitively_at_login() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(login_request("ADMIN", ADMIN_PASSWORD))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["username"], "admin");
}
