//! Integration tests for `/api/v1/users`, `/auth/login` and directory search.

mod common;

use axum::http::StatusCode;
use axum::Router;
use common::*;
use serde_json::json;

const JDOE_DN: &str = "CN=John Doe,OU=Engineering,OU=Active,DC=corp,DC=example";

/// Create the `Engineering` org unit and return its cache id.
async fn engineering(app: &Router) -> i64 {
    let response = post_json(app.clone(), "/api/v1/org-units", json!({ "name": "Engineering" })).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"].as_i64().unwrap()
}

fn jdoe(org_unit_id: i64) -> serde_json::Value {
    json!({
        "account_name": "jdoe",
        "display_name": "John Doe",
        "password": "Winter2026!",
        "email": "jdoe@corp.example",
        "org_unit_id": org_unit_id,
    })
}

/// App with `jdoe` already provisioned.
async fn with_jdoe() -> (Router, Backends) {
    let (app, backends) = build_test_app();
    let ou = engineering(&app).await;
    let response = post_json(app.clone(), "/api/v1/users", jdoe(ou)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    (app, backends)
}

// ---------------------------------------------------------------------------
// Test: POST /users provisions and answers 201 with the cached row
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_user_returns_201() {
    let (app, backends) = build_test_app();
    let ou = engineering(&app).await;

    let response = post_json(app, "/api/v1/users", jdoe(ou)).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["data"]["account_name"], "jdoe");
    assert_eq!(json["data"]["dn"], JDOE_DN);
    assert_eq!(json["data"]["org_unit_id"], ou);
    assert!(json.get("kind").is_none());
    assert!(backends.directory.contains(JDOE_DN));
}

// ---------------------------------------------------------------------------
// Test: invalid payload answers 400 with a validation outcome
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_user_with_short_password_returns_400() {
    let (app, backends) = build_test_app();
    let ou = engineering(&app).await;
    let mut body = jdoe(ou);
    body["password"] = json!("short");

    let response = post_json(app, "/api/v1/users", body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["status"], "validation_error");
    assert!(json["message"].as_str().unwrap().contains("password"));
    assert_eq!(backends.cache.user_count(), 0);
}

#[tokio::test]
async fn create_user_with_dn_returns_400() {
    let (app, backends) = build_test_app();
    let ou = engineering(&app).await;
    let mut body = jdoe(ou);
    body["dn"] = json!("CN=John Doe,OU=Domain Admins,DC=corp,DC=example");

    let response = post_json(app, "/api/v1/users", body).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["status"], "validation_error");
    assert!(json["message"].as_str().unwrap().contains("`dn`"));
    assert_eq!(backends.cache.user_count(), 0);
}

// ---------------------------------------------------------------------------
// Test: cache write failure after the directory add answers 207
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_user_cache_failure_returns_207() {
    let (app, backends) = build_test_app();
    let ou = engineering(&app).await;
    backends.cache.set_fail_writes(true);

    let response = post_json(app, "/api/v1/users", jdoe(ou)).await;

    assert_eq!(response.status(), StatusCode::MULTI_STATUS);
    let json = body_json(response).await;
    assert_eq!(json["status"], "partial_failure");
    assert_eq!(json["kind"], "cache_write");
    assert!(backends.directory.contains(JDOE_DN));
}

// ---------------------------------------------------------------------------
// Test: unreachable directory answers 503
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_user_with_directory_offline_returns_503() {
    let (app, backends) = build_test_app();
    let ou = engineering(&app).await;
    backends.directory.set_offline(true);

    let response = post_json(app, "/api/v1/users", jdoe(ou)).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert_eq!(json["code"], "DIRECTORY_UNAVAILABLE");
}

// ---------------------------------------------------------------------------
// Test: PATCH /users/{account_name}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_user_changes_mail() {
    let (app, _) = with_jdoe().await;

    let response = patch_json(
        app,
        "/api/v1/users/jdoe",
        json!({ "email": "john.doe@corp.example" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["email"], "john.doe@corp.example");
}

#[tokio::test]
async fn update_user_immutable_field_returns_400() {
    let (app, backends) = with_jdoe().await;
    let writes = backends.directory.write_count();

    let response = patch_json(app, "/api/v1/users/jdoe", json!({ "displayName": "Johnny" })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["kind"], "immutable_attribute");
    assert_eq!(backends.directory.write_count(), writes);
}

#[tokio::test]
async fn update_unknown_user_returns_404() {
    let (app, _) = build_test_app();

    let response = patch_json(app, "/api/v1/users/nobody", json!({ "phone": "+1 555 0199" })).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["status"], "not_found");
}

// ---------------------------------------------------------------------------
// Test: offboard / purge / reset-password
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offboard_moves_account_to_quarantine() {
    let (app, backends) = with_jdoe().await;

    let response = post_empty(app, "/api/v1/users/jdoe/offboard").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["dn"], "CN=John Doe,OU=LEAVED,DC=corp,DC=example");
    assert_eq!(backends.cache.user_count(), 0);
}

#[tokio::test]
async fn purge_unknown_user_returns_404() {
    let (app, _) = build_test_app();

    let response = delete(app, "/api/v1/users/nobody").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reset_password_replaces_directory_password() {
    let (app, backends) = with_jdoe().await;

    let response = post_json(
        app,
        "/api/v1/users/jdoe/reset-password",
        json!({ "password": "Summer2026!" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        backends.directory.password_of(JDOE_DN).as_deref(),
        Some("Summer2026!")
    );
}

#[tokio::test]
async fn list_users_returns_cached_rows() {
    let (app, _) = with_jdoe().await;

    let json = body_json(get(app, "/api/v1/users").await).await;

    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["account_name"], "jdoe");
}

// ---------------------------------------------------------------------------
// Test: POST /auth/login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_with_valid_credentials_returns_200() {
    let (app, backends) = build_test_app();
    backends
        .directory
        .seed_user(ACTIVE_DN, "Ann Lee", "alee", "Spring2026!");

    let response = post_json(
        app,
        "/api/v1/auth/login",
        json!({ "account_name": "alee", "password": "Spring2026!" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["authenticated"], true);
}

#[tokio::test]
async fn login_with_wrong_password_returns_401() {
    let (app, backends) = build_test_app();
    backends
        .directory
        .seed_user(ACTIVE_DN, "Ann Lee", "alee", "Spring2026!");

    let response = post_json(
        app,
        "/api/v1/auth/login",
        json!({ "account_name": "alee", "password": "Autumn2026!" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn login_with_blank_password_returns_400() {
    let (app, _) = build_test_app();

    let response = post_json(
        app,
        "/api/v1/auth/login",
        json!({ "account_name": "alee", "password": "" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Test: GET /directory/users
// ---------------------------------------------------------------------------

#[tokio::test]
async fn directory_search_reads_live_entries() {
    let (app, backends) = with_jdoe().await;
    backends
        .directory
        .seed_user(ACTIVE_DN, "Ann Lee", "alee", "Spring2026!");

    let one = body_json(get(app.clone(), "/api/v1/directory/users?q=alee").await).await;
    assert_eq!(one["data"].as_array().unwrap().len(), 1);
    assert_eq!(one["data"][0]["account_name"], "alee");

    let all = body_json(get(app, "/api/v1/directory/users?scope=active").await).await;
    assert_eq!(all["data"].as_array().unwrap().len(), 2);
}
