//! Integration tests for `/api/v1/org-units`.

mod common;

use axum::http::StatusCode;
use common::*;
use galilee_directory::memory::FailPoint;
use serde_json::json;

#[tokio::test]
async fn create_org_unit_returns_201_with_guid() {
    let (app, backends) = build_test_app();

    let response = post_json(app, "/api/v1/org-units", json!({ "name": "Finance" })).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let dn = "OU=Finance,OU=Active,DC=corp,DC=example";
    assert_eq!(json["data"]["dn"], dn);
    assert_eq!(
        json["data"]["object_guid"],
        backends.directory.guid_of(dn).unwrap().to_string()
    );
}

#[tokio::test]
async fn create_org_unit_rejected_by_directory_returns_502() {
    let (app, backends) = build_test_app();
    backends.directory.fail(FailPoint::Add);

    let response = post_json(app, "/api/v1/org-units", json!({ "name": "Finance" })).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["status"], "external_failure");
    assert_eq!(backends.cache.org_unit_count(), 0);
}

#[tokio::test]
async fn create_org_unit_with_malformed_body_is_rejected() {
    let (app, _) = build_test_app();

    let response = post_json(app, "/api/v1/org-units", json!({ "parent_id": "corp" })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["status"], "validation_error");
}

#[tokio::test]
async fn create_org_unit_with_directory_assigned_keys_returns_400() {
    let (app, backends) = build_test_app();
    let writes = backends.directory.write_count();

    let response = post_json(
        app,
        "/api/v1/org-units",
        json!({
            "name": "Finance",
            "objectGUID": "0b3c1a7e-0000-0000-0000-000000000001",
            "dn": "OU=Evil,DC=x",
        }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["status"], "validation_error");
    assert!(json["message"].as_str().unwrap().contains("unknown field"));
    assert_eq!(backends.cache.org_unit_count(), 0);
    assert_eq!(backends.directory.write_count(), writes);
}

#[tokio::test]
async fn rename_org_unit_returns_new_dn() {
    let (app, _) = build_test_app();
    let created = body_json(
        post_json(app.clone(), "/api/v1/org-units", json!({ "name": "Finance" })).await,
    )
    .await;
    let id = created["data"]["id"].as_i64().unwrap();

    let response = patch_json(
        app,
        &format!("/api/v1/org-units/{id}"),
        json!({ "name": "Treasury" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["dn"], "OU=Treasury,OU=Active,DC=corp,DC=example");
}

#[tokio::test]
async fn delete_org_unit_removes_it() {
    let (app, backends) = build_test_app();
    let created = body_json(
        post_json(app.clone(), "/api/v1/org-units", json!({ "name": "Finance" })).await,
    )
    .await;
    let id = created["data"]["id"].as_i64().unwrap();

    let response = delete(app.clone(), &format!("/api/v1/org-units/{id}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(backends.cache.org_unit_count(), 0);

    let listed = body_json(get(app, "/api/v1/org-units").await).await;
    assert!(listed["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn delete_unknown_org_unit_returns_404() {
    let (app, _) = build_test_app();

    let response = delete(app, "/api/v1/org-units/999").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
