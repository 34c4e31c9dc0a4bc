//! Integration tests for `/api/v1/sync`.

mod common;

use axum::http::StatusCode;
use common::*;
use galilee_hypervisor::PowerState;
use uuid::Uuid;

#[tokio::test]
async fn sync_user_inserts_then_reports_unchanged() {
    let (app, backends) = build_test_app();
    backends
        .directory
        .seed_user(ACTIVE_DN, "Ann Lee", "alee", "Spring2026!");

    let first = body_json(post_empty(app.clone(), "/api/v1/sync/users/alee").await).await;
    assert_eq!(first["status"], "success");
    assert_eq!(first["data"]["action"], "inserted");
    assert_eq!(first["data"]["record"]["account_name"], "alee");

    let second = body_json(post_empty(app, "/api/v1/sync/users/alee").await).await;
    assert_eq!(second["data"]["action"], "unchanged");
    assert_eq!(backends.cache.user_count(), 1);
}

#[tokio::test]
async fn sync_org_unit_by_guid() {
    let (app, backends) = build_test_app();
    let (dn, guid) = backends.directory.seed_org_unit(ACTIVE_DN, "Legal");

    let response = post_empty(app, &format!("/api/v1/sync/org-units/{guid}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["record"]["dn"], dn);
}

#[tokio::test]
async fn sync_vm_by_uuid() {
    let (app, backends) = build_test_app();
    let uuid = backends.hypervisor.add_vm("db01", PowerState::PoweredOn);

    let response = post_empty(app, &format!("/api/v1/sync/vms/{uuid}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["record"]["instance_uuid"], uuid.to_string());
    assert_eq!(json["data"]["action"], "inserted");
}

#[tokio::test]
async fn sync_unknown_vm_returns_404() {
    let (app, backends) = build_test_app();

    let response = post_empty(app, &format!("/api/v1/sync/vms/{}", Uuid::new_v4())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(backends.cache.vm_count(), 0);
}

#[tokio::test]
async fn sync_with_cache_down_returns_500() {
    let (app, backends) = build_test_app();
    let uuid = backends.hypervisor.add_vm("db01", PowerState::PoweredOn);
    backends.cache.set_fail_writes(true);

    let response = post_empty(app, &format!("/api/v1/sync/vms/{uuid}")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
