mod common;

use common::*;
use galilee_core::fields::FieldChanges;
use galilee_core::outcome::{FailureKind, OperationStatus};
use galilee_core::sync::UpsertAction;
use galilee_db::CacheStore;
use galilee_directory::memory::FailPoint;
use galilee_reconcile::requests::CreateOrgUnitRequest;

fn request(name: &str, parent_id: Option<i64>) -> CreateOrgUnitRequest {
    CreateOrgUnitRequest {
        name: name.to_string(),
        parent_id,
    }
}

// ---------------------------------------------------------------------------
// create_org_unit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_nested_org_unit_reads_guid_back() {
    let h = harness();
    let corp = h.org_unit("Corp", None).await;
    assert_eq!(corp.dn, "OU=Corp,OU=Active,DC=corp,DC=example");

    let outcome = h
        .service
        .create_org_unit(request("Finance", Some(corp.id)))
        .await
        .unwrap();

    assert_eq!(outcome.status, OperationStatus::Success);
    let finance = outcome.record.unwrap();
    let expected_dn = "OU=Finance,OU=Corp,OU=Active,DC=corp,DC=example";
    assert_eq!(finance.dn, expected_dn);
    assert_eq!(finance.name, "Finance");
    assert_eq!(Some(finance.object_guid), h.directory.guid_of(expected_dn));
    assert_eq!(
        h.cache.find_org_unit_by_guid(finance.object_guid).await.unwrap(),
        Some(finance)
    );
}

#[tokio::test]
async fn create_org_unit_directory_failure_writes_no_row() {
    let h = harness();
    h.directory.fail(FailPoint::Add);

    let outcome = h.service.create_org_unit(request("Finance", None)).await.unwrap();

    assert_eq!(outcome.status, OperationStatus::ExternalFailure);
    assert_eq!(h.cache.org_unit_count(), 0);
}

#[tokio::test]
async fn create_org_unit_cache_failure_is_partial() {
    let h = harness();
    h.cache.set_fail_writes(true);

    let outcome = h.service.create_org_unit(request("Finance", None)).await.unwrap();

    assert_eq!(outcome.status, OperationStatus::PartialFailure);
    assert!(outcome.message.contains("OU=Finance"));
    assert!(h.directory.contains("OU=Finance,OU=Active,DC=corp,DC=example"));
}

#[tokio::test]
async fn create_org_unit_unreadable_guid_is_partial() {
    let h = harness();
    h.directory.fail(FailPoint::Search);

    let outcome = h.service.create_org_unit(request("Finance", None)).await.unwrap();

    assert_eq!(outcome.status, OperationStatus::PartialFailure);
    assert!(h.directory.contains("OU=Finance,OU=Active,DC=corp,DC=example"));
    assert_eq!(h.cache.org_unit_count(), 0);
}

#[tokio::test]
async fn create_org_unit_under_unknown_parent_is_not_found() {
    let h = harness();
    let outcome = h
        .service
        .create_org_unit(request("Finance", Some(77)))
        .await
        .unwrap();
    assert_eq!(outcome.status, OperationStatus::NotFound);
    assert_eq!(h.directory.write_count(), 0);
}

#[tokio::test]
async fn create_duplicate_org_unit_is_rejected_locally() {
    let h = harness();
    h.org_unit("Finance", None).await;
    let writes = h.directory.write_count();

    let outcome = h.service.create_org_unit(request("Finance", None)).await.unwrap();

    assert_eq!(outcome.kind, Some(FailureKind::AlreadyExists));
    assert_eq!(h.directory.write_count(), writes);
}

#[tokio::test]
async fn create_org_unit_with_blank_name_is_invalid() {
    let h = harness();
    let outcome = h.service.create_org_unit(request("", None)).await.unwrap();
    assert_eq!(outcome.status, OperationStatus::ValidationError);
}

// ---------------------------------------------------------------------------
// update_org_unit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rename_org_unit_updates_directory_and_cache() {
    let h = harness();
    let finance = h.org_unit("Finance", None).await;
    let changes = FieldChanges::new().with("name", "Treasury");

    let outcome = h.service.update_org_unit(finance.id, &changes).await.unwrap();

    assert_eq!(outcome.status, OperationStatus::Success, "{}", outcome.message);
    let renamed = outcome.record.unwrap();
    assert_eq!(renamed.name, "Treasury");
    assert_eq!(renamed.dn, "OU=Treasury,OU=Active,DC=corp,DC=example");
    assert_eq!(renamed.object_guid, finance.object_guid);
    assert!(h.directory.contains(&renamed.dn));
    assert!(!h.directory.contains(&finance.dn));
}

#[tokio::test]
async fn move_org_unit_under_new_parent() {
    let h = harness();
    let corp = h.org_unit("Corp", None).await;
    let finance = h.org_unit("Finance", None).await;
    let changes = FieldChanges::new().with("parentId", corp.id.to_string());

    let moved = h
        .service
        .update_org_unit(finance.id, &changes)
        .await
        .unwrap()
        .record
        .unwrap();

    assert_eq!(moved.dn, "OU=Finance,OU=Corp,OU=Active,DC=corp,DC=example");
    assert!(h.directory.contains(&moved.dn));
}

#[tokio::test]
async fn org_unit_cannot_move_below_itself() {
    let h = harness();
    let corp = h.org_unit("Corp", None).await;
    let finance = h.org_unit("Finance", Some(corp.id)).await;
    let changes = FieldChanges::new().with("parentId", finance.id.to_string());

    let outcome = h.service.update_org_unit(corp.id, &changes).await.unwrap();

    assert_eq!(outcome.status, OperationStatus::ValidationError);
}

#[tokio::test]
async fn update_org_unit_rejects_immutable_guid() {
    let h = harness();
    let finance = h.org_unit("Finance", None).await;
    let changes = FieldChanges::new().with("objectGuid", "00000000-0000-0000-0000-000000000000");

    let outcome = h.service.update_org_unit(finance.id, &changes).await.unwrap();

    assert_eq!(outcome.kind, Some(FailureKind::ImmutableAttribute));
}

#[tokio::test]
async fn rename_org_unit_cache_failure_is_partial() {
    let h = harness();
    let finance = h.org_unit("Finance", None).await;
    h.cache.set_fail_writes(true);
    let changes = FieldChanges::new().with("name", "Treasury");

    let outcome = h.service.update_org_unit(finance.id, &changes).await.unwrap();

    assert_eq!(outcome.status, OperationStatus::PartialFailure);
    assert!(h.directory.contains("OU=Treasury,OU=Active,DC=corp,DC=example"));
}

#[tokio::test]
async fn rename_org_unit_directory_failure_leaves_cache_unchanged() {
    let h = harness();
    let finance = h.org_unit("Finance", None).await;
    h.directory.fail(FailPoint::ModifyDn);
    let changes = FieldChanges::new().with("name", "Treasury");

    let outcome = h.service.update_org_unit(finance.id, &changes).await.unwrap();

    assert_eq!(outcome.status, OperationStatus::ExternalFailure);
    assert!(h.directory.contains(&finance.dn));
    assert_eq!(h.cache.find_org_unit(finance.id).await.unwrap(), Some(finance));
}

// ---------------------------------------------------------------------------
// delete / sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_org_unit_removes_both_sides() {
    let h = harness();
    let finance = h.org_unit("Finance", None).await;

    let outcome = h.service.delete_org_unit(finance.id).await.unwrap();

    assert_eq!(outcome.status, OperationStatus::Success);
    assert!(!h.directory.contains(&finance.dn));
    assert_eq!(h.cache.org_unit_count(), 0);
}

#[tokio::test]
async fn delete_org_unit_cache_failure_is_partial() {
    let h = harness();
    let finance = h.org_unit("Finance", None).await;
    h.cache.set_fail_writes(true);

    let outcome = h.service.delete_org_unit(finance.id).await.unwrap();

    assert_eq!(outcome.status, OperationStatus::PartialFailure);
    assert!(outcome.message.contains("OU=Finance"));
    assert!(!h.directory.contains(&finance.dn));
    assert_eq!(h.cache.org_unit_count(), 1);
}

#[tokio::test]
async fn delete_non_empty_org_unit_is_rejected() {
    let h = harness();
    let corp = h.org_unit("Corp", None).await;
    h.org_unit("Finance", Some(corp.id)).await;

    let outcome = h.service.delete_org_unit(corp.id).await.unwrap();

    assert_eq!(outcome.status, OperationStatus::ExternalFailure);
    assert!(h.cache.find_org_unit(corp.id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_unknown_org_unit_is_not_found() {
    let h = harness();
    let outcome = h.service.delete_org_unit(5).await.unwrap();
    assert_eq!(outcome.status, OperationStatus::NotFound);
}

#[tokio::test]
async fn sync_org_unit_is_idempotent() {
    let h = harness();
    let (dn, guid) = h.directory.seed_org_unit(ACTIVE_DN, "Legal");

    let first = h
        .service
        .sync_org_unit_from_directory(guid)
        .await
        .unwrap()
        .record
        .unwrap();
    assert_eq!(first.action, UpsertAction::Inserted);
    assert_eq!(first.record.dn, dn);

    let second = h
        .service
        .sync_org_unit_from_directory(guid)
        .await
        .unwrap()
        .record
        .unwrap();
    assert_eq!(second.action, UpsertAction::Unchanged);
    assert_eq!(second.record, first.record);
    assert_eq!(h.cache.org_unit_count(), 1);
}
