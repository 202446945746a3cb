//! Integration tests for snapshot + restore round trips
//!
//! A snapshot of a store, restored into any store, must reproduce the same
//! records per collection (order-independent) with every relation intact.

mod common;

use common::fixtures::*;
use serde_json::json;
use std::sync::Arc;

use tracker::backup::{ProgressEmitter, ProgressSpan, RestoreOrchestrator, SnapshotGenerator};
use tracker::constants::defaults;
use tracker::database::EntityKind;

async fn seeded() -> TestDatabase {
    let db = TestDatabase::new().await.unwrap();
    seed_store(&db).await.unwrap();
    db
}

#[tokio::test]
async fn test_snapshot_captures_every_collection() {
    let db = seeded().await;
    let generator = SnapshotGenerator::new(db.database(), test_settings());

    let artifact = generator.generate(&ProgressSpan::silent()).await.unwrap();

    // Embedded children travel inside their parents
    assert!(artifact.collection(EntityKind::UserDevice).is_none());
    assert!(artifact.collection(EntityKind::WorkflowStep).is_none());
    assert_eq!(artifact.expected_count(EntityKind::UserDevice), Some(2));
    assert_eq!(artifact.expected_count(EntityKind::WorkflowStep), Some(2));

    let users = artifact.collection(EntityKind::User).unwrap();
    let alice = users.iter().find(|u| u["id"] == json!(ids::ALICE)).unwrap();
    assert_eq!(alice["devices"].as_array().unwrap().len(), 2);

    // Paged collections are complete across page boundaries
    assert_eq!(artifact.collection(EntityKind::Task).unwrap().len(), 3);
    assert_eq!(artifact.collection(EntityKind::Notification).unwrap().len(), 3);
    assert_eq!(artifact.total_records(), db.total_rows().await.unwrap());
}

#[tokio::test]
async fn test_restore_reproduces_snapshot() {
    let db = seeded().await;
    let database = db.database();
    let generator = SnapshotGenerator::new(database.clone(), test_settings());
    let orchestrator = RestoreOrchestrator::new(database.clone(), test_settings());

    let before = generator.generate(&ProgressSpan::silent()).await.unwrap();

    // Drift after the snapshot that the restore has to undo
    db.insert(
        EntityKind::Tag,
        vec![json!({"id": "tag-late", "name": "late", "color": null})],
    )
    .await
    .unwrap();
    let mut tx = database.begin().await.unwrap();
    tx.users()
        .set_field(ids::CAROL, "display_name", &json!("Caroline"))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let summary = orchestrator
        .restore(Arc::new(before.clone()), ProgressSpan::silent())
        .await
        .unwrap();
    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    assert_eq!(summary.omitted_relations, 0);

    let after = generator.generate(&ProgressSpan::silent()).await.unwrap();
    assert_eq!(normalized(&before), normalized(&after));
    assert!(db.row(EntityKind::Tag, "tag-late").await.unwrap().is_none());
}

#[tokio::test]
async fn test_restore_into_empty_store() {
    let source = seeded().await;
    let target = TestDatabase::new().await.unwrap();

    let artifact = SnapshotGenerator::new(source.database(), test_settings())
        .generate(&ProgressSpan::silent())
        .await
        .unwrap();

    let summary = RestoreOrchestrator::new(target.database(), test_settings())
        .restore(Arc::new(artifact.clone()), ProgressSpan::silent())
        .await
        .unwrap();

    assert_eq!(summary.total_restored, source.total_rows().await.unwrap());
    assert_eq!(summary.counters(EntityKind::UserDevice).restored, 2);
    assert_eq!(summary.counters(EntityKind::RolePermission).restored, 2);

    let restored = SnapshotGenerator::new(target.database(), test_settings())
        .generate(&ProgressSpan::silent())
        .await
        .unwrap();
    assert_eq!(normalized(&artifact), normalized(&restored));
}

#[tokio::test]
async fn test_restore_relinks_deferred_references() {
    let source = seeded().await;
    let target = TestDatabase::new().await.unwrap();

    let artifact = SnapshotGenerator::new(source.database(), test_settings())
        .generate(&ProgressSpan::silent())
        .await
        .unwrap();
    RestoreOrchestrator::new(target.database(), test_settings())
        .restore(Arc::new(artifact), ProgressSpan::silent())
        .await
        .unwrap();

    // Department head points forward to a user restored later
    let engineering = target
        .row(EntityKind::Department, ids::ENGINEERING)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(engineering["head_user_id"], json!(ids::ALICE));

    let platform = target
        .row(EntityKind::Department, ids::PLATFORM)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(platform["parent_department_id"], json!(ids::ENGINEERING));

    let carol = target.row(EntityKind::User, ids::CAROL).await.unwrap().unwrap();
    assert_eq!(carol["manager_id"], json!(ids::BOB));

    let child = target
        .row(EntityKind::Task, ids::TASK_CHILD)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(child["parent_task_id"], json!(ids::TASK_PARENT));
}

#[tokio::test]
async fn test_restored_store_has_no_dangling_references() {
    let db = seeded().await;
    let database = db.database();

    let artifact = SnapshotGenerator::new(database.clone(), test_settings())
        .generate(&ProgressSpan::silent())
        .await
        .unwrap();
    RestoreOrchestrator::new(database, test_settings())
        .restore(Arc::new(artifact), ProgressSpan::silent())
        .await
        .unwrap();

    assert_eq!(db.foreign_key_violations().await.unwrap(), 0);
}

#[tokio::test]
async fn test_restoring_twice_is_stable() {
    let db = seeded().await;
    let database = db.database();
    let generator = SnapshotGenerator::new(database.clone(), test_settings());
    let orchestrator = RestoreOrchestrator::new(database, test_settings());

    let artifact = Arc::new(generator.generate(&ProgressSpan::silent()).await.unwrap());
    let first = orchestrator
        .restore(artifact.clone(), ProgressSpan::silent())
        .await
        .unwrap();
    let second = orchestrator
        .restore(artifact.clone(), ProgressSpan::silent())
        .await
        .unwrap();

    assert_eq!(first.total_restored, second.total_restored);
    assert_eq!(first.collections, second.collections);
    let after = generator.generate(&ProgressSpan::silent()).await.unwrap();
    assert_eq!(normalized(&artifact), normalized(&after));
}

#[tokio::test]
async fn test_failed_collection_aborts_generation() {
    let db = seeded().await;
    db.execute("DROP TABLE notifications").await.unwrap();

    let err = SnapshotGenerator::new(db.database(), test_settings())
        .generate(&ProgressSpan::silent())
        .await
        .unwrap_err();

    let message = format!("{:#}", err);
    assert!(
        message.contains("Failed to fetch collection notifications"),
        "{}",
        message
    );
    assert!(message.contains("no such table"), "{}", message);
}

#[tokio::test]
async fn test_restore_reports_progress_within_collections() {
    let db = seeded().await;
    let database = db.database();
    let artifact = SnapshotGenerator::new(database.clone(), test_settings())
        .generate(&ProgressSpan::silent())
        .await
        .unwrap();

    let (emitter, rx) = ProgressEmitter::channel();
    RestoreOrchestrator::new(database, test_settings())
        .restore(Arc::new(artifact), emitter.span(50, 90))
        .await
        .unwrap();
    drop(emitter);
    let events = collect_events(rx).await;

    assert_monotonic(&events);
    for expected in ["Restoring tasks (1/3)", "Restoring tasks (2/3)"] {
        assert!(
            events.iter().any(|e| e.message == expected),
            "missing '{}'",
            expected
        );
    }
    assert!(events.iter().all(|e| e.progress <= 90));
}

#[tokio::test]
async fn test_snapshot_fetches_fit_in_remaining_connections() {
    let db = seeded().await;
    let database = db.database();
    let concurrency = database.fetch_concurrency();
    assert!(concurrency >= 1);
    assert!(concurrency < defaults::MAX_DB_CONNECTIONS as usize);

    // Leave only two connections for the 33 collection fetches
    let mut held = Vec::new();
    for _ in 0..defaults::MAX_DB_CONNECTIONS - 2 {
        held.push(database.acquire().await.unwrap());
    }

    let artifact = tokio::time::timeout(
        std::time::Duration::from_secs(20),
        SnapshotGenerator::new(database.clone(), test_settings()).generate(&ProgressSpan::silent()),
    )
    .await
    .expect("snapshot did not finish")
    .unwrap();
    drop(held);

    assert_eq!(artifact.total_records(), db.total_rows().await.unwrap());
}
