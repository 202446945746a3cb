//! Integration tests for the Cleanup phase
//!
//! Deletes that fail on the first pass get a forced second pass with every
//! nullable reference detached. If rows still remain, the restore fails and
//! the store keeps its previous content.

mod common;

use common::fixtures::*;
use std::sync::Arc;

use tracker::backup::{ProgressSpan, RestoreOrchestrator, SnapshotGenerator};
use tracker::database::EntityKind;
use tracker::errors::RestoreError;

/// Tasks linked to a project refuse deletion until the link is cleared
const BLOCK_LINKED_TASKS: &str = "CREATE TRIGGER keep_linked_tasks BEFORE DELETE ON tasks \
     WHEN OLD.project_id IS NOT NULL \
     BEGIN SELECT RAISE(ABORT, 'task still linked to a project'); END";

const BLOCK_TAGS: &str = "CREATE TRIGGER keep_tags BEFORE DELETE ON tags \
     BEGIN SELECT RAISE(ABORT, 'tags are locked'); END";

async fn seeded() -> TestDatabase {
    let db = TestDatabase::new().await.unwrap();
    seed_store(&db).await.unwrap();
    db
}

#[tokio::test]
async fn test_forced_pass_empties_store_after_failed_delete() {
    let db = seeded().await;
    let seeded_rows = db.total_rows().await.unwrap();
    db.execute(BLOCK_LINKED_TASKS).await.unwrap();

    let deleted = RestoreOrchestrator::new(db.database(), test_settings())
        .cleanup_store()
        .await
        .unwrap();

    assert_eq!(deleted, seeded_rows);
    assert_eq!(db.total_rows().await.unwrap(), 0);
}

#[tokio::test]
async fn test_restore_reports_forced_cleanup_and_still_completes() {
    let db = seeded().await;
    let database = db.database();
    let generator = SnapshotGenerator::new(database.clone(), test_settings());
    let before = generator.generate(&ProgressSpan::silent()).await.unwrap();
    db.execute(BLOCK_LINKED_TASKS).await.unwrap();

    let summary = RestoreOrchestrator::new(database, test_settings())
        .restore(Arc::new(before.clone()), ProgressSpan::silent())
        .await
        .unwrap();

    assert!(
        summary
            .warnings
            .iter()
            .any(|w| w.contains("running forced pass") && w.contains("tasks")),
        "{:?}",
        summary.warnings
    );
    let after = generator.generate(&ProgressSpan::silent()).await.unwrap();
    assert_eq!(normalized(&before), normalized(&after));
}

#[tokio::test]
async fn test_undeletable_rows_fail_restore_and_keep_store() {
    let db = seeded().await;
    let database = db.database();
    let artifact = SnapshotGenerator::new(database.clone(), test_settings())
        .generate(&ProgressSpan::silent())
        .await
        .unwrap();
    let rows_before = db.total_rows().await.unwrap();
    db.execute(BLOCK_TAGS).await.unwrap();

    let err = RestoreOrchestrator::new(database, test_settings())
        .restore(Arc::new(artifact), ProgressSpan::silent())
        .await
        .unwrap_err();

    match err.downcast_ref::<RestoreError>() {
        Some(RestoreError::CleanupIncomplete { tables }) => {
            assert!(tables.iter().any(|t| t == "tags"), "{:?}", tables)
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(db.total_rows().await.unwrap(), rows_before);
    assert_eq!(db.count(EntityKind::TaskTag).await.unwrap(), 1);
}
