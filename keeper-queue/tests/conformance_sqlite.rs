#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use keeper_queue::{JobId, JobStatus, JobStore, NewJob, SqliteJobStore};

async fn store() -> Arc<dyn JobStore> {
    Arc::new(SqliteJobStore::in_memory().await.unwrap())
}

/// Fresh database file; the pool holds several connections so claims
/// really run side by side
async fn file_store() -> (SqliteJobStore, std::path::PathBuf) {
    let dir = std::env::temp_dir().join(format!("keeper-queue-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.join("jobs.db").display());
    (SqliteJobStore::connect(&url).await.unwrap(), dir)
}

#[tokio::test]
async fn test_enqueue_is_idempotent() {
    common::enqueue_is_idempotent(store().await).await;
}

#[tokio::test]
async fn test_claim_respects_queue_due_and_order() {
    common::claim_respects_queue_due_and_order(store().await).await;
}

#[tokio::test]
async fn test_claim_honours_limit() {
    common::claim_honours_limit(store().await).await;
}

#[tokio::test]
async fn test_reschedule_returns_to_pending() {
    common::reschedule_returns_to_pending(store().await).await;
}

#[tokio::test]
async fn test_complete_and_fail_are_terminal() {
    common::complete_and_fail_are_terminal(store().await).await;
}

#[tokio::test]
async fn test_transitions_require_reservation() {
    common::transitions_require_reservation(store().await).await;
}

#[tokio::test]
async fn test_reclaim_expired_reservations() {
    common::reclaim_expired_reservations(store().await).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_are_exclusive() {
    let (store, dir) = file_store().await;
    assert!(store.pool().options().get_max_connections() > 1);

    common::concurrent_claims_are_exclusive(Arc::new(store.clone())).await;

    store.pool().close().await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_reclaimed_reservation_cannot_write() {
    common::reclaimed_reservation_cannot_write(store().await).await;
}

#[tokio::test]
async fn test_transitions_emit_events() {
    common::transitions_emit_events(store().await).await;
}

/// Jobs written through one connection pool are visible after reopening
/// the same database file
#[tokio::test]
async fn test_jobs_survive_reopen() {
    let (store, dir) = file_store().await;
    let url = format!("sqlite://{}?mode=rwc", dir.join("jobs.db").display());

    store
        .enqueue(NewJob::new("inactive-user-blocker", "maintenance", "inactive_user_blocker"))
        .await
        .unwrap();
    store.pool().close().await;

    let reopened = SqliteJobStore::connect(&url).await.unwrap();
    let record = reopened.get(&JobId::from("inactive-user-blocker")).await.unwrap();
    assert_eq!(record.status, JobStatus::Pending);

    let again = reopened
        .enqueue(NewJob::new("inactive-user-blocker", "maintenance", "inactive_user_blocker"))
        .await
        .unwrap();
    assert!(!again.is_created());

    reopened.pool().close().await;
    let _ = std::fs::remove_dir_all(&dir);
}
