//! Store conformance checks shared by every backend

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_stream::StreamExt;

use keeper_queue::{EnqueueOutcome, JobId, JobStatus, JobStore, NewJob, QueueError, ReservationId};

pub fn due_job(id: &str) -> NewJob {
    NewJob::new(id, "maintenance", "test_job").with_due_at(Utc::now() - chrono::Duration::seconds(1))
}

/// C1. Enqueue is idempotent on id
pub async fn enqueue_is_idempotent(store: Arc<dyn JobStore>) {
    let first = store.enqueue(due_job("seeded")).await.unwrap();
    assert_eq!(first, EnqueueOutcome::Created(JobId::from("seeded")));

    let later = Utc::now() + chrono::Duration::days(1);
    let second = store
        .enqueue(NewJob::new("seeded", "other", "other_type").with_due_at(later))
        .await
        .unwrap();
    assert_eq!(second, EnqueueOutcome::AlreadyExists(JobId::from("seeded")));

    // The original row is untouched
    let record = store.get(&JobId::from("seeded")).await.unwrap();
    assert_eq!(record.queue, "maintenance");
    assert_eq!(record.job_type, "test_job");
    assert_eq!(record.status, JobStatus::Pending);
    assert!(record.due_at < later);
}

/// C2. Claim only returns due jobs of the requested queue, earliest first
pub async fn claim_respects_queue_due_and_order(store: Arc<dyn JobStore>) {
    let now = Utc::now();
    store
        .enqueue(NewJob::new("late", "maintenance", "test_job").with_due_at(now - chrono::Duration::seconds(1)))
        .await
        .unwrap();
    store
        .enqueue(NewJob::new("early", "maintenance", "test_job").with_due_at(now - chrono::Duration::seconds(60)))
        .await
        .unwrap();
    store
        .enqueue(NewJob::new("future", "maintenance", "test_job").with_due_at(now + chrono::Duration::hours(1)))
        .await
        .unwrap();
    store
        .enqueue(NewJob::new("elsewhere", "mail", "test_job").with_due_at(now - chrono::Duration::seconds(60)))
        .await
        .unwrap();

    let claimed = store.claim_due("maintenance", now, 10).await.unwrap();
    let ids: Vec<&str> = claimed.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);

    for record in &claimed {
        assert_eq!(record.status, JobStatus::Reserved);
        assert!(record.reserved_until.unwrap() > now);
    }

    // Nothing left that is due on this queue
    assert!(store.claim_due("maintenance", now, 10).await.unwrap().is_empty());
    assert_eq!(
        store.get(&JobId::from("future")).await.unwrap().status,
        JobStatus::Pending
    );
    assert_eq!(
        store.get(&JobId::from("elsewhere")).await.unwrap().status,
        JobStatus::Pending
    );
}

/// C3. Claim limit is honoured
pub async fn claim_honours_limit(store: Arc<dyn JobStore>) {
    for i in 0..5 {
        store.enqueue(due_job(&format!("job-{}", i))).await.unwrap();
    }

    assert!(store.claim_due("maintenance", Utc::now(), 0).await.unwrap().is_empty());
    assert_eq!(store.claim_due("maintenance", Utc::now(), 2).await.unwrap().len(), 2);
    assert_eq!(store.claim_due("maintenance", Utc::now(), 10).await.unwrap().len(), 3);
}

/// C4. Reschedule returns the job to Pending and bumps attempt
pub async fn reschedule_returns_to_pending(store: Arc<dyn JobStore>) {
    store.enqueue(due_job("recurring")).await.unwrap();
    let claimed = store.claim_due("maintenance", Utc::now(), 1).await.unwrap();
    let reservation = claimed[0].reservation.clone().unwrap();

    let next = Utc::now() + chrono::Duration::minutes(60);
    store
        .reschedule(&JobId::from("recurring"), &reservation, next, Some("directory unreachable".to_string()))
        .await
        .unwrap();

    let record = store.get(&JobId::from("recurring")).await.unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.attempt, 1);
    assert_eq!(record.due_at.timestamp_millis(), next.timestamp_millis());
    assert!(record.reserved_until.is_none());
    assert!(record.reservation.is_none());
    assert_eq!(record.last_error.as_deref(), Some("directory unreachable"));

    // Not due yet, so not claimable
    assert!(store.claim_due("maintenance", Utc::now(), 10).await.unwrap().is_empty());
}

/// C5. Complete and fail are terminal
pub async fn complete_and_fail_are_terminal(store: Arc<dyn JobStore>) {
    store.enqueue(due_job("one-shot")).await.unwrap();
    store.enqueue(due_job("doomed")).await.unwrap();
    let claimed = store.claim_due("maintenance", Utc::now(), 10).await.unwrap();
    assert_eq!(claimed.len(), 2);
    let reservation = claimed[0].reservation.clone().unwrap();

    store.complete(&JobId::from("one-shot"), &reservation).await.unwrap();
    store
        .fail(&JobId::from("doomed"), &reservation, "bad payload".to_string())
        .await
        .unwrap();

    let done = store.get(&JobId::from("one-shot")).await.unwrap();
    assert_eq!(done.status, JobStatus::Done);
    let failed = store.get(&JobId::from("doomed")).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("bad payload"));

    let far_future = Utc::now() + chrono::Duration::days(365);
    assert!(store.claim_due("maintenance", far_future, 10).await.unwrap().is_empty());
    assert_eq!(store.reclaim_expired(far_future).await.unwrap(), 0);
}

/// C6. Transitions require a reservation
pub async fn transitions_require_reservation(store: Arc<dyn JobStore>) {
    store.enqueue(due_job("pending")).await.unwrap();

    let result = store.complete(&JobId::from("pending"), &ReservationId::new()).await;
    assert!(matches!(
        result,
        Err(QueueError::NotReserved { status: JobStatus::Pending, .. })
    ));

    let result = store
        .reschedule(&JobId::from("missing"), &ReservationId::new(), Utc::now(), None)
        .await;
    assert!(matches!(result, Err(QueueError::JobNotFound(_))));
}

/// C7. Lapsed reservations are reclaimed with attempt incremented
pub async fn reclaim_expired_reservations(store: Arc<dyn JobStore>) {
    store.enqueue(due_job("stuck")).await.unwrap();
    let claimed = store.claim_due("maintenance", Utc::now(), 1).await.unwrap();
    let reserved_until = claimed[0].reserved_until.unwrap();

    // Still within the reservation window
    assert_eq!(store.reclaim_expired(Utc::now()).await.unwrap(), 0);

    let after = reserved_until + chrono::Duration::seconds(1);
    assert_eq!(store.reclaim_expired(after).await.unwrap(), 1);

    let record = store.get(&JobId::from("stuck")).await.unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.attempt, 1);
    assert!(record.reserved_until.is_none());

    assert_eq!(store.claim_due("maintenance", after, 1).await.unwrap().len(), 1);
}

/// C8. Concurrent claimers never receive the same job
pub async fn concurrent_claims_are_exclusive(store: Arc<dyn JobStore>) {
    for i in 0..50 {
        store.enqueue(due_job(&format!("job-{:02}", i))).await.unwrap();
    }

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            loop {
                let batch = store.claim_due("maintenance", Utc::now(), 3).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                mine.extend(batch.into_iter().map(|r| r.id));
                tokio::task::yield_now().await;
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for task in tasks {
        for id in task.await.unwrap() {
            total += 1;
            assert!(seen.insert(id.clone()), "job {} claimed twice", id);
        }
    }
    assert_eq!(total, 50);
}

/// C9. Transitions are published on the event stream
pub async fn transitions_emit_events(store: Arc<dyn JobStore>) {
    let mut events = store.event_stream();

    store.enqueue(due_job("observed")).await.unwrap();
    let claimed = store.claim_due("maintenance", Utc::now(), 1).await.unwrap();
    let reservation = claimed[0].reservation.clone().unwrap();
    store.complete(&JobId::from("observed"), &reservation).await.unwrap();

    let mut names = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .expect("Timeout waiting for event")
            .expect("Stream ended");
        assert_eq!(event.job_id(), &JobId::from("observed"));
        names.push(event.event_name());
    }
    assert_eq!(names, vec!["enqueued", "claimed", "completed"]);
}

/// C10. A worker whose reservation was reclaimed cannot overwrite the
/// claim that replaced it
pub async fn reclaimed_reservation_cannot_write(store: Arc<dyn JobStore>) {
    let id = JobId::from("contested");
    store.enqueue(due_job("contested")).await.unwrap();

    let first = store.claim_due("maintenance", Utc::now(), 1).await.unwrap();
    let stale = first[0].reservation.clone().unwrap();
    let lapsed = first[0].reserved_until.unwrap() + chrono::Duration::seconds(1);
    assert_eq!(store.reclaim_expired(lapsed).await.unwrap(), 1);

    let second = store.claim_due("maintenance", lapsed, 1).await.unwrap();
    assert_eq!(second.len(), 1);
    let current = second[0].reservation.clone().unwrap();
    assert_ne!(stale, current);

    let tomorrow = Utc::now() + chrono::Duration::days(1);
    let result = store.reschedule(&id, &stale, tomorrow, None).await;
    assert!(matches!(result, Err(QueueError::ReservationLost { .. })));
    let result = store.complete(&id, &stale).await;
    assert!(matches!(result, Err(QueueError::ReservationLost { .. })));
    let result = store.fail(&id, &stale, "late verdict".to_string()).await;
    assert!(matches!(result, Err(QueueError::ReservationLost { .. })));

    // The current claim is untouched and can still record its verdict
    let record = store.get(&id).await.unwrap();
    assert_eq!(record.status, JobStatus::Reserved);
    assert_eq!(record.attempt, 1);
    assert_eq!(record.reservation.as_ref(), Some(&current));

    store.complete(&id, &current).await.unwrap();
    assert_eq!(store.get(&id).await.unwrap().status, JobStatus::Done);

    // Once terminal, the stale claim sees NotReserved
    let result = store.complete(&id, &stale).await;
    assert!(matches!(result, Err(QueueError::NotReserved { status: JobStatus::Done, .. })));
}
