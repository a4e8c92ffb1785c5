use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{backend::JobStore, runtime::MIN_INTERVAL, ObservabilityLayer, QueueResult};

/// Returns overdue reservations to Pending so a crashed or stuck worker
/// never leaves a job Reserved forever
pub struct ReservationReaper {
    store: Arc<dyn JobStore>,
    interval: Duration,
    observability: Option<ObservabilityLayer>,
}

impl ReservationReaper {
    /// Create a new reaper running every 30 seconds
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self::with_interval(store, Duration::from_secs(30))
    }

    /// Create reaper with custom interval; anything shorter than a
    /// millisecond is raised to one
    pub fn with_interval(store: Arc<dyn JobStore>, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(MIN_INTERVAL),
            observability: None,
        }
    }

    /// Count reclaimed jobs in the given metrics
    pub fn with_observability(mut self, observability: ObservabilityLayer) -> Self {
        self.observability = Some(observability);
        self
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.interval);

        info!("Starting reservation reaper with interval: {:?}", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.reap_once().await {
                Ok(0) => debug!("No expired reservations found"),
                Ok(reclaimed) => info!("Reclaimed {} expired reservations", reclaimed),
                Err(e) => warn!("Error during reservation reaping: {}", e),
            }
        }

        info!("Reservation reaper stopped");
    }

    /// Run one reaper cycle
    pub async fn reap_once(&self) -> QueueResult<usize> {
        let reclaimed = self.store.reclaim_expired(Utc::now()).await?;
        if let Some(observability) = &self.observability {
            observability.record_reclaimed(reclaimed);
        }
        Ok(reclaimed)
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryJobStore;
    use crate::{JobId, JobStatus, NewJob};

    #[tokio::test]
    async fn test_reaper_reclaims_expired_reservation() {
        let store = Arc::new(MemoryJobStore::new());
        store.enqueue(NewJob::new("a", "default", "test_job")).await.unwrap();
        store.claim_due("default", Utc::now(), 1).await.unwrap();

        store.force_reservation_expiry(&JobId::from("a"));

        let reaper = ReservationReaper::new(store.clone());
        assert_eq!(reaper.reap_once().await.unwrap(), 1);

        let record = store.get(&JobId::from("a")).await.unwrap();
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.attempt, 1);
        assert_eq!(record.last_error.as_deref(), Some("Reservation expired"));

        let again = store.claim_due("default", Utc::now(), 1).await.unwrap();
        assert_eq!(again.len(), 1);
    }

    #[tokio::test]
    async fn test_reaper_leaves_live_reservations_alone() {
        let store = Arc::new(MemoryJobStore::new());
        store.enqueue(NewJob::new("a", "default", "test_job")).await.unwrap();
        store.claim_due("default", Utc::now(), 1).await.unwrap();

        let reaper = ReservationReaper::new(store.clone());
        assert_eq!(reaper.reap_once().await.unwrap(), 0);

        let record = store.get(&JobId::from("a")).await.unwrap();
        assert_eq!(record.status, JobStatus::Reserved);
    }

    #[tokio::test]
    async fn test_zero_interval_is_raised() {
        let store = Arc::new(MemoryJobStore::new());
        let shutdown = CancellationToken::new();
        let reaper = ReservationReaper::with_interval(store, Duration::ZERO);
        assert_eq!(reaper.interval, MIN_INTERVAL);

        let task = tokio::spawn(reaper.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reaper_stops_on_shutdown() {
        let store = Arc::new(MemoryJobStore::new());
        let shutdown = CancellationToken::new();
        let reaper = ReservationReaper::with_interval(store, Duration::from_millis(10));

        let task = tokio::spawn(reaper.run(shutdown.clone()));
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
