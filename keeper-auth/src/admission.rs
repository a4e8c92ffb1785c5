use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keeper_core::SharedConfig;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::{AuthError, AuthResult};

pub const MAX_IN_FLIGHT_KEY: &str = "login.max_in_flight";
pub const DELAY_SECONDS_KEY: &str = "login.delay_seconds";

pub const DEFAULT_MAX_IN_FLIGHT: usize = 10;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Bounded-concurrency gate with a fixed delay in front of the login path
///
/// Admission never waits for a slot: when all slots are taken the request
/// is rejected immediately. An admitted request always serves the full
/// delay before the guarded work runs, whatever the outcome of that work.
///
/// Capacity can be changed in place with [`LoginAdmission::resize`]. When it
/// shrinks below the number of slots in use, the surplus is retired as those
/// slots are released, so in-flight logins never exceed the larger of the old
/// and new capacity.
#[derive(Debug)]
pub struct LoginAdmission {
    slots: Arc<Semaphore>,
    gate: Arc<Mutex<Gate>>,
}

#[derive(Debug)]
struct Gate {
    capacity: usize,
    delay: Duration,
    /// Permits still held by logins that must not go back to the pool
    owed: usize,
}

/// Held for the lifetime of one admitted login
#[derive(Debug)]
pub struct LoginSlot {
    permit: Option<OwnedSemaphorePermit>,
    gate: Arc<Mutex<Gate>>,
}

impl Drop for LoginSlot {
    fn drop(&mut self) {
        let permit = self.permit.take();
        let mut gate = self.gate.lock();
        if gate.owed > 0 {
            gate.owed -= 1;
            if let Some(permit) = permit {
                permit.forget();
            }
        } else {
            drop(permit);
        }
    }
}

fn clamp_capacity(capacity: usize) -> usize {
    if capacity > Semaphore::MAX_PERMITS {
        warn!(capacity, max = Semaphore::MAX_PERMITS, "login capacity too large, clamping");
        Semaphore::MAX_PERMITS
    } else {
        capacity
    }
}

impl LoginAdmission {
    pub fn new(capacity: usize, delay: Duration) -> Self {
        let capacity = clamp_capacity(capacity);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            gate: Arc::new(Mutex::new(Gate {
                capacity,
                delay,
                owed: 0,
            })),
        }
    }

    /// Build from `login.max_in_flight` and `login.delay_seconds`
    pub fn from_config(config: &SharedConfig) -> Self {
        let (capacity, delay) = Self::settings(config);
        Self::new(capacity, delay)
    }

    /// Current capacity and delay in `config`, with defaults for missing keys
    pub fn settings(config: &SharedConfig) -> (usize, Duration) {
        let snapshot = config.snapshot();
        let capacity = snapshot
            .get_usize(MAX_IN_FLIGHT_KEY)
            .unwrap_or(DEFAULT_MAX_IN_FLIGHT);
        let delay = snapshot
            .get_duration_secs(DELAY_SECONDS_KEY)
            .unwrap_or(DEFAULT_DELAY);
        (clamp_capacity(capacity), delay)
    }

    pub fn capacity(&self) -> usize {
        self.gate.lock().capacity
    }

    pub fn delay(&self) -> Duration {
        self.gate.lock().delay
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Change capacity and delay without replacing the gate
    pub fn resize(&self, capacity: usize, delay: Duration) {
        let capacity = clamp_capacity(capacity);
        let mut gate = self.gate.lock();
        gate.delay = delay;

        if capacity > gate.capacity {
            let grow = capacity - gate.capacity;
            let repaid = grow.min(gate.owed);
            gate.owed -= repaid;
            self.slots.add_permits(grow - repaid);
        } else if capacity < gate.capacity {
            let shrink = gate.capacity - capacity;
            let forgotten = self.slots.forget_permits(shrink);
            gate.owed += shrink - forgotten;
        }

        gate.capacity = capacity;
    }

    /// Take a slot without waiting
    pub fn try_admit(&self) -> AuthResult<LoginSlot> {
        match self.slots.clone().try_acquire_owned() {
            Ok(permit) => Ok(LoginSlot {
                permit: Some(permit),
                gate: self.gate.clone(),
            }),
            Err(_) => {
                debug!(capacity = self.capacity(), "login admission rejected");
                Err(AuthError::Exhausted)
            }
        }
    }

    /// Run `work` inside an admitted slot after the fixed delay
    ///
    /// Rejection returns before any delay is served.
    pub async fn guard<T, F>(&self, work: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        let _slot = self.try_admit()?;
        tokio::time::sleep(self.delay()).await;
        work.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::KeeperConfig;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_rejects_when_full_without_waiting() {
        let admission = Arc::new(LoginAdmission::new(1, Duration::from_secs(1)));

        let holder = {
            let admission = admission.clone();
            tokio::spawn(async move { admission.guard(async { Ok::<_, AuthError>(()) }).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(admission.available(), 0);

        let started = Instant::now();
        let rejected = admission.guard(async { Ok::<_, AuthError>(()) }).await;
        assert_eq!(rejected, Err(AuthError::Exhausted));
        assert_eq!(started.elapsed(), Duration::ZERO);

        holder.await.unwrap().unwrap();
        assert_eq!(admission.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_to_failed_work_too() {
        let admission = LoginAdmission::new(2, Duration::from_secs(3));

        let started = Instant::now();
        let outcome = admission
            .guard(async { Err::<(), _>(AuthError::InvalidCredentials) })
            .await;

        assert_eq!(outcome, Err(AuthError::InvalidCredentials));
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(admission.available(), 2);
    }

    #[test]
    fn test_shrinking_retires_slots_as_they_are_released() {
        let admission = LoginAdmission::new(2, Duration::ZERO);
        let first = admission.try_admit().unwrap();
        let second = admission.try_admit().unwrap();

        admission.resize(1, Duration::ZERO);
        assert_eq!(admission.capacity(), 1);
        assert_eq!(admission.available(), 0);

        drop(first);
        assert_eq!(admission.available(), 0);
        assert_eq!(admission.try_admit().unwrap_err(), AuthError::Exhausted);

        drop(second);
        assert_eq!(admission.available(), 1);
    }

    #[test]
    fn test_growing_repays_retired_slots_first() {
        let admission = LoginAdmission::new(3, Duration::ZERO);
        let held: Vec<_> = (0..3).map(|_| admission.try_admit().unwrap()).collect();

        admission.resize(1, Duration::ZERO);
        admission.resize(2, Duration::ZERO);
        assert_eq!(admission.available(), 0);

        drop(held);
        assert_eq!(admission.available(), 2);

        admission.resize(4, Duration::from_secs(2));
        assert_eq!(admission.available(), 4);
        assert_eq!(admission.delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_capacity_is_clamped_to_semaphore_limit() {
        let config = SharedConfig::new(KeeperConfig::new());
        config.set(MAX_IN_FLIGHT_KEY, usize::MAX.to_string());

        let (capacity, _) = LoginAdmission::settings(&config);
        assert_eq!(capacity, Semaphore::MAX_PERMITS);

        let admission = LoginAdmission::new(usize::MAX, Duration::ZERO);
        assert_eq!(admission.capacity(), Semaphore::MAX_PERMITS);
    }

    #[test]
    fn test_settings_from_config() {
        let config = SharedConfig::new(KeeperConfig::new());
        assert_eq!(LoginAdmission::settings(&config), (DEFAULT_MAX_IN_FLIGHT, DEFAULT_DELAY));

        config.set(MAX_IN_FLIGHT_KEY, "3");
        config.set(DELAY_SECONDS_KEY, "2");
        let admission = LoginAdmission::from_config(&config);
        assert_eq!(admission.capacity(), 3);
        assert_eq!(admission.delay(), Duration::from_secs(2));
    }
}
