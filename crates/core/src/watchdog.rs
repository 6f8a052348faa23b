//! Inactivity shutdown.
//!
//! Request handlers stamp an [`ActivityClock`]; a dedicated thread polls it and fires once the
//! process has been idle longer than the timeout. The timestamp is a single atomic cell written
//! without coordination: approximate, lock-free, eventually visible. A lost update delays
//! shutdown by at most one poll interval.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct ActivityClock {
    last_millis: AtomicI64,
}

impl ActivityClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_millis: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn touch(&self) {
        self.touch_at(Utc::now());
    }

    pub fn touch_at(&self, now: DateTime<Utc>) {
        self.last_millis.store(now.timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.last_millis.load(Ordering::Relaxed))
            .unwrap_or_default()
    }

    /// Zero when `now` precedes the last stamp.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.idle_for(now) > timeout
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// Polls `activity` every `poll` and calls `on_idle` once it has been idle longer than
/// `timeout`. The thread ends after firing.
pub fn spawn_watchdog<F>(
    activity: Arc<ActivityClock>,
    timeout: Duration,
    poll: Duration,
    on_idle: F,
) -> std::io::Result<std::thread::JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name("inactivity-watchdog".to_string())
        .spawn(move || loop {
            std::thread::sleep(poll);
            let now = Utc::now();
            if activity.is_idle(now, timeout) {
                tracing::info!(
                    idle_secs = activity.idle_for(now).as_secs(),
                    timeout_secs = timeout.as_secs(),
                    "no activity; shutting down"
                );
                on_idle();
                return;
            }
        })
}
