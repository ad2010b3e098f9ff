//! Inactivity watchdog for a connected session.
//!
//! The monitor only observes: it never sends probes. Keepalive replies are
//! the session's business; this module just decides when silence has gone on
//! long enough to force a reconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;

/// Records when inbound traffic was last seen. Shared between the receive
/// path (writer) and the liveness monitor (reader).
pub struct ActivityTracker {
    epoch: Instant,
    last_millis: AtomicU64,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_millis: AtomicU64::new(0),
        }
    }

    /// Mark activity now. Called for any inbound frame, transport keepalive
    /// included.
    pub fn touch(&self) {
        let millis = self.epoch.elapsed().as_millis() as u64;
        self.last_millis.store(millis, Ordering::Relaxed);
    }

    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_millis.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic check over an [`ActivityTracker`].
pub struct LivenessMonitor {
    tracker: Arc<ActivityTracker>,
    check_interval: Duration,
    timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(tracker: Arc<ActivityTracker>, check_interval: Duration, timeout: Duration) -> Self {
        Self {
            tracker,
            check_interval,
            timeout,
        }
    }

    /// Resolves once the session has been silent for longer than the
    /// heartbeat timeout; the resolved value is the observed idle time.
    pub async fn expired(&self) -> Duration {
        loop {
            sleep(self.check_interval).await;
            let idle = self.tracker.idle_for();
            if idle > self.timeout {
                return idle;
            }
        }
    }
}
