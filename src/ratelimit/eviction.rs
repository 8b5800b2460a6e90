//! Background eviction of idle buckets.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, trace};

use super::limiter::LimiterCore;

/// Handle to the periodic eviction task.
///
/// Dropping it without calling [`shutdown`](Self::shutdown) closes the
/// signal channel, so the task still exits at its next wake-up; only
/// `shutdown` waits for it.
pub(crate) struct EvictionTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl EvictionTask {
    pub(crate) fn spawn(
        runtime: &Handle,
        core: Arc<LimiterCore>,
        interval: Duration,
        max_idle: Duration,
    ) -> Self {
        let (shutdown, signal) = oneshot::channel();
        let handle = runtime.spawn(run(core, interval, max_idle, signal));
        Self { shutdown, handle }
    }

    /// Signal the task and wait until it has exited.
    pub(crate) async fn shutdown(self) {
        // Err means the task is already gone
        let _ = self.shutdown.send(());

        if let Err(e) = self.handle.await {
            error!(error = %e, "Eviction task terminated abnormally");
        }
    }
}

async fn run(
    core: Arc<LimiterCore>,
    interval: Duration,
    max_idle: Duration,
    mut signal: oneshot::Receiver<()>,
) {
    // First scan one full interval after start
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(
        interval_ms = interval.as_millis() as u64,
        max_idle_ms = max_idle.as_millis() as u64,
        "Eviction task started"
    );

    loop {
        tokio::select! {
            biased;
            _ = &mut signal => break,
            _ = ticker.tick() => {
                let evicted = core.evict_idle(max_idle);
                if evicted > 0 {
                    debug!(
                        evicted = evicted,
                        remaining = core.bucket_count(),
                        "Evicted idle buckets"
                    );
                } else {
                    trace!("Eviction pass found no idle buckets");
                }
            }
        }
    }

    debug!("Eviction task stopped");
}
