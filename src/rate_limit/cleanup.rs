use crate::rate_limit::registry::RateLimiterRegistry;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Background sweep of expired limiter entries.
///
/// The task runs until [`CleanupTask::shutdown`] is awaited; dropping the handle
/// without shutting down aborts it.
pub struct CleanupTask {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CleanupTask {
    /// Start sweeping `registry` every `period`
    pub fn spawn(registry: Arc<RateLimiterRegistry>, period: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(sweep_loop(registry, period, shutdown_rx));

        Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stop the sweep and wait for the task to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("Rate limiter sweep task failed: {}", e);
            }
        }
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn sweep_loop(
    registry: Arc<RateLimiterRegistry>,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Rate limiter sweep started (interval: {:?})", period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                registry.cleanup_all();
            }
            _ = &mut shutdown_rx => break,
        }
    }

    tracing::info!("Rate limiter sweep stopped");
}
