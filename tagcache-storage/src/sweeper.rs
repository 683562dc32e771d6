//! Background expiry sweep.
//!
//! The task holds only a weak reference to the manager, so it never keeps
//! the cache alive. It exits when the shutdown signal is sent, when the
//! sender is dropped, or when the manager is gone at the next tick.

use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::manager::CacheManager;

/// Handle to a running sweep task.
#[derive(Debug)]
pub(crate) struct SweeperHandle {
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) task: JoinHandle<()>,
}

impl SweeperHandle {
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task to stop without waiting for it.
    pub(crate) fn signal(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Periodically remove expired entries until shut down.
///
/// The first sweep runs one full `period` after start.
pub(crate) async fn sweep_task(
    manager: Weak<CacheManager>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        sweep_interval_secs = period.as_secs(),
        "Cache sweeper started"
    );

    let mut cycles = 0u64;
    let mut removed_total = 0u64;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                cycles += 1;
                let removed = manager.purge_expired();
                removed_total += removed as u64;

                if removed > 0 {
                    tracing::info!(removed, "Cache sweep removed expired entries");
                } else {
                    tracing::trace!("Cache sweep found no expired entries");
                }
            }
        }
    }

    tracing::info!(
        cycles,
        removed = removed_total,
        "Cache sweeper stopped"
    );
}
