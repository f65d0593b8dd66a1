//! Periodic and mutation-driven silent sync.

use crate::engine::{SyncEngine, TriggerMode};
use crate::local::LocalStore;
use crate::remote::RemoteStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Drives the engine on a fixed cadence, with an opportunistic kick after
/// local mutations. Silent triggers mean a clean replica costs nothing per
/// tick, and failures are logged rather than surfaced; the next trigger
/// retries.
pub struct SyncScheduler {
    wakeup: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SyncScheduler {
    pub fn spawn<R, L>(engine: Arc<Mutex<SyncEngine<R, L>>>, cadence: Duration) -> Self
    where
        R: RemoteStore + 'static,
        L: LocalStore + 'static,
    {
        let wakeup = Arc::new(Notify::new());
        let notified = wakeup.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a freshly
            // spawned scheduler waits a full cadence before syncing.
            ticker.tick().await;
            loop {
                let reason = tokio::select! {
                    _ = ticker.tick() => "interval",
                    _ = notified.notified() => "mutation",
                };
                let mut engine = engine.lock().await;
                match engine.sync(TriggerMode::Silent, reason, Utc::now()).await {
                    Ok(outcome) => debug!(reason, ?outcome, "scheduled sync"),
                    Err(e) => warn!(reason, error = %e, "scheduled sync failed"),
                }
            }
        });
        Self { wakeup, task }
    }

    /// Request a sync soon, without waiting for the next tick. Coalesces
    /// with an already pending request.
    pub fn on_mutation(&self) {
        self.wakeup.notify_one();
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}
