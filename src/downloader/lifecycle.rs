//! Shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::types::Event;

use super::AudioDownloader;

/// How long shutdown waits for aborted executors to unwind
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl AudioDownloader {
    /// Shut down the downloader
    ///
    /// This method performs the shutdown sequence:
    /// 1. Stops accepting new tasks
    /// 2. Stops the task processor
    /// 3. Aborts all executing tasks (using their cancellation tokens)
    /// 4. Waits for the executors to unwind, with a timeout
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// Aborted tasks are not resumed and stay `running` in the persisted registry.
    /// Tasks still waiting in the admission queue stay `pending`.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating shutdown");

        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        self.queue_state.shutdown.cancel();
        tracing::info!("Stopped accepting new tasks");

        self.abort_all().await;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_tasks()).await {
            Ok(()) => tracing::info!("All executors stopped"),
            Err(_) => {
                tracing::warn!("Timeout waiting for executors to stop, proceeding with shutdown")
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Shutdown complete");
        Ok(())
    }

    /// Signal every executing task to stop
    pub(crate) async fn abort_all(&self) {
        let active = self.queue_state.active_tasks.lock().await;
        tracing::debug!(active_count = active.len(), "Aborting active tasks");

        for (id, token) in active.iter() {
            tracing::debug!(task_id = %id, "Signaling abort");
            token.cancel();
        }
    }

    async fn wait_for_active_tasks(&self) {
        loop {
            let active_count = self.queue_state.active_tasks.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for executors to stop");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}
