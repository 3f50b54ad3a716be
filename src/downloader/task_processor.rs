//! Task processor: admission queue dispatch onto the bounded worker pool.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::TaskId;

use super::AudioDownloader;
use super::executor::run_task;

impl AudioDownloader {
    /// Start the task processor
    ///
    /// This method spawns a background task that continuously:
    /// 1. Waits for the next task id on the admission queue
    /// 2. Acquires a permit from the concurrency limiter (respects max_concurrent_tasks)
    /// 3. Spawns an executor for that task
    /// 4. Repeats until shutdown
    ///
    /// Tasks are started in submission order. Each spawned executor registers an abort
    /// token in `active_tasks` and removes it when it finishes.
    pub(crate) fn start_task_processor(
        &self,
        mut admission_rx: mpsc::Receiver<TaskId>,
    ) {
        let concurrent_limit = self.queue_state.concurrent_limit.clone();
        let active_tasks = self.queue_state.active_tasks.clone();
        let shutdown = self.queue_state.shutdown.clone();
        let downloader = self.clone();

        tokio::spawn(async move {
            loop {
                let id = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = admission_rx.recv() => match next {
                        Some(id) => id,
                        None => break,
                    },
                };

                // Blocks while max_concurrent_tasks executors are running
                let permit = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    permit = concurrent_limit.clone().acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => break,
                    },
                };

                let abort_token = CancellationToken::new();
                {
                    let mut active = active_tasks.lock().await;
                    active.insert(id.clone(), abort_token.clone());
                }
                // Shutdown may have swept the map before this insert
                if shutdown.is_cancelled() {
                    abort_token.cancel();
                }

                let ctx = downloader.task_context(id.clone());
                let active_tasks = Arc::clone(&active_tasks);

                tracing::debug!(task_id = %id, "Dispatching task");
                tokio::spawn(async move {
                    let _permit = permit;
                    tokio::select! {
                        _ = abort_token.cancelled() => {
                            tracing::warn!(task_id = %id, "Task aborted by shutdown");
                        }
                        _ = run_task(ctx) => {}
                    }
                    active_tasks.lock().await.remove(&id);
                });
            }

            tracing::debug!("Task processor stopped");
        });
    }
}
