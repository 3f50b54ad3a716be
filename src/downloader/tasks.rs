//! Task submission and status queries.

use std::sync::atomic::Ordering;

use tokio::sync::mpsc::error::TrySendError;

use crate::error::{Error, Result};
use crate::types::{Event, Task, TaskId, TaskSpec, TaskStatusView};

use super::AudioDownloader;

impl AudioDownloader {
    /// Register a task and queue it for execution
    ///
    /// `spec` is validated before anything is registered. A slot in the admission
    /// queue is reserved first, so a full queue rejects the submission without leaving
    /// a pending task behind.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] when the source identifiers or output directory are missing
    ///   or unsafe
    /// - [`Error::QueueFull`] when the admission queue is at capacity
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown) has been called
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use bili_audio_dl::*;
    /// # async fn example(downloader: AudioDownloader) -> Result<()> {
    /// let id = downloader
    ///     .create_task(TaskSpec::video("BV1xx411c7mD", "lectures").with_rename(true))
    ///     .await?;
    /// println!("queued {id}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_task(&self, spec: TaskSpec) -> Result<TaskId> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let permit = match self.queue_state.admission_tx.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                return Err(Error::QueueFull {
                    capacity: self.config.download.admission_queue_capacity,
                });
            }
            Err(TrySendError::Closed(())) => return Err(Error::ShuttingDown),
        };

        let task = self.registry.create(spec).await?;
        tracing::info!(
            task_id = %task.id,
            source = %task.source.label(),
            output_dir = %task.output_dir,
            rename = task.rename,
            "Task queued"
        );

        self.emit_event(Event::TaskQueued {
            id: task.id.clone(),
        });
        permit.send(task.id.clone());
        Ok(task.id)
    }

    /// Status snapshot of a task
    pub async fn get_status(&self, id: &TaskId) -> Result<TaskStatusView> {
        self.registry
            .get(id)
            .await
            .map(|task| task.status_view())
            .ok_or_else(|| Error::TaskNotFound(id.clone()))
    }

    /// Full task record
    pub async fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.registry.get(id).await
    }

    /// All tasks, oldest first
    pub async fn list(&self) -> Vec<Task> {
        self.registry.list().await
    }

    /// Most recently created task
    pub async fn latest(&self) -> Option<Task> {
        self.registry.latest().await
    }

    /// Remove terminal tasks not updated within `max_age_hours`
    ///
    /// `cleanup(0)` removes every completed or failed task. Returns the number removed.
    pub async fn cleanup(&self, max_age_hours: u64) -> Result<usize> {
        self.registry.cleanup(max_age_hours).await
    }
}
